//! Wire protocol: client command parsing, reply encoding and peer framing.

mod codec;
mod command;
mod frame;
mod reply;
pub use codec::*;
pub use command::*;
pub use frame::*;
pub use reply::*;

#[cfg(test)]
mod command_test;
#[cfg(test)]
mod frame_test;
