//! Command execution: verb dispatch, handlers and their side effects.

mod dispatch;
mod executor;
mod handlers;
mod help;
mod info;
mod session;
pub use executor::*;
pub use help::*;
pub use session::*;
