//! Components shared by the unit tests of several modules
mod common;

pub(crate) use common::*;
