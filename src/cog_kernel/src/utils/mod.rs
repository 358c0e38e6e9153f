//! Utility
mod cell;
mod init;

pub use self::{cell::*, init::*};
