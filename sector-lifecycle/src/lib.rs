#![deny(clippy::all, clippy::perf, clippy::correctness)]

#[macro_use]
extern crate log;

pub use crate::builder::*;
pub use crate::client::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::metadata::*;
pub use crate::piece::*;
pub use crate::poller::*;

pub(crate) mod builder;
pub(crate) mod client;
pub(crate) mod config;
pub(crate) mod error;
pub(crate) mod helpers;
pub(crate) mod metadata;
pub(crate) mod piece;
pub(crate) mod poller;

#[cfg(test)]
pub(crate) mod testing;
