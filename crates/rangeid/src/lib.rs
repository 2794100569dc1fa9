#![doc = include_str!("../README.md")]

mod allocator;
mod cache;
mod error;
mod key;
mod ledger;
mod optimistic;
mod range;
mod service;
mod store;
mod time;
mod usage;

pub use crate::allocator::*;
pub use crate::cache::*;
pub use crate::error::*;
pub use crate::key::*;
pub use crate::ledger::*;
pub use crate::optimistic::*;
pub use crate::range::*;
pub use crate::service::*;
pub use crate::store::*;
pub use crate::time::*;
pub use crate::usage::*;
