//! HTTP service implementation.
//!
//! ## Structure
//!
//! - [`handler`] - routes and the shared [`handler::LedgerApi`] state.
//! - [`request`] - JSON request/response shapes and their validation.

pub mod handler;
pub mod request;
