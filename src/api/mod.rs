//! HTTP API for the statement ledger
//!
//! JSON over REST. Every failure renders as an [`ApiError`].

pub mod error;
pub mod handlers;
mod rest;
pub mod types;

pub use error::{ApiError, ErrorCode};
pub use rest::*;
