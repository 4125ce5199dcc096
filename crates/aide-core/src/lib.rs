//! Core types and trait definitions for the aide assistant.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod chat;
pub mod credential;
pub mod error;
pub mod fact;
pub mod store;

pub use error::{Error, Result};
