//! Command handlers behind the `lmstudio` binary.
//!
//! Each handler writes human-readable output to the given writer and
//! returns `Ok(true)` on success, `Ok(false)` when the command ran but
//! should exit non-zero.

pub mod chat;
pub mod embed;
pub mod health;
pub mod models;
