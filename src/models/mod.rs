//! Core data models for shiksha.

mod config;
mod error;
mod request;

pub use config::*;
pub use error::*;
pub use request::*;
