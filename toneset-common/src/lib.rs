//! # ToneSet Common Library
//!
//! Shared code for the ToneSet workspace including:
//! - Session event types (SessionEvent enum) and the EventBus
//! - Configuration file resolution and loading
//! - Logging configuration
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
