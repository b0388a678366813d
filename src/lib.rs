//! PriceCast Library
//!
//! Minute-cadence market observation, sentiment scoring and model
//! predictions streamed per model.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod models;
pub mod observer;
pub mod quota;
pub mod scheduler;
pub mod sentiment;
pub mod service;
pub mod sources;
pub mod types;

#[cfg(feature = "server")]
pub mod server;

pub use error::{ObserverError, Result};
