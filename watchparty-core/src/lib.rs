pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;

pub use config::EngineConfig;
pub use error::{Error, Result};
