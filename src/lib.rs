//! Redial Suite - Main Library
//!
//! Application-facing entry point for the redial workspace.
//!
//! ## Architecture
//!
//! - **app_common**: config-path resolution and logging setup for applications
//! - **redial**: the reconnecting WebSocket connection manager (re-exported from workspace)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use redial_suite::app_common::{init_logging, load_options_from_env, ConfigType};
//! use redial_suite::redial::RedialClient;
//!
//! init_logging("info");
//! let options = load_options_from_env(ConfigType::Redial)?;
//! let client = RedialClient::new(options);
//! ```

// Re-export workspace libraries for convenience
pub use redial;

// Application common utilities
pub mod app_common {
    //! Common utilities for applications embedding redial

    pub mod config;
    pub mod logging;

    pub use config::{load_config_from_env, load_options_from_env, ConfigType};
    pub use logging::init_logging;
}
