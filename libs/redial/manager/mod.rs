//! # Redial Manager
//!
//! Registry of clients keyed by prefix, routing commands to their owner.

pub mod manager;

pub use manager::{ClientId, ClientManager};
