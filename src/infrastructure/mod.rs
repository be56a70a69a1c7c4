pub mod config;
pub mod error;
pub mod logging;
pub mod memory_store;
pub mod remote_store;
pub mod rest_store;
