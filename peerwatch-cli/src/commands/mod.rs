//! CLI command implementations.

pub mod check_config;
pub mod device_id;
pub mod replay;
