//! CLI command implementations.

pub mod config;
pub mod login;
pub mod whitelist;

pub use config::run_config;
pub use login::run_login;
pub use whitelist::run_whitelist;
