//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - init/status commands and shared utilities (open_db)
//! - `users` - user registration and listing
//! - `import` - bulk sheet upload
//! - `allocate` - allocation engine commands
//! - `reports` - performance and leaderboard reports, visited export
//! - `serve` - web server command

pub mod allocate;
pub mod core;
pub mod import;
pub mod reports;
pub mod serve;
pub mod users;

// Re-export command functions for main.rs
pub use allocate::*;
pub use core::*;
pub use import::*;
pub use reports::*;
pub use serve::*;
pub use users::*;
