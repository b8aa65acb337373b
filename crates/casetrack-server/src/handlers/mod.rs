//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod allocation;
pub mod audit;
pub mod cases;
pub mod feedback;
pub mod performance;
pub mod users;
pub mod visits;

// Re-export all handlers for use in router
pub use allocation::*;
pub use audit::*;
pub use cases::*;
pub use feedback::*;
pub use performance::*;
pub use users::*;
pub use visits::*;
