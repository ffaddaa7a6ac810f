//! Collaborators that borrow an `LmStudioClient`: multi-turn conversations,
//! model listing, and health checks.

pub mod conversation;
pub mod health;
pub mod models;

pub use conversation::Conversation;
pub use health::{HealthService, HealthStatus, ServerState};
pub use models::{ModelInfo, ModelService};
