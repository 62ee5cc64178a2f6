pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{AskRequest, AssistantError, ChatTurn, Exchange};
pub use router::assistant_routes;
pub use services::{AssistantService, CompletionClient};
