pub mod assistant;
pub mod completion;

pub use assistant::AssistantService;
pub use completion::CompletionClient;
