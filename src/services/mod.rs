pub mod intent;
pub mod llm;
pub mod messages;
pub mod ranker;
pub mod recommendations;
pub mod reply;
pub mod sources;

pub use intent::IntentAnalyzer;
pub use llm::{ChatMessage, LlmClient, OpenAiClient};
pub use ranker::Ranker;
pub use recommendations::{Recommender, MAX_TOP_K};
pub use sources::{CandidateSource, StaticCatalog};
