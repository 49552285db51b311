//! Council: a deliberation engine that convenes several coding-agent CLIs
//! (codex, claude, gemini) over a shared beads issue, running structured
//! research, critique, and synthesis rounds until the council converges or
//! hits its round cap. Every prompt, response, failure, and heartbeat is
//! persisted as an issue comment, so the transcript is the session.

pub mod artifacts;
pub mod beads;
pub mod chair;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod format;
pub mod heartbeat;
pub mod jsonutil;
pub mod probe;
pub mod provider;
pub mod repo_context;
pub mod schema;
pub mod transcript;

pub use config::CouncilConfig;
pub use engine::Engine;
pub use errors::CouncilError;
pub use events::EngineEvent;
pub use provider::ProviderName;
pub use schema::{AgentResponse, Phase};
