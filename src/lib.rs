pub mod config;
pub mod error;
pub mod executor;
pub mod llm;
pub mod metrics;
pub mod relay;
pub mod reply;
pub mod server;
/// In-memory per-session transcripts with an optional eviction policy.
pub mod session;
