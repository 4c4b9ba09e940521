//! specforge - Core Library
//!
//! Shared functionality for the CLI binary: configuration, GitHub
//! mining, the OpenRouter client, evidence pack construction, run
//! budgets, synthesis prompts, and artifact writing. The validation
//! pipeline itself lives in `specforge_bridge`; this crate supplies
//! everything around it that touches the network or the filesystem.

pub mod artifact;
pub mod budget;
pub mod cache;
pub mod config;
pub mod evidence;
pub mod github;
pub mod llm;
pub mod synth;

pub use artifact::ArtifactWriter;
pub use budget::RunBudget;
pub use cache::FetchCache;
pub use config::Config;
pub use evidence::GithubEnricher;
pub use github::GithubClient;
pub use llm::LlmClient;
pub use synth::SpecSynthesizer;
