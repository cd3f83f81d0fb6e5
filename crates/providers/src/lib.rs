//! Model clients for twin.
//!
//! All clients implement the `twin_core::Provider` trait.
//! `build_from_config` picks the transport named in the configuration.

pub mod ollama;
pub mod ollama_cli;
pub mod router;

pub use ollama::OllamaProvider;
pub use ollama_cli::OllamaCliProvider;
pub use router::{build_from_config, resolve_model};
