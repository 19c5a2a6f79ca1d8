//! Thin wire client for OpenAI-compatible chat and embeddings endpoints
//! (Together, OpenAI, Mistral, Groq, and friends all speak this dialect).

mod client;
pub mod json;

pub use client::{ChatClient, ChatError, EmbeddingsClient};
