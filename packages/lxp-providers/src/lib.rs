//! Client for OpenAI-compatible chat completion endpoints.

pub mod chat;

pub use chat::{ChatClient, first_choice_text};
