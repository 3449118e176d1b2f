//! Configuration and the question-answering assistant for docent.

pub mod assistant;
pub mod config;

pub use assistant::{Assistant, SYSTEM_PROMPT, build_prompt};
pub use config::Config;
