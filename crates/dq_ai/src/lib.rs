pub mod config;
pub mod embeddings;
pub mod index;
pub mod llm;
pub mod ollama;
pub mod prompts;
pub mod retrieve;
pub mod transcript;
