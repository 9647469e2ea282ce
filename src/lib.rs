//! freegate - Ollama and OpenAI compatible gateway for free-tier LLMs.
//!
//! Features:
//! - Free-tier model catalog ranked by context length
//! - Automatic fallback across models with persistent failure cooldowns
//! - Name filter restricting which models are offered
//! - NDJSON (Ollama) and SSE (OpenAI) streaming
//! - Direct mode for routing to any upstream model

pub mod api;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod cooldown;
pub mod dispatch;
pub mod error;
pub mod filter;
pub mod http;
pub mod stream;
