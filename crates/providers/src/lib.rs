//! LLM provider implementations for threadline.
//!
//! - [`OpenAiCompatProvider`] — any OpenAI-compatible `/chat/completions`
//!   endpoint, streaming or not.
//! - [`RetryProvider`] — wraps another provider with bounded retry and
//!   exponential backoff for transient failures.

pub mod openai_compat;
pub mod retry;

pub use openai_compat::OpenAiCompatProvider;
pub use retry::RetryProvider;
