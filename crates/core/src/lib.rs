//! # Threadline Core
//!
//! Domain types, traits, and error definitions for the threadline relay
//! service. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, StoreError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, Role, Thread, ThreadId, ToolCall};
pub use provider::{
    CompletionResponse, DeltaFragment, FinishReason, Provider, ProviderRequest, ToolCallFragment,
    ToolDefinition, Usage,
};
pub use store::TranscriptStore;
pub use tool::{Tool, ToolRegistry, ToolResult};
