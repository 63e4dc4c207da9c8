//! # reagent core
//!
//! Domain types, traits, and error definitions for the reagent orchestration
//! engine. This crate has no knowledge of the loop itself; it defines the
//! contracts the loop is built against.
//!
//! ## Contracts
//!
//! - [`LlmBackend`]: one completion call over an ordered message list
//! - [`Tool`]: an aliased capability with input/output JSON Schemas
//! - [`IdentityContext`]: host-supplied identity passed to tools only
//!
//! Concrete backends and tools live outside the engine and implement these
//! traits.

pub mod backend;
pub mod error;
pub mod event;
pub mod identity;
pub mod message;
pub mod schema;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use backend::{BackendResponse, LlmBackend, Usage};
pub use error::{BackendError, Error, RegistryError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use identity::IdentityContext;
pub use message::{Conversation, ConversationId, Message, Role};
pub use tool::{JsonMap, Tool, ToolCallOutcome, ToolCallRequest, ToolDescriptor};
