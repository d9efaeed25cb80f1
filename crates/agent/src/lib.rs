//! Agent Runtime - permission-gated advice orchestration
//!
//! This crate turns a normalized invocation into an answer:
//! - Classifies the caller against the permission service (`permissions`)
//! - Generates advice through the external advice service, with optional
//!   model enhancement and a deterministic fallback (`pipeline`, `llm`)
//! - Handles subscription and account lookups (`accounts`)
//!
//! # Architecture
//!
//! Each invocation follows one linear path:
//! 1. **Normalize** (`counsel_core::normalize`) - any inbound shape → `Invocation`
//! 2. **Gate** (`permissions`) - short-circuits on denial or a failed check
//! 3. **Cache** (`counsel_core::cache`) - consulted only after entitlement is confirmed
//! 4. **Generate** (`pipeline`) - advice service → enhancement → fallback
//! 5. **Format** (`counsel_core::format`) - action-group or HTTP envelope
//!
//! # Key Types
//!
//! - `AgentRuntime` - Main orchestrator (see `runtime` module)
//! - `AdviceService` / `PermissionDirectory` / `TextModel` - collaborator seams
//!
//! # Safety Principle
//!
//! The model is strictly a formatter. It never adds advice; when it fails the
//! caller receives the raw answer from the advice service.

pub mod accounts;
pub mod llm;
pub mod permissions;
pub mod pipeline;
pub mod runtime;
pub mod services;

pub use llm::{ModelError, RetryPolicy, TextGenerationConfig, TextModel};
pub use permissions::PermissionGate;
pub use pipeline::{AdvicePipeline, AdviceResult, AdviceSettings, Enhancement};
pub use runtime::{AgentRuntime, InvocationContext, RuntimeSettings};
pub use services::{AdviceQuery, AdviceService, PermissionDirectory, ServiceReply, TransportError};
