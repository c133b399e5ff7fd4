//! DealDesk Common Library
//!
//! Shared code for the DealDesk services including:
//! - Grounding engine (normalize, retrieve, decide, render, audit)
//! - Domain models and collaborator traits
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod errors;
pub mod grounding;
pub mod metrics;
pub mod models;
pub mod retrieval;
pub mod store;
pub mod text;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use grounding::{GroundingEngine, GroundingPolicy, InboundQuestion, ProcessOutcome};
pub use store::{AuditSink, DealDirectory, InMemoryStore, KnowledgeStore};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
