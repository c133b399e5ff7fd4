//! Grounding Engine Core Components
//!
//! The grounding engine is the deterministic gate between the knowledge base
//! and an outbound investor reply:
//! - Knowledge normalization
//! - Answer / clarify / escalate decisions
//! - Tone rendering with output validation
//! - Tamper-evident audit records

mod audit;
mod decision;
mod engine;
mod normalizer;
mod policy;
mod tone;

pub use audit::{AuditId, AuditOutcome, AuditRecord, AuditRecorder, CandidateSnapshot};
pub use decision::{decide, ClarifyReason, ConfidenceTier, Decision, DecisionKind};
pub use engine::{GroundingEngine, InboundQuestion, ProcessOutcome, RenderedReply};
pub use normalizer::{
    normalize_records, resolve_active_deal, DealSnapshot, KnowledgeNormalizer, KnowledgeUnit,
    SourceType,
};
pub use policy::GroundingPolicy;
pub use tone::{ToneRenderer, ESCALATION_NOTICE, RENDER_FALLBACK_NOTICE, SOCIAL_ACKNOWLEDGEMENT};
