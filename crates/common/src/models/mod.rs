//! Domain models
//!
//! Entities owned by the persistence collaborator and read by the engine.

mod deal;
mod knowledge;
mod tone_rule;

pub use deal::{Deal, DealId, DealStatus};
pub use knowledge::{
    ApprovalStatus, DealTerm, DocumentExcerpt, DynamicFact, FaqEntry, FaqStatus,
    KnowledgeRecord,
};
pub use tone_rule::{ToneDirective, ToneRule, ToneScope};
