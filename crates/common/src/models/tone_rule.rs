//! Tone rule entity
//!
//! Tone rules constrain phrasing only. Every directive below transforms or
//! frames the reply; none of them is a source of deal facts.

use super::DealId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "deal_id", rename_all = "snake_case")]
pub enum ToneScope {
    Global,
    Deal(DealId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "directive", rename_all = "snake_case")]
pub enum ToneDirective {
    /// Opening line, e.g. "Hi there,"
    Salutation { text: String },
    /// Closing line, e.g. "Best,"
    SignOff { text: String },
    /// Phrase that must not appear in template prose
    ForbiddenPhrase {
        phrase: String,
        #[serde(default)]
        replacement: Option<String>,
    },
    /// Compliance boilerplate appended after the body
    Disclaimer { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneRule {
    pub id: i64,
    pub scope: ToneScope,
    #[serde(flatten)]
    pub directive: ToneDirective,
    /// Higher value = applied first
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_priority() -> i32 { 1 }
fn default_active() -> bool { true }

impl ToneRule {
    /// Active and scoped globally or to `deal_id`
    pub fn applies_to(&self, deal_id: DealId) -> bool {
        self.active
            && match self.scope {
                ToneScope::Global => true,
                ToneScope::Deal(id) => id == deal_id,
            }
    }
}
