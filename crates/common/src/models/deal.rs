//! Deal entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deal identifier; scopes every other entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DealId(pub i64);

impl fmt::Display for DealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DealId {
    fn from(id: i64) -> Self {
        DealId(id)
    }
}

/// Deal lifecycle status. Deals are soft-closed, never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    Active,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,

    /// Human-readable name, e.g. "Northwind Seed SAFE"
    pub name: String,

    /// Short slug, e.g. "northwind-seed"
    pub code: String,

    pub status: DealStatus,

    pub created_at: DateTime<Utc>,
}

impl Deal {
    pub fn is_active(&self) -> bool {
        self.status == DealStatus::Active
    }
}
