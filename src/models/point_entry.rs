use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PointReason {
    /// Credit from a completed or approved funding intent.
    Funding,
    /// Debit for a cart checkout.
    Purchase,
    /// Absolute balance set by an administrator.
    AdminAdjustment,
}

/// One row of the balance ledger.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointEntry {
    pub id: String,
    pub user_id: String,
    pub delta: i64,
    pub balance_after: i64,
    pub reason: PointReason,
    pub intent_id: Option<String>,
    pub actor_id: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct SetPoints {
    pub points: i64,
}
