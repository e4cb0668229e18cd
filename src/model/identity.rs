//! Identity records: who a player UUID belongs to.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cached mapping from player UUID to display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    pub uuid: Uuid,

    /// Canonical name as last reported by the identity service.
    pub name: String,

    /// Linked chat account, set by `link`.
    pub account_id: Option<u64>,

    /// When `name` was last fetched from the identity service.
    pub refreshed_at: Timestamp,
}
