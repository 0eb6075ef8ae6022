//! Dashboard user row
//!
//! Authentication itself lives outside the relay; the persistence contract
//! only carries the lookup.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    pub password_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}
