//! Channel member model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::wire;

/// A user as listed in an `UpdateUserList` broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default, deserialize_with = "wire::timestamp")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            display_name: None,
            is_online: true,
            last_seen: None,
        }
    }

    /// Name to show for this user, falling back to the username.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}
