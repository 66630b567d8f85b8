//! Branded ID newtypes.
//!
//! Connections are keyed by a [`ConnectionId`] rather than by the peer
//! address, since the address is only an identity string for logs and
//! event payloads and is not guaranteed to be unique.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a registered connection (`conn_<uuid v7>`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a new time-ordered ID.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<str> for ConnectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_prefixed_uuid_v7() {
        let id = ConnectionId::new();
        let raw = id.as_str().strip_prefix("conn_").unwrap();
        let parsed = Uuid::parse_str(raw).unwrap();
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn display_matches_inner() {
        let id = ConnectionId::from("conn_abc");
        assert_eq!(id.to_string(), "conn_abc");
        assert_eq!(id.as_ref(), "conn_abc");
    }

    #[test]
    fn serde_is_transparent() {
        let id = ConnectionId::from("conn_x");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"conn_x\"");
    }
}
