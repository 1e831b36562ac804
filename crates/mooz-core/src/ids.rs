//! Client identifier newtype.
//!
//! A [`ClientId`] names one connection for as long as it is registered with
//! the hub. Ids are `client_` followed by a UUID v7, so they are unique
//! within a process and sort by creation time. They carry no meaning across
//! restarts.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one connected client.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Generate a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("client_{}", Uuid::now_v7()))
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for ClientId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ClientId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ClientId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<ClientId> for String {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique() {
        let a = ClientId::new();
        let b = ClientId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn new_id_has_client_prefix_and_uuid_v7() {
        let id = ClientId::new();
        let raw = id.as_str().strip_prefix("client_").expect("prefix");
        let parsed = Uuid::parse_str(raw).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn ids_sort_by_creation() {
        let first = ClientId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = ClientId::new();
        assert!(first < second);
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = ClientId::from("client_abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""client_abc""#);
        let back: ClientId = serde_json::from_str(r#""client_abc""#).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display_and_deref() {
        let id = ClientId::from("client_x");
        assert_eq!(id.to_string(), "client_x");
        assert!(id.starts_with("client_"));
        assert_eq!(String::from(id), "client_x");
    }
}
