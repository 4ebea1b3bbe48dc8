//! The delegation-graph snapshot format.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Object-store key of the current delegation-graph snapshot.
pub const SNAPSHOT_KEY: &str = "delegation/graph.json";

/// The delegation category that carries general voting weight.
pub const ALL_CATEGORY: &str = "all";

/// One user's entry in the snapshot. Absent fields mean "no delegation" /
/// "no phone" — partial data is a normal state, never an error.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntry {
    #[serde(default)]
    pub delegations: Option<HashMap<String, DelegationEdge>>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// One delegation edge; the target may be absent (revoked in place).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DelegationEdge {
    #[serde(default)]
    pub target: Option<String>,
}

/// An immutable snapshot of the delegation graph: `userId` → entry.
///
/// The graph may contain cycles, and a user may appear as both delegator
/// and delegate.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphSnapshot {
    pub users: HashMap<String, UserEntry>,
}

impl GraphSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a snapshot from its JSON form. Malformed snapshots degrade to
    /// an empty graph (zero delegation) rather than failing the read path.
    pub fn from_json(data: &str) -> Self {
        match serde_json::from_str(data) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "malformed delegation snapshot, using empty graph");
                Self::empty()
            }
        }
    }

    /// The "all"-category delegation target of a user, if any.
    pub fn all_target(&self, user_id: &str) -> Option<&str> {
        self.users
            .get(user_id)?
            .delegations
            .as_ref()?
            .get(ALL_CATEGORY)?
            .target
            .as_deref()
    }

    pub fn phone_of(&self, user_id: &str) -> Option<&str> {
        self.users.get(user_id)?.phone_number.as_deref()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_entry() {
        let snapshot = GraphSnapshot::from_json(
            r#"{
                "alice": {
                    "delegations": { "all": { "target": "bob" } },
                    "phoneNumber": "+15551234567"
                },
                "bob": {}
            }"#,
        );
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.all_target("alice"), Some("bob"));
        assert_eq!(snapshot.phone_of("alice"), Some("+15551234567"));
        assert_eq!(snapshot.all_target("bob"), None);
    }

    #[test]
    fn test_partial_data_is_no_delegation() {
        let snapshot = GraphSnapshot::from_json(
            r#"{
                "a": { "delegations": null },
                "b": { "delegations": { "all": {} } },
                "c": { "delegations": { "economic": { "target": "x" } } }
            }"#,
        );
        assert_eq!(snapshot.all_target("a"), None);
        assert_eq!(snapshot.all_target("b"), None);
        assert_eq!(snapshot.all_target("c"), None);
    }

    #[test]
    fn test_malformed_json_degrades_to_empty() {
        let snapshot = GraphSnapshot::from_json("{ not json");
        assert!(snapshot.is_empty());
    }
}
