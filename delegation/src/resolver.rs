//! Delegation closure computation over a snapshot graph.
//!
//! For each identity that cast a direct ballot, the resolver walks the
//! reverse delegation index ("who delegates to this voter, transitively")
//! with an explicit worklist and a per-row visited set, so cyclic graphs
//! terminate and every node is visited at most once per starting row.
//!
//! Rules:
//! - a delegator who also cast a direct ballot contributes nothing and cuts
//!   off their own subtree (their weight already counts through their own
//!   ballot);
//! - a delegator's phone only adds verified weight when exactly one user in
//!   the snapshot owns that number — shared numbers are never trusted.

use std::collections::{HashMap, HashSet};

use crate::snapshot::{GraphSnapshot, ALL_CATEGORY};

/// Delegated weight attributed to one ballot-casting identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DelegationWeight {
    /// Delegators in the closure who did not vote themselves.
    pub delegated_count: u32,
    /// Of those, delegators holding a verified-unique phone number.
    pub delegated_verified_phone_count: u32,
}

/// Resolves delegated vote weight against one immutable snapshot.
pub struct DelegationResolver {
    /// Reverse index: delegate → direct delegators ("all" category only).
    reverse: HashMap<String, HashSet<String>>,
    /// Users whose phone number is owned by exactly one snapshot entry.
    verified_unique: HashSet<String>,
}

impl DelegationResolver {
    /// Build the reverse index and phone-uniqueness sets from a snapshot.
    pub fn new(snapshot: &GraphSnapshot) -> Self {
        let mut reverse: HashMap<String, HashSet<String>> = HashMap::new();
        for (user_id, entry) in &snapshot.users {
            let target = entry
                .delegations
                .as_ref()
                .and_then(|d| d.get(ALL_CATEGORY))
                .and_then(|e| e.target.as_deref());
            if let Some(target) = target {
                reverse
                    .entry(target.to_string())
                    .or_default()
                    .insert(user_id.clone());
            }
        }

        let mut phone_owners: HashMap<&str, HashSet<&str>> = HashMap::new();
        for (user_id, entry) in &snapshot.users {
            if let Some(phone) = entry.phone_number.as_deref() {
                phone_owners.entry(phone).or_default().insert(user_id);
            }
        }
        let verified_unique = phone_owners
            .values()
            .filter(|owners| owners.len() == 1)
            .flat_map(|owners| owners.iter().map(|s| s.to_string()))
            .collect();

        Self {
            reverse,
            verified_unique,
        }
    }

    /// Compute delegated weight for each voter, in input order.
    ///
    /// `voters` is one entry per distinct identity that cast a direct ballot
    /// in the poll under aggregation.
    pub fn resolve(&self, voters: &[String]) -> Vec<DelegationWeight> {
        let has_voted: HashSet<&str> = voters.iter().map(|s| s.as_str()).collect();
        voters
            .iter()
            .map(|voter| self.closure_weight(voter, &has_voted))
            .collect()
    }

    /// Weight for a single voter: worklist traversal of the reverse index.
    fn closure_weight(&self, voter: &str, has_voted: &HashSet<&str>) -> DelegationWeight {
        let mut weight = DelegationWeight::default();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut worklist: Vec<&str> = vec![voter];
        visited.insert(voter);

        while let Some(current) = worklist.pop() {
            let Some(delegators) = self.reverse.get(current) else {
                continue;
            };
            for delegator in delegators {
                if !visited.insert(delegator.as_str()) {
                    continue; // cycle or diamond, already handled this row
                }
                if has_voted.contains(delegator.as_str()) {
                    // Direct voters carry their own weight; their delegators
                    // flow to them, not through them.
                    continue;
                }
                weight.delegated_count += 1;
                if self.verified_unique.contains(delegator.as_str()) {
                    weight.delegated_verified_phone_count += 1;
                }
                worklist.push(delegator);
            }
        }
        weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::GraphSnapshot;

    fn snapshot(json: &str) -> GraphSnapshot {
        GraphSnapshot::from_json(json)
    }

    fn resolve_one(resolver: &DelegationResolver, voter: &str) -> DelegationWeight {
        resolver.resolve(&[voter.to_string()])[0]
    }

    #[test]
    fn test_single_delegation_with_unique_phones() {
        // B delegates "all" to A; both phones unique; A votes.
        let snap = snapshot(
            r#"{
                "a": { "phoneNumber": "+1" },
                "b": { "delegations": { "all": { "target": "a" } }, "phoneNumber": "+2" }
            }"#,
        );
        let resolver = DelegationResolver::new(&snap);
        let w = resolve_one(&resolver, "a");
        assert_eq!(w.delegated_count, 1);
        assert_eq!(w.delegated_verified_phone_count, 1);
    }

    #[test]
    fn test_cycle_terminates_and_unrelated_voter_gets_zero() {
        // A→B and B→A; C votes and is unrelated.
        let snap = snapshot(
            r#"{
                "a": { "delegations": { "all": { "target": "b" } } },
                "b": { "delegations": { "all": { "target": "a" } } },
                "c": {}
            }"#,
        );
        let resolver = DelegationResolver::new(&snap);
        let w = resolve_one(&resolver, "c");
        assert_eq!(w.delegated_count, 0);
    }

    #[test]
    fn test_cycle_members_count_each_other_once() {
        let snap = snapshot(
            r#"{
                "a": { "delegations": { "all": { "target": "b" } } },
                "b": { "delegations": { "all": { "target": "a" } } }
            }"#,
        );
        let resolver = DelegationResolver::new(&snap);
        // Only B votes: A's weight flows to B, the back-edge to B is cut by
        // the visited set.
        let w = resolve_one(&resolver, "b");
        assert_eq!(w.delegated_count, 1);
    }

    #[test]
    fn test_shared_phone_disqualifies_verified_weight() {
        // Two users share a phone and both delegate to X; X votes.
        let snap = snapshot(
            r#"{
                "p1": { "delegations": { "all": { "target": "x" } }, "phoneNumber": "+1" },
                "p2": { "delegations": { "all": { "target": "x" } }, "phoneNumber": "+1" },
                "x": {}
            }"#,
        );
        let resolver = DelegationResolver::new(&snap);
        let w = resolve_one(&resolver, "x");
        assert_eq!(w.delegated_count, 2);
        assert_eq!(w.delegated_verified_phone_count, 0);
    }

    #[test]
    fn test_direct_voter_excluded_everywhere() {
        // B→A and both voted: A gains nothing from B.
        let snap = snapshot(
            r#"{
                "a": {},
                "b": { "delegations": { "all": { "target": "a" } } }
            }"#,
        );
        let resolver = DelegationResolver::new(&snap);
        let weights = resolver.resolve(&["a".to_string(), "b".to_string()]);
        assert_eq!(weights[0].delegated_count, 0);
        assert_eq!(weights[1].delegated_count, 0);
    }

    #[test]
    fn test_voter_cuts_off_subtree() {
        // C→B→A, B also voted: A gains nothing (B's subtree cut), B gains C.
        let snap = snapshot(
            r#"{
                "a": {},
                "b": { "delegations": { "all": { "target": "a" } } },
                "c": { "delegations": { "all": { "target": "b" } } }
            }"#,
        );
        let resolver = DelegationResolver::new(&snap);
        let weights = resolver.resolve(&["a".to_string(), "b".to_string()]);
        assert_eq!(weights[0].delegated_count, 0);
        assert_eq!(weights[1].delegated_count, 1);
    }

    #[test]
    fn test_transitive_chain_counts_all() {
        // C→B→A, only A voted: both B and C flow to A.
        let snap = snapshot(
            r#"{
                "a": {},
                "b": { "delegations": { "all": { "target": "a" } } },
                "c": { "delegations": { "all": { "target": "b" } } }
            }"#,
        );
        let resolver = DelegationResolver::new(&snap);
        let w = resolve_one(&resolver, "a");
        assert_eq!(w.delegated_count, 2);
    }

    #[test]
    fn test_large_cycle_terminates() {
        // 1000-node ring, one voter. Visited set bounds the walk.
        let mut entries = Vec::new();
        for i in 0..1000 {
            entries.push(format!(
                r#""u{}": {{ "delegations": {{ "all": {{ "target": "u{}" }} }} }}"#,
                i,
                (i + 1) % 1000
            ));
        }
        let snap = snapshot(&format!("{{ {} }}", entries.join(",")));
        let resolver = DelegationResolver::new(&snap);
        let w = resolve_one(&resolver, "u0");
        assert_eq!(w.delegated_count, 999);
    }

    #[test]
    fn test_missing_delegation_data_is_zero() {
        let resolver = DelegationResolver::new(&GraphSnapshot::empty());
        let w = resolve_one(&resolver, "nobody");
        assert_eq!(w, DelegationWeight::default());
    }
}
