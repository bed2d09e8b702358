// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The per-application overlay routing table.
//!
//! A destination node id maps to a set of next-hop node ids. A packet
//! is replicated to every member of the set, which gives both
//! multipath and a simple form of overlay multicast.

use crate::api::NodeId;
use crate::api::OvstackError;
use crate::api::RouteDesc;
use crate::ddi::sync::KRcu;
use alloc::collections::BTreeMap;
use alloc::collections::BTreeSet;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// The next hops for one destination. Never empty.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteEntry {
    dst: NodeId,
    next_hops: BTreeSet<NodeId>,
}

impl RouteEntry {
    pub fn dst(&self) -> NodeId {
        self.dst
    }

    pub fn next_hops(&self) -> &BTreeSet<NodeId> {
        &self.next_hops
    }

    pub fn contains(&self, nexthop: NodeId) -> bool {
        self.next_hops.contains(&nexthop)
    }

    pub fn len(&self) -> usize {
        self.next_hops.len()
    }

    /// Does this entry replicate to more than one next hop?
    pub fn is_multipath(&self) -> bool {
        self.next_hops.len() > 1
    }
}

impl From<&RouteEntry> for RouteDesc {
    fn from(entry: &RouteEntry) -> Self {
        RouteDesc {
            dst: entry.dst,
            next_hops: entry.next_hops.iter().copied().collect(),
        }
    }
}

pub struct RoutingTable {
    entries: KRcu<BTreeMap<NodeId, Arc<RouteEntry>>>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingTable {
    pub fn new() -> Self {
        Self { entries: KRcu::new(BTreeMap::new()) }
    }

    /// Add `nexthop` to the entry for `dst`, creating the entry if
    /// needed.
    pub fn add(&self, dst: NodeId, nexthop: NodeId) -> Result<(), OvstackError> {
        self.entries.update(|entries| {
            let mut entry = match entries.get(&dst) {
                Some(entry) => RouteEntry::clone(entry),
                None => RouteEntry { dst, next_hops: BTreeSet::new() },
            };

            if !entry.next_hops.insert(nexthop) {
                return Err(OvstackError::RouteExists { dst, nexthop });
            }

            entries.insert(dst, Arc::new(entry));
            Ok(())
        })
    }

    /// Remove `nexthop` from the entry for `dst`. Removing the last
    /// next hop removes the entry.
    pub fn delete(
        &self,
        dst: NodeId,
        nexthop: NodeId,
    ) -> Result<(), OvstackError> {
        self.entries.update(|entries| {
            let not_found = OvstackError::RouteNotFound { dst, nexthop };
            let Some(current) = entries.get(&dst) else {
                return Err(not_found);
            };

            let mut entry = RouteEntry::clone(current);
            if !entry.next_hops.remove(&nexthop) {
                return Err(not_found);
            }

            if entry.next_hops.is_empty() {
                entries.remove(&dst);
            } else {
                entries.insert(dst, Arc::new(entry));
            }
            Ok(())
        })
    }

    /// The next hops for `dst`, or `None` if there is no route.
    pub fn lookup(&self, dst: NodeId) -> Option<Arc<RouteEntry>> {
        self.entries.load().get(&dst).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn dump(&self) -> Vec<RouteDesc> {
        self.entries.load().values().map(|e| RouteDesc::from(&**e)).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn n(id: u32) -> NodeId {
        NodeId::new(id)
    }

    #[test]
    fn add_delete_round_trip() {
        let rt = RoutingTable::new();
        assert!(rt.lookup(n(200)).is_none());

        rt.add(n(200), n(200)).unwrap();
        assert!(rt.lookup(n(200)).unwrap().contains(n(200)));

        rt.delete(n(200), n(200)).unwrap();
        assert!(rt.lookup(n(200)).is_none());
        assert_eq!(rt.len(), 0);
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let rt = RoutingTable::new();
        rt.add(n(50), n(100)).unwrap();
        let before = rt.lookup(n(50)).unwrap();

        assert_eq!(
            rt.add(n(50), n(100)),
            Err(OvstackError::RouteExists { dst: n(50), nexthop: n(100) })
        );
        assert!(Arc::ptr_eq(&before, &rt.lookup(n(50)).unwrap()));
    }

    #[test]
    fn multipath_entry() {
        let rt = RoutingTable::new();
        rt.add(n(50), n(100)).unwrap();
        rt.add(n(50), n(200)).unwrap();

        let entry = rt.lookup(n(50)).unwrap();
        assert!(entry.is_multipath());
        assert_eq!(
            entry.next_hops().iter().copied().collect::<Vec<_>>(),
            vec![n(100), n(200)]
        );

        // Removing one member keeps the entry.
        rt.delete(n(50), n(100)).unwrap();
        let entry = rt.lookup(n(50)).unwrap();
        assert!(!entry.is_multipath());
        assert_eq!(entry.dst(), n(50));

        // The held snapshot is unaffected.
        assert_eq!(rt.dump(), vec![RouteDesc { dst: n(50), next_hops: vec![n(200)] }]);
    }

    #[test]
    fn delete_missing() {
        let rt = RoutingTable::new();
        assert_eq!(
            rt.delete(n(1), n(2)),
            Err(OvstackError::RouteNotFound { dst: n(1), nexthop: n(2) })
        );

        rt.add(n(1), n(3)).unwrap();
        assert_eq!(
            rt.delete(n(1), n(2)),
            Err(OvstackError::RouteNotFound { dst: n(1), nexthop: n(2) })
        );
        assert!(rt.lookup(n(1)).is_some());
    }
}
