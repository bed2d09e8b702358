// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The per-application node directory.

use super::node::Node;
use crate::api::IpAddr;
use crate::api::NodeDesc;
use crate::api::NodeId;
use crate::api::OvstackError;
use crate::api::Weight;
use crate::ddi::sync::KRcu;
use crate::ddi::time::Moment;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

pub type NodeMap = BTreeMap<NodeId, Arc<Node>>;

/// Map of node id to [`Node`].
///
/// Lookups never block behind a writer: they operate on the snapshot
/// that was current when they started. A deleted node stays alive
/// until the last packet holding a reference to it is done.
pub struct Directory {
    nodes: KRcu<NodeMap>,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory {
    pub fn new() -> Self {
        Self { nodes: KRcu::new(BTreeMap::new()) }
    }

    pub fn find(&self, id: NodeId) -> Option<Arc<Node>> {
        self.nodes.load().get(&id).cloned()
    }

    /// The whole directory, as of now.
    pub fn snapshot(&self) -> Arc<NodeMap> {
        self.nodes.load()
    }

    pub fn len(&self) -> usize {
        self.nodes.load().len()
    }

    /// Create a node with no locators.
    pub fn create(&self, id: NodeId) -> Result<Arc<Node>, OvstackError> {
        self.nodes.update(|nodes| {
            if nodes.contains_key(&id) {
                return Err(OvstackError::NodeExists(id));
            }

            let node = Arc::new(Node::new(id));
            nodes.insert(id, Arc::clone(&node));
            Ok(node)
        })
    }

    /// Delete a node along with all of its locators.
    pub fn delete(&self, id: NodeId) -> Result<Arc<Node>, OvstackError> {
        self.nodes.update(|nodes| {
            nodes.remove(&id).ok_or(OvstackError::NodeNotFound(id))
        })
    }

    /// Add a locator to node `id`, creating the node first if the
    /// directory has never heard of it.
    pub fn add_locator(
        &self,
        id: NodeId,
        addr: IpAddr,
        weight: Weight,
    ) -> Result<(), OvstackError> {
        self.nodes.update(|nodes| {
            let mut node = match nodes.get(&id) {
                Some(node) => Node::clone(node),
                None => Node::new(id),
            };
            node.add_locator(addr, weight)?;
            nodes.insert(id, Arc::new(node));
            Ok(())
        })
    }

    /// Remove one locator from node `id`. The node itself remains,
    /// even if this was its last locator.
    pub fn remove_locator(
        &self,
        id: NodeId,
        addr: &IpAddr,
    ) -> Result<(), OvstackError> {
        self.modify(id, |node| node.remove_locator(addr).map(|_| ()))
    }

    pub fn set_locator_weight(
        &self,
        id: NodeId,
        addr: &IpAddr,
        weight: Weight,
    ) -> Result<Weight, OvstackError> {
        self.modify(id, |node| node.set_locator_weight(addr, weight))
    }

    pub fn dump(&self) -> Vec<NodeDesc> {
        let now = Moment::now();
        self.nodes.load().values().map(|n| n.desc(now)).collect()
    }

    // Apply `f` to a private copy of node `id` and publish it. An error
    // from `f` publishes nothing.
    fn modify<R, F>(&self, id: NodeId, f: F) -> Result<R, OvstackError>
    where
        F: FnOnce(&mut Node) -> Result<R, OvstackError>,
    {
        self.nodes.update(|nodes| {
            let slot =
                nodes.get_mut(&id).ok_or(OvstackError::NodeNotFound(id))?;
            let mut node = Node::clone(slot);
            let ret = f(&mut node)?;
            *slot = Arc::new(node);
            Ok(ret)
        })
    }
}
