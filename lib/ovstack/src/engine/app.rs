// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Applications and the registry holding them.
//!
//! An [`Application`] is one upper-layer protocol multiplexed over the
//! overlay. It owns its own node, its node directory and its routing
//! table, and it is handed every payload addressed to it through an
//! [`AppRecv`] implementation.

use super::directory::Directory;
use super::header::OverlayHdr;
use super::node::Node;
use super::route::RoutingTable;
use crate::api::AddrFamily;
use crate::api::AppDesc;
use crate::api::AppId;
use crate::api::IpAddr;
use crate::api::NodeId;
use crate::api::OvstackError;
use crate::api::Weight;
use crate::ddi::sync::KRcu;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// The receive side of an application.
///
/// Called on the packet path, once per delivered copy. An
/// implementation must not block.
pub trait AppRecv: Send + Sync {
    fn recv(&self, hdr: &OverlayHdr, payload: &[u8]);
}

pub struct Application {
    id: AppId,
    own: KRcu<Node>,
    directory: Directory,
    routes: RoutingTable,
    recv: Arc<dyn AppRecv>,
}

impl core::fmt::Debug for Application {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Application")
            .field("id", &self.id)
            .field("own_node_id", &self.own_node_id())
            .finish_non_exhaustive()
    }
}

impl Application {
    fn new(id: AppId, recv: Arc<dyn AppRecv>) -> Self {
        Self {
            id,
            own: KRcu::new(Node::new(NodeId::UNSET)),
            directory: Directory::new(),
            routes: RoutingTable::new(),
            recv,
        }
    }

    pub fn id(&self) -> AppId {
        self.id
    }

    /// The current snapshot of this application's own node.
    pub fn own_node(&self) -> Arc<Node> {
        self.own.load()
    }

    pub fn own_node_id(&self) -> NodeId {
        self.own.load().id()
    }

    pub fn set_own_node_id(&self, id: NodeId) -> Result<(), OvstackError> {
        if id.is_unset() {
            return Err(OvstackError::InvalidArgument(String::from(
                "node id 0 is reserved",
            )));
        }

        self.own.update(|own| {
            own.set_id(id);
            Ok(())
        })
    }

    pub fn add_own_locator(
        &self,
        addr: IpAddr,
        weight: Weight,
    ) -> Result<(), OvstackError> {
        self.own.update(|own| own.add_locator(addr, weight))
    }

    pub fn remove_own_locator(&self, addr: &IpAddr) -> Result<(), OvstackError> {
        self.own.update(|own| own.remove_locator(addr).map(|_| ()))
    }

    /// Change the weight of an own locator, returning the old weight.
    pub fn set_own_locator_weight(
        &self,
        addr: &IpAddr,
        weight: Weight,
    ) -> Result<Weight, OvstackError> {
        self.own.update(|own| own.set_locator_weight(addr, weight))
    }

    /// Number of IPv4 and IPv6 locators on the own node.
    pub fn locator_family_counts(&self) -> (usize, usize) {
        let own = self.own.load();
        (own.count(AddrFamily::V4), own.count(AddrFamily::V6))
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// Hand one copy of a payload to the application.
    pub fn deliver(&self, hdr: &OverlayHdr, payload: &[u8]) {
        self.recv.recv(hdr, payload);
    }

    pub fn desc(&self) -> AppDesc {
        AppDesc {
            app: self.id,
            own_node_id: self.own_node_id(),
            nodes: u32::try_from(self.directory.len()).unwrap_or(u32::MAX),
            routes: u32::try_from(self.routes.len()).unwrap_or(u32::MAX),
        }
    }
}

pub type AppMap = BTreeMap<AppId, Arc<Application>>;

/// The set of applications registered in a namespace, at most one per
/// [`AppId`].
pub struct AppRegistry {
    apps: KRcu<AppMap>,
}

impl Default for AppRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AppRegistry {
    pub fn new() -> Self {
        Self { apps: KRcu::new(BTreeMap::new()) }
    }

    /// Register `id` with an empty directory, an empty routing table
    /// and an unset own node.
    pub fn register(
        &self,
        id: AppId,
        recv: Arc<dyn AppRecv>,
    ) -> Result<Arc<Application>, OvstackError> {
        self.apps.update(|apps| {
            if apps.contains_key(&id) {
                return Err(OvstackError::AppExists(id));
            }

            let app = Arc::new(Application::new(id, recv));
            apps.insert(id, Arc::clone(&app));
            Ok(app)
        })
    }

    /// Remove `id`, returning the application. Its tables go away with
    /// the last reference to it.
    pub fn unregister(
        &self,
        id: AppId,
    ) -> Result<Arc<Application>, OvstackError> {
        self.apps
            .update(|apps| apps.remove(&id).ok_or(OvstackError::AppNotFound(id)))
    }

    pub fn get(&self, id: AppId) -> Option<Arc<Application>> {
        self.apps.load().get(&id).cloned()
    }

    /// Is `app` the application currently registered under its id?
    pub fn is_registered(&self, app: &Arc<Application>) -> bool {
        self.apps
            .load()
            .get(&app.id())
            .is_some_and(|cur| Arc::ptr_eq(cur, app))
    }

    pub fn list(&self) -> Vec<Arc<Application>> {
        self.apps.load().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.apps.load().len()
    }

    /// Unregister everything, returning how many applications were
    /// removed.
    pub fn clear(&self) -> usize {
        self.apps.replace(BTreeMap::new()).len()
    }
}
