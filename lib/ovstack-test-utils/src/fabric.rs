// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! A simulated underlay connecting several namespaces.
//!
//! Each namespace sends into its own [`RecordingTransport`]. Pumping
//! the fabric hands every recorded datagram to the namespace owning
//! its outer destination address, until nothing is left in flight.

use super::CaptureApp;
use super::RecordingTransport;
use super::test_ns_cfg;
use ovstack::api::AppId;
use ovstack::api::IpAddr;
use ovstack::api::NodeId;
use ovstack::api::OvstackCfg;
use ovstack::engine::Namespace;
use ovstack::engine::ProcessResult;
use ovstack::engine::app::Application;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Upper bound on pump rounds. A routing loop is bounded by the TTL,
/// so hitting this means the engine failed to terminate one.
pub const MAX_ROUNDS: usize = 4096;

/// What happened to one datagram crossing the fabric.
#[derive(Clone, Debug)]
pub struct PumpEvent {
    pub from: IpAddr,
    pub to: IpAddr,
    /// `None` when no namespace owns `to`.
    pub result: Option<ProcessResult>,
}

/// One application instance on the fabric.
pub struct TestNode {
    pub ns: Arc<Namespace>,
    pub tx: Arc<RecordingTransport>,
    pub app: Arc<Application>,
    pub capture: Arc<CaptureApp>,
}

impl TestNode {
    pub fn node_id(&self) -> NodeId {
        self.app.own_node_id()
    }
}

#[derive(Default)]
pub struct Fabric {
    members: Vec<(Arc<Namespace>, Arc<RecordingTransport>)>,
    addrs: BTreeMap<IpAddr, usize>,
}

impl Fabric {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a namespace running `app` as `node_id`, with each of
    /// `addrs` as an own locator at the default weight, and attach
    /// those addresses to the fabric.
    pub fn add_node(
        &mut self,
        name: &str,
        cfg: OvstackCfg,
        app: AppId,
        node_id: NodeId,
        addrs: &[&str],
    ) -> TestNode {
        let (ns, tx) = test_ns_cfg(name, cfg);
        let capture = CaptureApp::new();
        let handle = ns.register(app, capture.clone()).unwrap();
        ns.set_own_node_id(app, node_id).unwrap();

        let idx = self.members.len();
        self.members.push((ns.clone(), tx.clone()));
        for addr in addrs {
            let addr: IpAddr = addr.parse().unwrap();
            ns.add_locator(app, addr, None).unwrap();
            assert!(
                self.addrs.insert(addr, idx).is_none(),
                "{addr} attached twice"
            );
        }

        TestNode { ns, tx, app: handle, capture }
    }

    /// Deliver everything in flight, and everything that causes, until
    /// the fabric is quiet.
    pub fn pump(&self) -> Vec<PumpEvent> {
        let mut events = Vec::new();

        for _ in 0..MAX_ROUNDS {
            let in_flight: Vec<_> =
                self.members.iter().flat_map(|(_, tx)| tx.take()).collect();

            if in_flight.is_empty() {
                return events;
            }

            for sent in in_flight {
                let result = self.addrs.get(&sent.dst).map(|&idx| {
                    self.members[idx].0.on_datagram(&sent.bytes, sent.src)
                });
                events.push(PumpEvent { from: sent.src, to: sent.dst, result });
            }
        }

        panic!("fabric still busy after {MAX_ROUNDS} rounds");
    }
}
