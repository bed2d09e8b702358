// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! A namespace: one isolated overlay routing domain.
//!
//! The namespace owns the application registry, the transport
//! endpoint, the forwarding counters, and the providers. Upper-layer
//! applications talk to it through the collaborator interface
//! (`register`, `transmit`, `on_datagram`, ...). Administrative
//! clients use the control-plane operations, which are keyed by
//! [`AppId`] and are also reachable through [`Namespace::ioctl()`].
//!
//! Control-plane operations either fully apply or leave state as it
//! was. Every applied change is logged at `Note`, every rejected one
//! at `Warn`. The packet path never logs.

use super::app::AppRecv;
use super::app::AppRegistry;
use super::app::Application;
use super::forward;
use super::forward::DropReason;
use super::forward::Origin;
use super::forward::ProcessResult;
use super::forward::TxMeta;
use super::header::OverlayHdr;
use super::node::Family;
use super::node::Locator;
use super::stat::OvstackStats;
use super::transport::Transport;
use crate::api::AppId;
use crate::api::IpAddr;
use crate::api::ListAppsResp;
use crate::api::ListLocatorsResp;
use crate::api::ListNodesResp;
use crate::api::ListRoutesResp;
use crate::api::LocatorDesc;
use crate::api::NodeDesc;
use crate::api::NodeId;
use crate::api::OvstackCfg;
use crate::api::OvstackError;
use crate::api::OvstackStatsSnap;
use crate::api::Weight;
use crate::ddi::time::Moment;
use crate::provider::LogLevel;
use crate::provider::LogProvider;
use crate::provider::Providers;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use itertools::Itertools;

pub struct Namespace {
    name: String,
    cfg: OvstackCfg,
    registry: AppRegistry,
    transport: Arc<dyn Transport>,
    stats: OvstackStats,
    log: Box<dyn LogProvider>,
}

impl Namespace {
    pub fn new(
        name: &str,
        cfg: OvstackCfg,
        transport: Arc<dyn Transport>,
        providers: Providers,
    ) -> Result<Self, OvstackError> {
        cfg.validate()?;

        let ns = Self {
            name: String::from(name),
            cfg,
            registry: AppRegistry::new(),
            transport,
            stats: OvstackStats::new(),
            log: providers.log,
        };
        ns.note(&format!(
            "created (ttl {}, port {}, default weight {})",
            cfg.ttl, cfg.port, cfg.default_weight
        ));
        Ok(ns)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cfg(&self) -> &OvstackCfg {
        &self.cfg
    }

    // ================================================================
    // Collaborator interface
    // ================================================================

    /// Register an application. The returned handle is what the
    /// application transmits with.
    pub fn register(
        &self,
        app: AppId,
        recv: Arc<dyn AppRecv>,
    ) -> Result<Arc<Application>, OvstackError> {
        let res = self.registry.register(app, recv);
        self.record(&res, || format!("register app {app}"))?;
        res
    }

    /// Unregister an application, dropping its directory, routing
    /// table and own node. Packets in flight keep what they hold.
    pub fn unregister(&self, app: AppId) -> Result<(), OvstackError> {
        let res = self.registry.unregister(app).map(|_| ());
        self.record(&res, || format!("unregister app {app}"))?;
        res
    }

    /// Send `payload` towards `dst` with VNI 0 and no flags.
    pub fn transmit(
        &self,
        app: &Arc<Application>,
        payload: &[u8],
        dst: NodeId,
        hash: u32,
    ) -> ProcessResult {
        let meta = TxMeta { hash, ..Default::default() };
        self.transmit_meta(app, payload, dst, meta)
    }

    /// Send `payload` towards `dst`, with the header values in `meta`.
    pub fn transmit_meta(
        &self,
        app: &Arc<Application>,
        payload: &[u8],
        dst: NodeId,
        meta: TxMeta,
    ) -> ProcessResult {
        if !self.registry.is_registered(app) {
            self.stats.drop(DropReason::UnknownApplication);
            return ProcessResult::Drop {
                reason: DropReason::UnknownApplication,
            };
        }

        let own_id = app.own_node_id();
        if own_id.is_unset() {
            self.stats.drop(DropReason::OwnNodeUnset);
            return ProcessResult::Drop { reason: DropReason::OwnNodeUnset };
        }

        let hdr = OverlayHdr::originate(
            app.id(),
            self.cfg.ttl,
            meta.vni,
            meta.flags,
            meta.hash,
            dst,
            own_id,
        );
        forward::forward(
            app,
            &hdr,
            payload,
            Origin::Local,
            &*self.transport,
            &self.stats,
        )
    }

    /// Process one datagram received by the transport. `from` is its
    /// outer source address.
    pub fn on_datagram(&self, raw: &[u8], from: IpAddr) -> ProcessResult {
        forward::receive(
            &self.registry,
            raw,
            from,
            &*self.transport,
            &self.stats,
        )
    }

    /// The own-node locator a flow with `hash` would be sent from.
    pub fn src_locator(
        &self,
        app: &Application,
        hash: u32,
        family: Family,
    ) -> Option<Locator> {
        app.own_node().select(hash, family).copied()
    }

    /// The locator of `node` a flow with `hash` would be sent to.
    pub fn dst_locator(
        &self,
        app: &Application,
        node: NodeId,
        hash: u32,
        family: Family,
    ) -> Option<Locator> {
        app.directory().find(node)?.select(hash, family).copied()
    }

    // ================================================================
    // Control plane
    // ================================================================

    fn app(&self, app: AppId) -> Result<Arc<Application>, OvstackError> {
        self.registry.get(app).ok_or(OvstackError::AppNotFound(app))
    }

    pub fn set_own_node_id(
        &self,
        app: AppId,
        node_id: NodeId,
    ) -> Result<(), OvstackError> {
        let res = self.app(app).and_then(|a| a.set_own_node_id(node_id));
        self.record(&res, || format!("app {app}: set own node id {node_id}"))
    }

    pub fn get_own_node_id(&self, app: AppId) -> Result<NodeId, OvstackError> {
        Ok(self.app(app)?.own_node_id())
    }

    /// Add a locator to the own node, at the default weight unless
    /// one is given.
    pub fn add_locator(
        &self,
        app: AppId,
        addr: IpAddr,
        weight: Option<u8>,
    ) -> Result<(), OvstackError> {
        let res = self.app(app).and_then(|a| {
            let weight = self.cfg.weight_or_default(weight)?;
            check_addr(&addr)?;
            a.add_own_locator(addr, weight)
        });
        self.record(&res, || format!("app {app}: add own locator {addr}"))
    }

    pub fn delete_locator(
        &self,
        app: AppId,
        addr: IpAddr,
    ) -> Result<(), OvstackError> {
        let res = self.app(app).and_then(|a| a.remove_own_locator(&addr));
        self.record(&res, || format!("app {app}: delete own locator {addr}"))
    }

    pub fn set_locator_weight(
        &self,
        app: AppId,
        addr: IpAddr,
        weight: u8,
    ) -> Result<(), OvstackError> {
        let res = self.app(app).and_then(|a| {
            a.set_own_locator_weight(&addr, Weight::new(weight)?)
        });
        self.record(&res, || {
            format!("app {app}: own locator {addr} weight {weight}")
        })?;
        Ok(())
    }

    pub fn get_locator(
        &self,
        app: AppId,
        addr: IpAddr,
    ) -> Result<LocatorDesc, OvstackError> {
        let own = self.app(app)?.own_node();
        own.find_locator(&addr)
            .map(LocatorDesc::from)
            .ok_or(OvstackError::LocatorNotFound { node: own.id(), addr })
    }

    pub fn list_locators(
        &self,
        app: AppId,
    ) -> Result<ListLocatorsResp, OvstackError> {
        let own = self.app(app)?.own_node();
        Ok(ListLocatorsResp {
            node_id: own.id(),
            locators: own.iter().map(LocatorDesc::from).collect(),
        })
    }

    /// Add a locator to a remote node, creating the node the first
    /// time it is named.
    pub fn add_node(
        &self,
        app: AppId,
        node_id: NodeId,
        addr: IpAddr,
        weight: Option<u8>,
    ) -> Result<(), OvstackError> {
        let res = self.app(app).and_then(|a| {
            let weight = self.cfg.weight_or_default(weight)?;
            check_node_id(node_id)?;
            check_addr(&addr)?;
            a.directory().add_locator(node_id, addr, weight)
        });
        self.record(&res, || format!("app {app}: add node {node_id} at {addr}"))
    }

    /// Delete one locator of a remote node or, without `addr`, the
    /// whole node.
    pub fn delete_node(
        &self,
        app: AppId,
        node_id: NodeId,
        addr: Option<IpAddr>,
    ) -> Result<(), OvstackError> {
        let res = self.app(app).and_then(|a| match addr {
            Some(addr) => a.directory().remove_locator(node_id, &addr),
            None => a.directory().delete(node_id).map(|_| ()),
        });
        self.record(&res, || match addr {
            Some(addr) => format!("app {app}: delete node {node_id} at {addr}"),
            None => format!("app {app}: delete node {node_id}"),
        })
    }

    pub fn set_node_weight(
        &self,
        app: AppId,
        node_id: NodeId,
        addr: IpAddr,
        weight: u8,
    ) -> Result<(), OvstackError> {
        let res = self.app(app).and_then(|a| {
            a.directory().set_locator_weight(
                node_id,
                &addr,
                Weight::new(weight)?,
            )
        });
        self.record(&res, || {
            format!("app {app}: node {node_id} at {addr} weight {weight}")
        })?;
        Ok(())
    }

    pub fn get_node(
        &self,
        app: AppId,
        node_id: NodeId,
    ) -> Result<NodeDesc, OvstackError> {
        self.app(app)?
            .directory()
            .find(node_id)
            .map(|n| n.desc(Moment::now()))
            .ok_or(OvstackError::NodeNotFound(node_id))
    }

    pub fn list_nodes(&self, app: AppId) -> Result<ListNodesResp, OvstackError> {
        Ok(ListNodesResp { nodes: self.app(app)?.directory().dump() })
    }

    pub fn add_route(
        &self,
        app: AppId,
        dst: NodeId,
        nexthop: NodeId,
    ) -> Result<(), OvstackError> {
        let a = self.app(app);
        let res = a.as_ref().map_err(|e| e.clone()).and_then(|a| {
            check_node_id(dst)?;
            check_node_id(nexthop)?;
            a.routes().add(dst, nexthop)
        });
        self.record(&res, || {
            let hops = a
                .iter()
                .filter_map(|a| a.routes().lookup(dst))
                .flat_map(|e| e.next_hops().clone())
                .join(", ");
            format!("app {app}: route {dst} -> [{hops}]")
        })
    }

    pub fn delete_route(
        &self,
        app: AppId,
        dst: NodeId,
        nexthop: NodeId,
    ) -> Result<(), OvstackError> {
        let res = self.app(app).and_then(|a| a.routes().delete(dst, nexthop));
        self.record(&res, || {
            format!("app {app}: delete next hop {nexthop} for {dst}")
        })
    }

    pub fn list_routes(
        &self,
        app: AppId,
    ) -> Result<ListRoutesResp, OvstackError> {
        Ok(ListRoutesResp { routes: self.app(app)?.routes().dump() })
    }

    pub fn list_apps(&self) -> ListAppsResp {
        ListAppsResp {
            apps: self.registry.list().iter().map(|a| a.desc()).collect(),
        }
    }

    pub fn dump_stats(&self) -> OvstackStatsSnap {
        self.stats.snapshot()
    }

    /// Unregister every application. The namespace stays usable.
    pub fn shutdown(&self) {
        let released = self.registry.clear();
        if released > 0 {
            self.note(&format!("shut down, released {released} applications"));
        }
    }

    fn note(&self, msg: &str) {
        self.log.log(LogLevel::Note, &format!("{}: {msg}", self.name));
    }

    fn record<T, F>(
        &self,
        res: &Result<T, OvstackError>,
        what: F,
    ) -> Result<(), OvstackError>
    where
        F: FnOnce() -> String,
    {
        match res {
            Ok(_) => {
                self.note(&what());
                Ok(())
            }
            Err(e) => {
                self.log.log(
                    LogLevel::Warn,
                    &format!("{}: {} rejected: {e}", self.name, what()),
                );
                Err(e.clone())
            }
        }
    }
}

#[cfg(feature = "userland")]
impl Namespace {
    /// Create a namespace over a [`UdpTransport`] sending to the
    /// configured port. The caller binds the transport's sockets and
    /// feeds what they receive to [`Namespace::on_datagram()`].
    ///
    /// [`UdpTransport`]: super::transport::UdpTransport
    pub fn new_udp(
        name: &str,
        cfg: OvstackCfg,
        providers: Providers,
    ) -> Result<(Self, Arc<super::transport::UdpTransport>), OvstackError> {
        let udp = Arc::new(super::transport::UdpTransport::new(cfg.port));
        let ns = Self::new(name, cfg, udp.clone(), providers)?;
        Ok((ns, udp))
    }
}

impl Drop for Namespace {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn check_addr(addr: &IpAddr) -> Result<(), OvstackError> {
    if addr.is_unspecified() {
        return Err(OvstackError::InvalidArgument(format!(
            "{addr} is not a usable locator"
        )));
    }
    Ok(())
}

fn check_node_id(node_id: NodeId) -> Result<(), OvstackError> {
    if node_id.is_unset() {
        return Err(OvstackError::InvalidArgument(String::from(
            "node id 0 is reserved",
        )));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::APP_ETHER;
    use crate::api::ErrorKind;
    use crate::ddi::sync::KMutex;
    use crate::engine::transport::Datagram;
    use crate::provider::PrintlnLog;
    use alloc::vec::Vec;

    #[derive(Default)]
    struct Sink {
        sent: KMutex<Vec<(IpAddr, IpAddr)>>,
    }

    impl Transport for Sink {
        fn send(&self, dgram: &Datagram<'_>) -> Result<(), DropReason> {
            self.sent.lock().push((dgram.src, dgram.dst));
            Ok(())
        }
    }

    struct Nop;

    impl AppRecv for Nop {
        fn recv(&self, _hdr: &OverlayHdr, _payload: &[u8]) {}
    }

    fn ns(sink: Arc<Sink>) -> Namespace {
        Namespace::new(
            "test",
            OvstackCfg::default(),
            sink,
            Providers { log: Box::new(PrintlnLog) },
        )
        .unwrap()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn n(id: u32) -> NodeId {
        NodeId::new(id)
    }

    #[cfg(feature = "userland")]
    #[test]
    fn udp_namespace_sends_to_cfg_port() {
        use std::net::UdpSocket;
        use std::time::Duration;

        let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let port = peer.local_addr().unwrap().port();

        let cfg = OvstackCfg { port, ..Default::default() };
        let (ns, udp) = Namespace::new_udp(
            "udp",
            cfg,
            Providers { log: Box::new(PrintlnLog) },
        )
        .unwrap();
        assert_eq!(udp.port(), port);
        udp.bind("127.0.0.1:0".parse().unwrap()).unwrap();

        let app = ns.register(APP_ETHER, Arc::new(Nop)).unwrap();
        ns.set_own_node_id(APP_ETHER, n(100)).unwrap();
        ns.add_locator(APP_ETHER, ip("127.0.0.1"), None).unwrap();
        ns.add_node(APP_ETHER, n(200), ip("127.0.0.1"), None).unwrap();
        ns.add_route(APP_ETHER, n(200), n(200)).unwrap();
        assert!(matches!(
            ns.transmit(&app, b"to the port", n(200), 0),
            ProcessResult::Forward(_)
        ));

        let mut buf = [0u8; 64];
        let (len, _) = peer.recv_from(&mut buf).unwrap();
        let (hdr, payload) = OverlayHdr::parse(&buf[..len]).unwrap();
        assert_eq!(hdr.dst, n(200));
        assert_eq!(hdr.src, n(100));
        assert_eq!(payload, b"to the port");
    }

    #[test]
    fn bad_cfg() {
        let res = Namespace::new(
            "bad",
            OvstackCfg { ttl: 0, ..Default::default() },
            Arc::new(Sink::default()),
            Providers { log: Box::new(PrintlnLog) },
        );
        assert!(res.is_err());
    }

    #[test]
    fn control_plane_needs_an_app() {
        let ns = ns(Arc::new(Sink::default()));
        let err = ns.add_locator(APP_ETHER, ip("10.0.0.1"), None).unwrap_err();
        assert_eq!(err, OvstackError::AppNotFound(APP_ETHER));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn default_weight_and_point_queries() {
        let ns = ns(Arc::new(Sink::default()));
        ns.register(APP_ETHER, Arc::new(Nop)).unwrap();
        ns.set_own_node_id(APP_ETHER, n(100)).unwrap();
        ns.add_locator(APP_ETHER, ip("10.0.0.1"), None).unwrap();
        ns.add_node(APP_ETHER, n(200), ip("10.0.0.2"), Some(7)).unwrap();

        assert_eq!(ns.get_own_node_id(APP_ETHER).unwrap(), n(100));
        assert_eq!(
            ns.get_locator(APP_ETHER, ip("10.0.0.1")).unwrap(),
            LocatorDesc { addr: ip("10.0.0.1"), weight: 50 }
        );
        assert_eq!(
            ns.get_locator(APP_ETHER, ip("10.0.0.9")).unwrap_err().kind(),
            ErrorKind::NotFound
        );

        let node = ns.get_node(APP_ETHER, n(200)).unwrap();
        assert_eq!(node.weight_sum_v4, 7);
        assert_eq!(node.locators.len(), 1);

        ns.set_node_weight(APP_ETHER, n(200), ip("10.0.0.2"), 9).unwrap();
        assert_eq!(ns.get_node(APP_ETHER, n(200)).unwrap().weight_sum_v4, 9);
    }

    #[test]
    fn invalid_arguments() {
        let ns = ns(Arc::new(Sink::default()));
        ns.register(APP_ETHER, Arc::new(Nop)).unwrap();

        let kind = |r: Result<(), OvstackError>| r.unwrap_err().kind();
        assert_eq!(
            kind(ns.add_locator(APP_ETHER, ip("10.0.0.1"), Some(0))),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            kind(ns.add_locator(APP_ETHER, ip("0.0.0.0"), None)),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            kind(ns.add_node(APP_ETHER, n(0), ip("10.0.0.2"), None)),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            kind(ns.add_route(APP_ETHER, n(0), n(1))),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            kind(ns.set_own_node_id(APP_ETHER, n(0))),
            ErrorKind::InvalidArgument
        );
        assert_eq!(ns.list_locators(APP_ETHER).unwrap().locators.len(), 0);
    }

    #[test]
    fn delete_node_forms() {
        let ns = ns(Arc::new(Sink::default()));
        ns.register(APP_ETHER, Arc::new(Nop)).unwrap();
        ns.add_node(APP_ETHER, n(200), ip("10.0.0.2"), None).unwrap();
        ns.add_node(APP_ETHER, n(200), ip("fd00::2"), None).unwrap();

        ns.delete_node(APP_ETHER, n(200), Some(ip("10.0.0.2"))).unwrap();
        let node = ns.get_node(APP_ETHER, n(200)).unwrap();
        assert_eq!(node.weight_sum_v4, 0);
        assert_eq!(node.weight_sum_v6, 50);

        ns.delete_node(APP_ETHER, n(200), None).unwrap();
        assert_eq!(
            ns.delete_node(APP_ETHER, n(200), None).unwrap_err(),
            OvstackError::NodeNotFound(n(200))
        );
        assert!(ns.list_nodes(APP_ETHER).unwrap().nodes.is_empty());
    }

    #[test]
    fn stale_handle_cannot_transmit() {
        let ns = ns(Arc::new(Sink::default()));
        let app = ns.register(APP_ETHER, Arc::new(Nop)).unwrap();
        ns.unregister(APP_ETHER).unwrap();

        assert_eq!(
            ns.transmit(&app, b"", n(1), 0),
            ProcessResult::Drop { reason: DropReason::UnknownApplication }
        );
    }

    #[test]
    fn unset_own_node_cannot_transmit() {
        let ns = ns(Arc::new(Sink::default()));
        let app = ns.register(APP_ETHER, Arc::new(Nop)).unwrap();
        assert_eq!(
            ns.transmit(&app, b"", n(1), 0),
            ProcessResult::Drop { reason: DropReason::OwnNodeUnset }
        );
        assert_eq!(ns.dump_stats().drop_own_unset, 1);
    }

    #[test]
    fn locator_helpers() {
        let ns = ns(Arc::new(Sink::default()));
        let app = ns.register(APP_ETHER, Arc::new(Nop)).unwrap();
        ns.add_locator(APP_ETHER, ip("10.0.0.1"), Some(1)).unwrap();
        ns.add_locator(APP_ETHER, ip("fd00::1"), Some(1)).unwrap();
        ns.add_node(APP_ETHER, n(200), ip("fd00::2"), None).unwrap();

        let src = ns.src_locator(&app, 1, Family::Any).unwrap();
        assert_eq!(src.addr(), ip("fd00::1"));
        let src = ns.src_locator(&app, 1, Family::V4).unwrap();
        assert_eq!(src.addr(), ip("10.0.0.1"));

        assert!(ns.dst_locator(&app, n(200), 0, Family::V4).is_none());
        assert_eq!(
            ns.dst_locator(&app, n(200), 0, Family::V6).unwrap().addr(),
            ip("fd00::2")
        );
        assert!(ns.dst_locator(&app, n(300), 0, Family::Any).is_none());
    }

    #[test]
    fn list_apps_and_shutdown() {
        let ns = ns(Arc::new(Sink::default()));
        ns.register(AppId::new(4), Arc::new(Nop)).unwrap();
        ns.register(APP_ETHER, Arc::new(Nop)).unwrap();
        ns.set_own_node_id(APP_ETHER, n(100)).unwrap();
        ns.add_node(APP_ETHER, n(200), ip("10.0.0.2"), None).unwrap();
        ns.add_route(APP_ETHER, n(200), n(200)).unwrap();

        let apps = ns.list_apps().apps;
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[1].app, APP_ETHER);
        assert_eq!(apps[1].own_node_id, n(100));
        assert_eq!(apps[1].nodes, 1);
        assert_eq!(apps[1].routes, 1);

        ns.shutdown();
        assert!(ns.list_apps().apps.is_empty());
        assert_eq!(
            ns.list_routes(APP_ETHER).unwrap_err(),
            OvstackError::AppNotFound(APP_ETHER)
        );
    }
}
