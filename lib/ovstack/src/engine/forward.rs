// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The forwarding engine.
//!
//! A packet moves through `LocalSend -> Encapsulated -> (transport) ->
//! Received` and ends up delivered, relayed, or dropped. Both
//! directions are pure lookups over the current snapshots of the
//! routing table and directory: nothing here takes a writer lock, and
//! nothing here allocates beyond the per-leg wire buffer.
//!
//! The header's destination node id is always the final destination.
//! A next hop only decides which node's locator becomes the outer
//! destination. A relay therefore routes on the same key as the
//! origin did, which is what bounds a routing loop by the TTL.
//!
//! Drops are outcomes, not errors. Each one is counted in the
//! namespace stats exactly once, by this module.

use super::app::AppRegistry;
use super::app::Application;
use super::header::OverlayHdr;
use super::header::OverlayHdrError;
use super::node::Family;
use super::node::Node;
use super::stat::OvstackStats;
use super::transport::Datagram;
use super::transport::Transport;
use crate::api::AddrFamily;
use crate::api::ErrorKind;
use crate::api::IpAddr;
use crate::api::Vni;
use core::fmt;
use core::fmt::Display;

/// Why a packet, or one leg of it, was dropped.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DropReason {
    /// No routing entry for the destination.
    NoRoute,
    /// No usable locator pair towards a next hop.
    NoLocator,
    TtlExceeded,
    /// The header names an application that isn't registered.
    UnknownApplication,
    AllocationFailure,
    /// A relayed copy of our own packet came back to us.
    Echo,
    /// A relayed replication leg would go back where it came from.
    Rpf,
    OwnNodeUnset,
    Truncated,
    BadVersion,
    /// The transport refused the datagram.
    Transport,
}

impl DropReason {
    /// The error class of this drop, if it maps onto one. Loop
    /// suppression and transport failures are not errors of the
    /// packet itself.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::NoRoute => Some(ErrorKind::NoRoute),
            Self::NoLocator => Some(ErrorKind::NoLocator),
            Self::TtlExceeded => Some(ErrorKind::TtlExceeded),
            Self::UnknownApplication => Some(ErrorKind::UnknownApplication),
            Self::AllocationFailure => Some(ErrorKind::AllocationFailure),
            Self::OwnNodeUnset => Some(ErrorKind::InvalidArgument),
            Self::Truncated | Self::BadVersion => Some(ErrorKind::Protocol),
            Self::Echo | Self::Rpf | Self::Transport => None,
        }
    }
}

impl Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoRoute => "no route",
            Self::NoLocator => "no locator",
            Self::TtlExceeded => "TTL exceeded",
            Self::UnknownApplication => "unknown application",
            Self::AllocationFailure => "allocation failure",
            Self::Echo => "echo",
            Self::Rpf => "reverse path",
            Self::OwnNodeUnset => "own node unset",
            Self::Truncated => "truncated",
            Self::BadVersion => "bad version",
            Self::Transport => "transport",
        };
        write!(f, "{s}")
    }
}

impl From<OverlayHdrError> for DropReason {
    fn from(e: OverlayHdrError) -> Self {
        match e {
            OverlayHdrError::Truncated { .. } => Self::Truncated,
            OverlayHdrError::BadVersion { .. } => Self::BadVersion,
        }
    }
}

/// What happened to the legs of one routed packet.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Forwarded {
    /// Datagrams accepted by the transport.
    pub sent: u32,
    /// Copies handed to the local application.
    pub delivered: u32,
    /// Legs dropped.
    pub dropped: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessResult {
    /// Received and handed to the local application.
    Deliver,
    /// Routed. At least one leg was sent or delivered.
    Forward(Forwarded),
    Drop { reason: DropReason },
}

/// Per-packet header values chosen by the sender.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TxMeta {
    pub hash: u32,
    pub vni: Vni,
    pub flags: u8,
}

/// Where a packet entering the routing step came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Origin {
    /// Originated by a local application.
    Local,
    /// Received from the transport and being relayed. `from` is the
    /// outer source address it arrived with.
    Relay { from: IpAddr },
}

/// Choose the (source, destination) locator pair for sending from
/// `own` to `peer`.
///
/// A dual-stacked own node picks its source across both families and
/// the destination follows that family. A single-stacked own node
/// uses the family it has. If the peer has nothing in the chosen
/// family the other one is tried, provided we have a source in it.
pub fn resolve_locators(
    own: &Node,
    peer: &Node,
    hash: u32,
) -> Option<(IpAddr, IpAddr)> {
    let has_v4 = own.count(AddrFamily::V4) > 0;
    let has_v6 = own.count(AddrFamily::V6) > 0;

    let src = match (has_v4, has_v6) {
        (true, true) => own.select(hash, Family::Any)?,
        (true, false) => own.select(hash, Family::V4)?,
        (false, true) => own.select(hash, Family::V6)?,
        (false, false) => return None,
    };

    let af = src.family();
    if let Some(dst) = peer.select(hash, af.into()) {
        return Some((src.addr(), dst.addr()));
    }

    let other = af.other();
    let src = own.select(hash, other.into())?;
    let dst = peer.select(hash, other.into())?;
    Some((src.addr(), dst.addr()))
}

/// Route `hdr`/`payload` to every next hop of `hdr.dst`.
///
/// A next hop equal to our own node is a local delivery, except for a
/// relayed packet we originated ourselves, which is an echo. On a
/// multipath relay, a leg towards the node owning the address the
/// packet arrived from is suppressed. Every other leg gets its own
/// header copy and its own locator pair. A leg that fails costs only
/// itself.
pub fn forward(
    app: &Application,
    hdr: &OverlayHdr,
    payload: &[u8],
    origin: Origin,
    transport: &dyn Transport,
    stats: &OvstackStats,
) -> ProcessResult {
    let own = app.own_node();
    let own_id = own.id();
    if own_id.is_unset() {
        stats.drop(DropReason::OwnNodeUnset);
        return ProcessResult::Drop { reason: DropReason::OwnNodeUnset };
    }

    let Some(entry) = app.routes().lookup(hdr.dst) else {
        stats.drop(DropReason::NoRoute);
        return ProcessResult::Drop { reason: DropReason::NoRoute };
    };

    let nodes = app.directory().snapshot();
    let mut fwd = Forwarded::default();
    let mut last_drop = DropReason::NoRoute;

    for &nexthop in entry.next_hops() {
        let res = if nexthop == own_id {
            match origin {
                Origin::Relay { .. } if hdr.src == own_id => {
                    Err(DropReason::Echo)
                }
                _ => {
                    app.deliver(hdr, payload);
                    stats.tx_local_deliveries.incr(1);
                    fwd.delivered += 1;
                    continue;
                }
            }
        } else {
            match nodes.get(&nexthop) {
                None => Err(DropReason::NoLocator),
                Some(peer) => match origin {
                    Origin::Relay { from }
                        if entry.is_multipath() && peer.has_locator(&from) =>
                    {
                        Err(DropReason::Rpf)
                    }
                    _ => match resolve_locators(&own, peer, hdr.hash) {
                        None => Err(DropReason::NoLocator),
                        Some((src, dst)) => {
                            let dgram =
                                Datagram { src, dst, hdr: *hdr, payload };
                            transport.send(&dgram)
                        }
                    },
                },
            }
        };

        match res {
            Ok(()) => {
                stats.tx_datagrams.incr(1);
                fwd.sent += 1;
            }
            Err(reason) => {
                stats.drop(reason);
                fwd.dropped += 1;
                last_drop = reason;
            }
        }
    }

    if fwd.sent == 0 && fwd.delivered == 0 {
        return ProcessResult::Drop { reason: last_drop };
    }

    ProcessResult::Forward(fwd)
}

/// Handle one datagram from the transport.
///
/// A packet for our own node is delivered. Anything else is relayed
/// towards its destination with the TTL decremented; a packet whose
/// TTL runs out here is dropped.
pub fn receive(
    registry: &AppRegistry,
    raw: &[u8],
    from: IpAddr,
    transport: &dyn Transport,
    stats: &OvstackStats,
) -> ProcessResult {
    stats.rx_datagrams.incr(1);

    let (hdr, payload) = match OverlayHdr::parse(raw) {
        Ok(v) => v,
        Err(e) => {
            let reason = DropReason::from(e);
            stats.drop(reason);
            return ProcessResult::Drop { reason };
        }
    };

    let Some(app) = registry.get(hdr.app) else {
        stats.drop(DropReason::UnknownApplication);
        return ProcessResult::Drop { reason: DropReason::UnknownApplication };
    };

    let own_id = app.own_node_id();
    if own_id.is_unset() {
        stats.drop(DropReason::OwnNodeUnset);
        return ProcessResult::Drop { reason: DropReason::OwnNodeUnset };
    }

    if hdr.dst == own_id {
        app.deliver(&hdr, payload);
        stats.rx_delivered.incr(1);
        return ProcessResult::Deliver;
    }

    let ttl = hdr.ttl.saturating_sub(1);
    if ttl == 0 {
        stats.drop(DropReason::TtlExceeded);
        return ProcessResult::Drop { reason: DropReason::TtlExceeded };
    }

    // The header is rewritten in place of being nested: only the TTL
    // changes on a relay.
    let relay_hdr = OverlayHdr { ttl, ..hdr };
    stats.rx_relayed.incr(1);
    forward(&app, &relay_hdr, payload, Origin::Relay { from }, transport, stats)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::AppId;
    use crate::api::NodeId;
    use crate::api::Weight;
    use crate::engine::app::AppRecv;
    use crate::engine::header::OVERLAY_HDR_SZ;
    use crate::ddi::sync::KMutex;
    use alloc::sync::Arc;
    use alloc::vec::Vec;

    #[derive(Default)]
    struct Capture {
        got: KMutex<Vec<(OverlayHdr, Vec<u8>)>>,
    }

    impl AppRecv for Capture {
        fn recv(&self, hdr: &OverlayHdr, payload: &[u8]) {
            self.got.lock().push((*hdr, payload.to_vec()));
        }
    }

    #[derive(Default)]
    struct Wire {
        sent: KMutex<Vec<(IpAddr, IpAddr, Vec<u8>)>>,
        refuse: bool,
        // Fail encoding for datagrams to this address.
        no_mem_for: Option<IpAddr>,
    }

    impl Transport for Wire {
        fn send(&self, dgram: &Datagram<'_>) -> Result<(), DropReason> {
            if self.refuse {
                return Err(DropReason::Transport);
            }
            if self.no_mem_for == Some(dgram.dst) {
                return Err(DropReason::AllocationFailure);
            }
            let bytes = dgram.to_bytes()?;
            self.sent.lock().push((dgram.src, dgram.dst, bytes));
            Ok(())
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn w(val: u8) -> Weight {
        Weight::new(val).unwrap()
    }

    fn n(id: u32) -> NodeId {
        NodeId::new(id)
    }

    const APP: AppId = AppId::new(7);

    // Node 100 at 10.0.0.1 knowing node 200 at 10.0.0.2.
    fn setup() -> (AppRegistry, Arc<Application>, Arc<Capture>) {
        let reg = AppRegistry::new();
        let cap = Arc::new(Capture::default());
        let app = reg.register(APP, cap.clone()).unwrap();
        app.set_own_node_id(n(100)).unwrap();
        app.add_own_locator(ip("10.0.0.1"), w(50)).unwrap();
        app.directory().add_locator(n(200), ip("10.0.0.2"), w(50)).unwrap();
        (reg, app, cap)
    }

    fn local_hdr(dst: NodeId) -> OverlayHdr {
        OverlayHdr::originate(APP, 128, Vni::default(), 0, 0, dst, n(100))
    }

    #[test]
    fn send_to_remote() {
        let (_reg, app, cap) = setup();
        app.routes().add(n(200), n(200)).unwrap();
        let wire = Wire::default();
        let stats = OvstackStats::new();

        let res = forward(
            &app,
            &local_hdr(n(200)),
            b"data",
            Origin::Local,
            &wire,
            &stats,
        );
        assert_eq!(
            res,
            ProcessResult::Forward(Forwarded { sent: 1, delivered: 0, dropped: 0 })
        );

        let sent = wire.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ip("10.0.0.1"));
        assert_eq!(sent[0].1, ip("10.0.0.2"));
        assert_eq!(&sent[0].2[OVERLAY_HDR_SZ..], b"data");
        assert!(cap.got.lock().is_empty());
        assert_eq!(stats.tx_datagrams.val(), 1);
    }

    #[test]
    fn no_route() {
        let (_reg, app, _cap) = setup();
        let wire = Wire::default();
        let stats = OvstackStats::new();

        let res = forward(
            &app,
            &local_hdr(n(300)),
            b"",
            Origin::Local,
            &wire,
            &stats,
        );
        assert_eq!(res, ProcessResult::Drop { reason: DropReason::NoRoute });
        assert_eq!(stats.drop_no_route.val(), 1);
    }

    #[test]
    fn next_hop_without_locators() {
        let (_reg, app, _cap) = setup();
        app.directory().create(n(300)).unwrap();
        app.routes().add(n(300), n(300)).unwrap();
        app.routes().add(n(400), n(400)).unwrap();
        let wire = Wire::default();
        let stats = OvstackStats::new();

        // Known but empty node, then an unknown node.
        for dst in [n(300), n(400)] {
            let res =
                forward(&app, &local_hdr(dst), b"", Origin::Local, &wire, &stats);
            assert_eq!(res, ProcessResult::Drop { reason: DropReason::NoLocator });
        }
        assert_eq!(stats.drop_no_locator.val(), 2);
    }

    #[test]
    fn multipath_with_self() {
        let (_reg, app, cap) = setup();
        app.routes().add(n(50), n(100)).unwrap();
        app.routes().add(n(50), n(200)).unwrap();
        let wire = Wire::default();
        let stats = OvstackStats::new();

        let res = forward(
            &app,
            &local_hdr(n(50)),
            b"mp",
            Origin::Local,
            &wire,
            &stats,
        );
        assert_eq!(
            res,
            ProcessResult::Forward(Forwarded { sent: 1, delivered: 1, dropped: 0 })
        );
        assert_eq!(cap.got.lock().len(), 1);
        assert_eq!(wire.sent.lock().len(), 1);
        assert_eq!(wire.sent.lock()[0].1, ip("10.0.0.2"));
    }

    #[test]
    fn one_failed_leg_does_not_sink_the_rest() {
        let (_reg, app, _cap) = setup();
        app.routes().add(n(50), n(200)).unwrap();
        app.routes().add(n(50), n(300)).unwrap();
        let wire = Wire::default();
        let stats = OvstackStats::new();

        let res = forward(
            &app,
            &local_hdr(n(50)),
            b"",
            Origin::Local,
            &wire,
            &stats,
        );
        assert_eq!(
            res,
            ProcessResult::Forward(Forwarded { sent: 1, delivered: 0, dropped: 1 })
        );
    }

    #[test]
    fn allocation_failure_skips_one_leg() {
        let (_reg, app, _cap) = setup();
        app.directory().add_locator(n(300), ip("10.0.0.3"), w(50)).unwrap();
        app.routes().add(n(50), n(200)).unwrap();
        app.routes().add(n(50), n(300)).unwrap();
        let wire =
            Wire { no_mem_for: Some(ip("10.0.0.3")), ..Default::default() };
        let stats = OvstackStats::new();

        let res = forward(
            &app,
            &local_hdr(n(50)),
            b"both",
            Origin::Local,
            &wire,
            &stats,
        );
        assert_eq!(
            res,
            ProcessResult::Forward(Forwarded { sent: 1, delivered: 0, dropped: 1 })
        );

        let sent = wire.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, ip("10.0.0.2"));
        assert_eq!(stats.drop_alloc_failure.val(), 1);
        assert_eq!(stats.tx_datagrams.val(), 1);
    }

    #[test]
    fn transport_refusal_is_counted() {
        let (_reg, app, _cap) = setup();
        app.routes().add(n(200), n(200)).unwrap();
        let wire = Wire { refuse: true, ..Default::default() };
        let stats = OvstackStats::new();

        let res = forward(
            &app,
            &local_hdr(n(200)),
            b"",
            Origin::Local,
            &wire,
            &stats,
        );
        assert_eq!(res, ProcessResult::Drop { reason: DropReason::Transport });
        assert_eq!(stats.drop_transport.val(), 1);
    }

    #[test]
    fn relayed_echo_is_dropped() {
        let (_reg, app, cap) = setup();
        app.routes().add(n(50), n(100)).unwrap();
        let wire = Wire::default();
        let stats = OvstackStats::new();

        // Our own packet, coming back through a relay.
        let hdr = local_hdr(n(50));
        let res = forward(
            &app,
            &hdr,
            b"",
            Origin::Relay { from: ip("10.0.0.2") },
            &wire,
            &stats,
        );
        assert_eq!(res, ProcessResult::Drop { reason: DropReason::Echo });
        assert!(cap.got.lock().is_empty());
        assert_eq!(stats.drop_echo.val(), 1);
    }

    #[test]
    fn relayed_group_member_delivers_locally() {
        let (_reg, app, cap) = setup();
        app.routes().add(n(50), n(100)).unwrap();
        let wire = Wire::default();
        let stats = OvstackStats::new();

        let mut hdr = local_hdr(n(50));
        hdr.src = n(200);
        let res = forward(
            &app,
            &hdr,
            b"grp",
            Origin::Relay { from: ip("10.0.0.2") },
            &wire,
            &stats,
        );
        assert_eq!(
            res,
            ProcessResult::Forward(Forwarded { sent: 0, delivered: 1, dropped: 0 })
        );
        assert_eq!(cap.got.lock()[0].1, b"grp");
    }

    #[test]
    fn rpf_suppresses_leg_back_to_sender() {
        let (_reg, app, _cap) = setup();
        app.directory().add_locator(n(300), ip("10.0.0.3"), w(1)).unwrap();
        app.routes().add(n(50), n(200)).unwrap();
        app.routes().add(n(50), n(300)).unwrap();
        let wire = Wire::default();
        let stats = OvstackStats::new();

        let mut hdr = local_hdr(n(50));
        hdr.src = n(200);
        let res = forward(
            &app,
            &hdr,
            b"",
            Origin::Relay { from: ip("10.0.0.2") },
            &wire,
            &stats,
        );
        assert_eq!(
            res,
            ProcessResult::Forward(Forwarded { sent: 1, delivered: 0, dropped: 1 })
        );
        assert_eq!(wire.sent.lock()[0].1, ip("10.0.0.3"));
        assert_eq!(stats.drop_rpf.val(), 1);
    }

    #[test]
    fn rpf_does_not_apply_to_single_next_hop() {
        let (_reg, app, _cap) = setup();
        app.routes().add(n(50), n(200)).unwrap();
        let wire = Wire::default();
        let stats = OvstackStats::new();

        let mut hdr = local_hdr(n(50));
        hdr.src = n(300);
        let res = forward(
            &app,
            &hdr,
            b"",
            Origin::Relay { from: ip("10.0.0.2") },
            &wire,
            &stats,
        );
        assert!(matches!(res, ProcessResult::Forward(_)));
    }

    #[test]
    fn receive_paths() {
        let (reg, app, cap) = setup();
        app.routes().add(n(50), n(200)).unwrap();
        let wire = Wire::default();
        let stats = OvstackStats::new();
        let from = ip("10.0.0.9");

        // For us.
        let mut raw = vec![];
        let mut hdr = local_hdr(n(100));
        hdr.src = n(200);
        hdr.emit(&mut raw);
        raw.extend_from_slice(b"mine");
        assert_eq!(
            receive(&reg, &raw, from, &wire, &stats),
            ProcessResult::Deliver
        );
        assert_eq!(cap.got.lock()[0].1, b"mine");

        // Relayed with the TTL decremented.
        let mut raw = vec![];
        let mut hdr = local_hdr(n(50));
        hdr.src = n(200);
        hdr.ttl = 5;
        hdr.emit(&mut raw);
        assert!(matches!(
            receive(&reg, &raw, from, &wire, &stats),
            ProcessResult::Forward(_)
        ));
        let sent = wire.sent.lock();
        let (relayed, _) = OverlayHdr::parse(&sent[0].2).unwrap();
        assert_eq!(relayed.ttl, 4);
        assert_eq!(relayed.dst, n(50));
        assert_eq!(relayed.src, n(200));
        drop(sent);

        // Last hop of the TTL.
        let mut raw = vec![];
        hdr.ttl = 1;
        hdr.emit(&mut raw);
        assert_eq!(
            receive(&reg, &raw, from, &wire, &stats),
            ProcessResult::Drop { reason: DropReason::TtlExceeded }
        );

        // Unknown application.
        let mut raw = vec![];
        let mut other = local_hdr(n(100));
        other.app = AppId::new(99);
        other.emit(&mut raw);
        assert_eq!(
            receive(&reg, &raw, from, &wire, &stats),
            ProcessResult::Drop { reason: DropReason::UnknownApplication }
        );

        // Garbage.
        assert_eq!(
            receive(&reg, &[1, 2, 3], from, &wire, &stats),
            ProcessResult::Drop { reason: DropReason::Truncated }
        );

        let snap = stats.snapshot();
        assert_eq!(snap.rx_datagrams, 5);
        assert_eq!(snap.rx_delivered, 1);
        assert_eq!(snap.rx_relayed, 1);
        assert_eq!(snap.drops(), 3);
    }

    #[test]
    fn dual_stack_resolution() {
        let mut own = Node::new(n(1));
        own.add_locator(ip("10.0.0.1"), w(1)).unwrap();
        own.add_locator(ip("fd00::1"), w(1)).unwrap();

        // The peer only has IPv6: whatever family the source picks,
        // the pair ends up IPv6.
        let mut peer = Node::new(n(2));
        peer.add_locator(ip("fd00::2"), w(1)).unwrap();
        for hash in 0..4 {
            assert_eq!(
                resolve_locators(&own, &peer, hash),
                Some((ip("fd00::1"), ip("fd00::2")))
            );
        }

        // A single-stacked own node can't reach across families.
        let mut v4_only = Node::new(n(3));
        v4_only.add_locator(ip("10.0.0.3"), w(1)).unwrap();
        assert_eq!(resolve_locators(&v4_only, &peer, 0), None);
        assert_eq!(resolve_locators(&Node::new(n(4)), &peer, 0), None);

        // Both dual-stacked: the source's pick decides the family.
        peer.add_locator(ip("10.0.0.2"), w(1)).unwrap();
        assert_eq!(
            resolve_locators(&own, &peer, 0),
            Some((ip("10.0.0.1"), ip("10.0.0.2")))
        );
        assert_eq!(
            resolve_locators(&own, &peer, 1),
            Some((ip("fd00::1"), ip("fd00::2")))
        );
    }
}
