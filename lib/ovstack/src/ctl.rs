// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! A typed client for the control-plane command channel.

use crate::api::AddLocatorReq;
use crate::api::AddNodeReq;
use crate::api::AppId;
use crate::api::AppReq;
use crate::api::CmdOk;
use crate::api::DelLocatorReq;
use crate::api::DelNodeReq;
use crate::api::ErrorKind;
use crate::api::GetLocatorReq;
use crate::api::GetNodeReq;
use crate::api::IpAddr;
use crate::api::ListAppsResp;
use crate::api::ListLocatorsResp;
use crate::api::ListNodesResp;
use crate::api::ListRoutesResp;
use crate::api::LocatorDesc;
use crate::api::NoResp;
use crate::api::NodeDesc;
use crate::api::NodeId;
use crate::api::NodeIdResp;
use crate::api::OvstackCmd;
use crate::api::OvstackCmdIoctl;
pub use crate::api::OvstackError;
use crate::api::OvstackStatsSnap;
use crate::api::RouteReq;
use crate::api::SetLocatorWeightReq;
use crate::api::SetNodeWeightReq;
use crate::api::SetOwnNodeIdReq;
use crate::engine::Namespace;
use alloc::sync::Arc;
use alloc::vec::Vec;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors related to administering a namespace.
#[derive(Debug, Error)]
pub enum Error {
    #[error("request serialization failed for command {0:?}: {1}")]
    ReqSer(OvstackCmd, postcard::Error),

    #[error("response deserialization failed for command {0:?}: {1}")]
    RespDeser(OvstackCmd, postcard::Error),

    /// The command failed before a response could be written.
    #[error("command {0:?} failed without a response: {1:?}")]
    NoResponse(OvstackCmd, ErrorKind),

    #[error("command {0:?} failed: {1}")]
    CommandError(OvstackCmd, OvstackError),
}

impl Error {
    /// The error class, when the engine reported one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::CommandError(_, e) => Some(e.kind()),
            Self::NoResponse(_, kind) => Some(*kind),
            Self::ReqSer(..) | Self::RespDeser(..) => None,
        }
    }
}

/// The handle used to send administration commands to a namespace.
pub struct OvstackHdl {
    ns: Arc<Namespace>,
}

impl OvstackHdl {
    pub fn new(ns: Arc<Namespace>) -> Self {
        Self { ns }
    }

    pub fn set_own_node_id(
        &self,
        app: AppId,
        node_id: NodeId,
    ) -> Result<NoResp, Error> {
        let req = SetOwnNodeIdReq { app, node_id };
        self.run_cmd(OvstackCmd::SetOwnNodeId, Some(&req))
    }

    pub fn get_own_node_id(&self, app: AppId) -> Result<NodeId, Error> {
        let resp: NodeIdResp =
            self.run_cmd(OvstackCmd::GetOwnNodeId, Some(&AppReq { app }))?;
        Ok(resp.node_id)
    }

    /// Add a locator to the own node.
    pub fn add_locator(
        &self,
        app: AppId,
        addr: IpAddr,
        weight: Option<u8>,
    ) -> Result<NoResp, Error> {
        let req = AddLocatorReq { app, addr, weight };
        self.run_cmd(OvstackCmd::AddLocator, Some(&req))
    }

    pub fn delete_locator(
        &self,
        app: AppId,
        addr: IpAddr,
    ) -> Result<NoResp, Error> {
        let req = DelLocatorReq { app, addr };
        self.run_cmd(OvstackCmd::DelLocator, Some(&req))
    }

    pub fn set_locator_weight(
        &self,
        app: AppId,
        addr: IpAddr,
        weight: u8,
    ) -> Result<NoResp, Error> {
        let req = SetLocatorWeightReq { app, addr, weight };
        self.run_cmd(OvstackCmd::SetLocatorWeight, Some(&req))
    }

    pub fn get_locator(
        &self,
        app: AppId,
        addr: IpAddr,
    ) -> Result<LocatorDesc, Error> {
        let req = GetLocatorReq { app, addr };
        self.run_cmd(OvstackCmd::GetLocator, Some(&req))
    }

    pub fn list_locators(&self, app: AppId) -> Result<ListLocatorsResp, Error> {
        self.run_cmd(OvstackCmd::ListLocators, Some(&AppReq { app }))
    }

    /// Add a locator to a remote node, creating the node if needed.
    pub fn add_node(
        &self,
        app: AppId,
        node_id: NodeId,
        addr: IpAddr,
        weight: Option<u8>,
    ) -> Result<NoResp, Error> {
        let req = AddNodeReq { app, node_id, addr, weight };
        self.run_cmd(OvstackCmd::AddNode, Some(&req))
    }

    /// Delete one locator of a remote node, or the whole node when
    /// `addr` is `None`.
    pub fn delete_node(
        &self,
        app: AppId,
        node_id: NodeId,
        addr: Option<IpAddr>,
    ) -> Result<NoResp, Error> {
        let req = DelNodeReq { app, node_id, addr };
        self.run_cmd(OvstackCmd::DelNode, Some(&req))
    }

    pub fn set_node_weight(
        &self,
        app: AppId,
        node_id: NodeId,
        addr: IpAddr,
        weight: u8,
    ) -> Result<NoResp, Error> {
        let req = SetNodeWeightReq { app, node_id, addr, weight };
        self.run_cmd(OvstackCmd::SetNodeWeight, Some(&req))
    }

    pub fn get_node(
        &self,
        app: AppId,
        node_id: NodeId,
    ) -> Result<NodeDesc, Error> {
        let req = GetNodeReq { app, node_id };
        self.run_cmd(OvstackCmd::GetNode, Some(&req))
    }

    pub fn list_nodes(&self, app: AppId) -> Result<ListNodesResp, Error> {
        self.run_cmd(OvstackCmd::ListNodes, Some(&AppReq { app }))
    }

    pub fn add_route(
        &self,
        app: AppId,
        dst: NodeId,
        nexthop: NodeId,
    ) -> Result<NoResp, Error> {
        let req = RouteReq { app, dst, nexthop };
        self.run_cmd(OvstackCmd::AddRoute, Some(&req))
    }

    pub fn delete_route(
        &self,
        app: AppId,
        dst: NodeId,
        nexthop: NodeId,
    ) -> Result<NoResp, Error> {
        let req = RouteReq { app, dst, nexthop };
        self.run_cmd(OvstackCmd::DelRoute, Some(&req))
    }

    pub fn list_routes(&self, app: AppId) -> Result<ListRoutesResp, Error> {
        self.run_cmd(OvstackCmd::ListRoutes, Some(&AppReq { app }))
    }

    pub fn list_apps(&self) -> Result<ListAppsResp, Error> {
        self.run_cmd(OvstackCmd::ListApps, None::<&()>)
    }

    pub fn dump_stats(&self) -> Result<OvstackStatsSnap, Error> {
        self.run_cmd(OvstackCmd::DumpStats, None::<&()>)
    }

    /// Serialize `req`, run `cmd` against the namespace, and decode
    /// its response.
    pub fn run_cmd<T, R>(&self, cmd: OvstackCmd, req: Option<&R>) -> Result<T, Error>
    where
        T: CmdOk + DeserializeOwned,
        R: Serialize,
    {
        let req = match req {
            Some(req) => {
                postcard::to_allocvec(req).map_err(|e| Error::ReqSer(cmd, e))?
            }
            None => Vec::new(),
        };

        let mut ioctl = OvstackCmdIoctl::new(cmd, req);
        let ret = self.ns.ioctl(&mut ioctl);

        // Anytime a response is present it carries the full error;
        // otherwise all we have is its class.
        if !ioctl.has_cmd_resp() {
            return match ret {
                Err(kind) => Err(Error::NoResponse(cmd, kind)),
                Ok(()) => Err(Error::NoResponse(cmd, ErrorKind::Protocol)),
            };
        }

        let resp: Result<T, OvstackError> = postcard::from_bytes(&ioctl.resp)
            .map_err(|e| Error::RespDeser(cmd, e))?;
        resp.map_err(|e| Error::CommandError(cmd, e))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::APP_IPV6;
    use crate::engine::app::AppRecv;
    use crate::engine::forward::DropReason;
    use crate::engine::header::OverlayHdr;
    use crate::engine::transport::Datagram;
    use crate::engine::transport::Transport;
    use crate::provider::PrintlnLog;
    use crate::provider::Providers;
    use alloc::boxed::Box;

    struct Null;

    impl Transport for Null {
        fn send(&self, _dgram: &Datagram<'_>) -> Result<(), DropReason> {
            Ok(())
        }
    }

    struct Nop;

    impl AppRecv for Nop {
        fn recv(&self, _hdr: &OverlayHdr, _payload: &[u8]) {}
    }

    fn hdl() -> (Arc<Namespace>, OvstackHdl) {
        let ns = Arc::new(
            Namespace::new(
                "ctl",
                Default::default(),
                Arc::new(Null),
                Providers { log: Box::new(PrintlnLog) },
            )
            .unwrap(),
        );
        (ns.clone(), OvstackHdl::new(ns))
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn locators_through_the_channel() {
        let (ns, hdl) = hdl();
        ns.register(APP_IPV6, Arc::new(Nop)).unwrap();

        hdl.set_own_node_id(APP_IPV6, NodeId::new(1)).unwrap();
        hdl.add_locator(APP_IPV6, ip("fd00::1"), None).unwrap();
        hdl.add_locator(APP_IPV6, ip("10.0.0.1"), Some(3)).unwrap();
        hdl.set_locator_weight(APP_IPV6, ip("fd00::1"), 4).unwrap();

        let resp = hdl.list_locators(APP_IPV6).unwrap();
        assert_eq!(resp.node_id, NodeId::new(1));
        assert_eq!(
            resp.locators,
            vec![
                LocatorDesc { addr: ip("10.0.0.1"), weight: 3 },
                LocatorDesc { addr: ip("fd00::1"), weight: 4 },
            ]
        );

        hdl.delete_locator(APP_IPV6, ip("10.0.0.1")).unwrap();
        let err = hdl.get_locator(APP_IPV6, ip("10.0.0.1")).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
        assert!(matches!(
            err,
            Error::CommandError(
                OvstackCmd::GetLocator,
                OvstackError::LocatorNotFound { .. }
            )
        ));
    }

    #[test]
    fn nodes_and_routes_through_the_channel() {
        let (ns, hdl) = hdl();
        ns.register(APP_IPV6, Arc::new(Nop)).unwrap();

        hdl.add_node(APP_IPV6, NodeId::new(2), ip("fd00::2"), None).unwrap();
        hdl.set_node_weight(APP_IPV6, NodeId::new(2), ip("fd00::2"), 8)
            .unwrap();
        assert_eq!(
            hdl.get_node(APP_IPV6, NodeId::new(2)).unwrap().weight_sum_v6,
            8
        );
        assert_eq!(hdl.list_nodes(APP_IPV6).unwrap().nodes.len(), 1);

        hdl.add_route(APP_IPV6, NodeId::new(2), NodeId::new(2)).unwrap();
        let err = hdl
            .add_route(APP_IPV6, NodeId::new(2), NodeId::new(2))
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::AlreadyExists));
        assert_eq!(hdl.list_routes(APP_IPV6).unwrap().routes.len(), 1);

        hdl.delete_route(APP_IPV6, NodeId::new(2), NodeId::new(2)).unwrap();
        assert!(hdl.list_routes(APP_IPV6).unwrap().routes.is_empty());

        hdl.delete_node(APP_IPV6, NodeId::new(2), None).unwrap();
        assert!(hdl.list_nodes(APP_IPV6).unwrap().nodes.is_empty());

        let apps = hdl.list_apps().unwrap().apps;
        assert_eq!(apps.len(), 1);
        assert_eq!(hdl.dump_stats().unwrap().drops(), 0);
        assert_eq!(hdl.get_own_node_id(APP_IPV6).unwrap(), NodeId::UNSET);
    }
}
