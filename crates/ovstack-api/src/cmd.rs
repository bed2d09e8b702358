// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use super::API_VERSION;
use super::AppId;
use super::NodeId;
use super::ip::IpAddr;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Debug;
use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[repr(C)]
pub enum OvstackCmd {
    SetOwnNodeId = 1,      // set the own node id of an application
    GetOwnNodeId = 2,      // get the own node id of an application
    AddLocator = 10,       // add a locator to the own node
    DelLocator = 11,       // remove a locator from the own node
    SetLocatorWeight = 12, // change the weight of an own locator
    GetLocator = 13,       // look up one own locator
    ListLocators = 14,     // list the own node's locators
    AddNode = 20,          // add a remote node locator
    DelNode = 21,          // remove a remote node or one of its locators
    SetNodeWeight = 22,    // change the weight of a remote locator
    GetNode = 23,          // look up one remote node
    ListNodes = 24,        // list the directory
    AddRoute = 30,         // add a next hop for a destination
    DelRoute = 31,         // remove a next hop for a destination
    ListRoutes = 32,       // list the routing table
    ListApps = 40,         // list registered applications
    DumpStats = 41,        // dump namespace forwarding counters
}

impl OvstackCmd {
    /// Does this command carry a request body?
    pub const fn has_req(&self) -> bool {
        !matches!(self, Self::ListApps | Self::DumpStats)
    }
}

/// Indicates that a command response has been written to the response
/// buffer (`resp`).
pub const OVSTACK_CMD_RESP_COPY_OUT: u64 = 0x1;

/// The envelope carrying one control-plane command.
///
/// The command's actual request/response data is serialized by
/// postcard into `req`/`resp`.
#[derive(Debug)]
pub struct OvstackCmdIoctl {
    pub api_version: u64,
    pub cmd: OvstackCmd,
    pub flags: u64,
    pub req: Vec<u8>,
    pub resp: Vec<u8>,
}

impl OvstackCmdIoctl {
    pub fn new(cmd: OvstackCmd, req: Vec<u8>) -> Self {
        Self {
            api_version: API_VERSION,
            cmd,
            flags: 0,
            req,
            resp: Vec::new(),
        }
    }

    /// Is this the expected API version?
    pub fn check_version(&self) -> bool {
        self.api_version == API_VERSION
    }

    pub fn has_cmd_resp(&self) -> bool {
        (self.flags & OVSTACK_CMD_RESP_COPY_OUT) != 0
    }
}

/// The broad class of an error.
///
/// Every control-plane error and every hot-path drop maps onto one of
/// these.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    NoRoute,
    NoLocator,
    TtlExceeded,
    UnknownApplication,
    AllocationFailure,
    /// The control channel itself failed: version mismatch, a bad
    /// request body, or an unserializable response.
    Protocol,
}

#[derive(
    Clone, Debug, Deserialize, Eq, PartialEq, Serialize, thiserror::Error,
)]
pub enum OvstackError {
    #[error("API version mismatch: client {user}, engine {engine}")]
    BadApiVersion { user: u64, engine: u64 },

    #[error("application {0} is already registered")]
    AppExists(AppId),

    #[error("application {0} is not registered")]
    AppNotFound(AppId),

    #[error("node {0} already exists")]
    NodeExists(NodeId),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("locator {addr} already present on node {node}")]
    LocatorExists { node: NodeId, addr: IpAddr },

    #[error("locator {addr} not found on node {node}")]
    LocatorNotFound { node: NodeId, addr: IpAddr },

    #[error("next hop {nexthop} already present for destination {dst}")]
    RouteExists { dst: NodeId, nexthop: NodeId },

    #[error("no next hop {nexthop} for destination {dst}")]
    RouteNotFound { dst: NodeId, nexthop: NodeId },

    #[error("no route to node {0}")]
    NoRoute(NodeId),

    #[error("no usable locator for node {0}")]
    NoLocator(NodeId),

    #[error("own node id of application {0} is unset")]
    OwnNodeUnset(AppId),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    /// The command expects a request body but `req` is empty.
    #[error("command {0:?} requires a request body")]
    NoRequestBody(OvstackCmd),

    #[error("failed to deserialize request: {0}")]
    DeserCmdReq(String),

    #[error("failed to serialize response: {0}")]
    SerCmdResp(String),
}

impl OvstackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadApiVersion { .. } => ErrorKind::Protocol,
            Self::AppExists(_) => ErrorKind::AlreadyExists,
            Self::AppNotFound(_) => ErrorKind::NotFound,
            Self::NodeExists(_) => ErrorKind::AlreadyExists,
            Self::NodeNotFound(_) => ErrorKind::NotFound,
            Self::LocatorExists { .. } => ErrorKind::AlreadyExists,
            Self::LocatorNotFound { .. } => ErrorKind::NotFound,
            Self::RouteExists { .. } => ErrorKind::AlreadyExists,
            Self::RouteNotFound { .. } => ErrorKind::NotFound,
            Self::NoRoute(_) => ErrorKind::NoRoute,
            Self::NoLocator(_) => ErrorKind::NoLocator,
            Self::OwnNodeUnset(_) => ErrorKind::InvalidArgument,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::AllocationFailure(_) => ErrorKind::AllocationFailure,
            Self::NoRequestBody(_) => ErrorKind::Protocol,
            Self::DeserCmdReq(_) => ErrorKind::Protocol,
            Self::SerCmdResp(_) => ErrorKind::Protocol,
        }
    }
}

/// A marker trait indicating a success response type that is returned
/// from a command and may be passed across the control channel.
pub trait CmdOk: Debug + Serialize {}

impl CmdOk for () {}

/// Indicates no meaningful response value on success.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NoResp {
    pub unused: u64,
}

impl CmdOk for NoResp {}

/// Identify the application a query is about.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AppReq {
    pub app: AppId,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SetOwnNodeIdReq {
    pub app: AppId,
    pub node_id: NodeId,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NodeIdResp {
    pub node_id: NodeId,
}

impl CmdOk for NodeIdResp {}

/// Add a locator to the application's own node.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AddLocatorReq {
    pub app: AppId,
    pub addr: IpAddr,
    /// When absent the namespace's default weight is used.
    pub weight: Option<u8>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DelLocatorReq {
    pub app: AppId,
    pub addr: IpAddr,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SetLocatorWeightReq {
    pub app: AppId,
    pub addr: IpAddr,
    pub weight: u8,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GetLocatorReq {
    pub app: AppId,
    pub addr: IpAddr,
}

/// A locator and its selection weight.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LocatorDesc {
    pub addr: IpAddr,
    pub weight: u8,
}

impl CmdOk for LocatorDesc {}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ListLocatorsResp {
    pub node_id: NodeId,
    pub locators: Vec<LocatorDesc>,
}

impl CmdOk for ListLocatorsResp {}

/// Add a locator for a remote node, creating the node if needed.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AddNodeReq {
    pub app: AppId,
    pub node_id: NodeId,
    pub addr: IpAddr,
    /// When absent the namespace's default weight is used.
    pub weight: Option<u8>,
}

/// Remove one locator of a remote node, or the whole node when `addr`
/// is absent.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DelNodeReq {
    pub app: AppId,
    pub node_id: NodeId,
    pub addr: Option<IpAddr>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SetNodeWeightReq {
    pub app: AppId,
    pub node_id: NodeId,
    pub addr: IpAddr,
    pub weight: u8,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GetNodeReq {
    pub app: AppId,
    pub node_id: NodeId,
}

/// A node as held by the directory.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NodeDesc {
    pub node_id: NodeId,
    /// IPv4 locators first, then IPv6, each in selection order.
    pub locators: Vec<LocatorDesc>,
    pub weight_sum_v4: u32,
    pub weight_sum_v6: u32,
    /// Milliseconds since the node's locator set last changed.
    pub idle_ms: u64,
}

impl CmdOk for NodeDesc {}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ListNodesResp {
    pub nodes: Vec<NodeDesc>,
}

impl CmdOk for ListNodesResp {}

/// Add or remove one next hop for a destination.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RouteReq {
    pub app: AppId,
    pub dst: NodeId,
    pub nexthop: NodeId,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RouteDesc {
    pub dst: NodeId,
    pub next_hops: Vec<NodeId>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ListRoutesResp {
    pub routes: Vec<RouteDesc>,
}

impl CmdOk for ListRoutesResp {}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AppDesc {
    pub app: AppId,
    pub own_node_id: NodeId,
    /// Number of nodes in the directory.
    pub nodes: u32,
    /// Number of routing entries.
    pub routes: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ListAppsResp {
    pub apps: Vec<AppDesc>,
}

impl CmdOk for ListAppsResp {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_kinds() {
        let node = NodeId::new(9);
        assert_eq!(
            OvstackError::NodeNotFound(node).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            OvstackError::RouteExists { dst: node, nexthop: node }.kind(),
            ErrorKind::AlreadyExists
        );
        assert_eq!(
            OvstackError::BadApiVersion { user: 1, engine: 2 }.kind(),
            ErrorKind::Protocol
        );
    }

    #[test]
    fn error_crosses_channel() {
        let err = OvstackError::LocatorNotFound {
            node: NodeId::new(100),
            addr: "10.0.0.1".parse().unwrap(),
        };
        let bytes = postcard::to_allocvec(&err).unwrap();
        let back: OvstackError = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(back, err);
        assert_eq!(
            std::format!("{back}"),
            "locator 10.0.0.1 not found on node 100"
        );
    }

    #[test]
    fn ioctl_version() {
        let mut ioctl = OvstackCmdIoctl::new(OvstackCmd::ListApps, vec![]);
        assert!(ioctl.check_version());
        assert!(!ioctl.cmd.has_req());
        ioctl.api_version = API_VERSION + 1;
        assert!(!ioctl.check_version());
    }
}
