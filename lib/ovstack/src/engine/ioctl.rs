// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The control-plane command channel.
//!
//! A command arrives as an [`OvstackCmdIoctl`] carrying a
//! postcard-encoded request. The handler's `Result` is encoded into
//! `resp`, and `OVSTACK_CMD_RESP_COPY_OUT` is set to tell the caller
//! there is something to decode.

use super::namespace::Namespace;
use crate::api::API_VERSION;
use crate::api::AddLocatorReq;
use crate::api::AddNodeReq;
use crate::api::AppReq;
use crate::api::CmdOk;
use crate::api::DelLocatorReq;
use crate::api::DelNodeReq;
use crate::api::ErrorKind;
use crate::api::GetLocatorReq;
use crate::api::GetNodeReq;
use crate::api::ListAppsResp;
use crate::api::ListLocatorsResp;
use crate::api::ListNodesResp;
use crate::api::ListRoutesResp;
use crate::api::LocatorDesc;
use crate::api::NoResp;
use crate::api::NodeDesc;
use crate::api::NodeIdResp;
use crate::api::OVSTACK_CMD_RESP_COPY_OUT;
use crate::api::OvstackCmd;
use crate::api::OvstackCmdIoctl;
use crate::api::OvstackError;
use crate::api::OvstackStatsSnap;
use crate::api::RouteReq;
use crate::api::SetLocatorWeightReq;
use crate::api::SetNodeWeightReq;
use crate::api::SetOwnNodeIdReq;
use serde::de::DeserializeOwned;

/// An envelope around one [`OvstackCmdIoctl`], holding everything
/// needed to decode the request and encode the response.
#[derive(Debug)]
pub struct IoctlEnvelope<'a> {
    ioctl: &'a mut OvstackCmdIoctl,
}

impl<'a> IoctlEnvelope<'a> {
    /// Check the API version. On a mismatch the version error is
    /// written out and the envelope is not created.
    pub fn wrap(ioctl: &'a mut OvstackCmdIoctl) -> Result<Self, ErrorKind> {
        if !ioctl.check_version() {
            let badver = OvstackError::BadApiVersion {
                user: ioctl.api_version,
                engine: API_VERSION,
            };

            let _ = Self::copy_out_resp_i::<()>(ioctl, &Err(badver));
            return Err(ErrorKind::Protocol);
        }

        Ok(Self { ioctl })
    }

    pub fn ioctl_cmd(&self) -> OvstackCmd {
        self.ioctl.cmd
    }

    /// Decode the request body.
    pub fn copy_in_req<T: DeserializeOwned>(
        &mut self,
    ) -> Result<T, OvstackError> {
        if self.ioctl.req.is_empty() {
            return Err(OvstackError::NoRequestBody(self.ioctl.cmd));
        }

        postcard::from_bytes(&self.ioctl.req)
            .map_err(|e| OvstackError::DeserCmdReq(format!("{e}")))
    }

    fn copy_out_resp_i<T: CmdOk>(
        ioctl: &mut OvstackCmdIoctl,
        resp: &Result<T, OvstackError>,
    ) -> Result<(), ErrorKind> {
        let bytes = postcard::to_allocvec(resp).map_err(|_| ErrorKind::Protocol)?;
        ioctl.resp = bytes;
        ioctl.flags |= OVSTACK_CMD_RESP_COPY_OUT;

        match resp {
            Ok(_) => Ok(()),
            Err(e) => Err(e.kind()),
        }
    }

    /// Encode the handler's result into the response buffer. The
    /// return value mirrors the result's error class so a caller can
    /// tell failure without decoding.
    pub fn copy_out_resp<T: CmdOk>(
        &mut self,
        resp: &Result<T, OvstackError>,
    ) -> Result<(), ErrorKind> {
        Self::copy_out_resp_i(self.ioctl, resp)
    }
}

impl Namespace {
    /// The entry point for all control-plane commands. It verifies
    /// the API version and then multiplexes the command to its
    /// handler.
    pub fn ioctl(&self, ioctl: &mut OvstackCmdIoctl) -> Result<(), ErrorKind> {
        let mut env = IoctlEnvelope::wrap(ioctl)?;

        match env.ioctl_cmd() {
            OvstackCmd::SetOwnNodeId => {
                let resp = set_own_node_id_hdlr(self, &mut env);
                env.copy_out_resp(&resp)
            }

            OvstackCmd::GetOwnNodeId => {
                let resp = get_own_node_id_hdlr(self, &mut env);
                env.copy_out_resp(&resp)
            }

            OvstackCmd::AddLocator => {
                let resp = add_locator_hdlr(self, &mut env);
                env.copy_out_resp(&resp)
            }

            OvstackCmd::DelLocator => {
                let resp = del_locator_hdlr(self, &mut env);
                env.copy_out_resp(&resp)
            }

            OvstackCmd::SetLocatorWeight => {
                let resp = set_locator_weight_hdlr(self, &mut env);
                env.copy_out_resp(&resp)
            }

            OvstackCmd::GetLocator => {
                let resp = get_locator_hdlr(self, &mut env);
                env.copy_out_resp(&resp)
            }

            OvstackCmd::ListLocators => {
                let resp = list_locators_hdlr(self, &mut env);
                env.copy_out_resp(&resp)
            }

            OvstackCmd::AddNode => {
                let resp = add_node_hdlr(self, &mut env);
                env.copy_out_resp(&resp)
            }

            OvstackCmd::DelNode => {
                let resp = del_node_hdlr(self, &mut env);
                env.copy_out_resp(&resp)
            }

            OvstackCmd::SetNodeWeight => {
                let resp = set_node_weight_hdlr(self, &mut env);
                env.copy_out_resp(&resp)
            }

            OvstackCmd::GetNode => {
                let resp = get_node_hdlr(self, &mut env);
                env.copy_out_resp(&resp)
            }

            OvstackCmd::ListNodes => {
                let resp = list_nodes_hdlr(self, &mut env);
                env.copy_out_resp(&resp)
            }

            OvstackCmd::AddRoute => {
                let resp = add_route_hdlr(self, &mut env);
                env.copy_out_resp(&resp)
            }

            OvstackCmd::DelRoute => {
                let resp = del_route_hdlr(self, &mut env);
                env.copy_out_resp(&resp)
            }

            OvstackCmd::ListRoutes => {
                let resp = list_routes_hdlr(self, &mut env);
                env.copy_out_resp(&resp)
            }

            OvstackCmd::ListApps => {
                let resp: Result<ListAppsResp, OvstackError> =
                    Ok(self.list_apps());
                env.copy_out_resp(&resp)
            }

            OvstackCmd::DumpStats => {
                let resp: Result<OvstackStatsSnap, OvstackError> =
                    Ok(self.dump_stats());
                env.copy_out_resp(&resp)
            }
        }
    }
}

fn set_own_node_id_hdlr(
    ns: &Namespace,
    env: &mut IoctlEnvelope,
) -> Result<NoResp, OvstackError> {
    let req: SetOwnNodeIdReq = env.copy_in_req()?;
    ns.set_own_node_id(req.app, req.node_id)?;
    Ok(NoResp::default())
}

fn get_own_node_id_hdlr(
    ns: &Namespace,
    env: &mut IoctlEnvelope,
) -> Result<NodeIdResp, OvstackError> {
    let req: AppReq = env.copy_in_req()?;
    Ok(NodeIdResp { node_id: ns.get_own_node_id(req.app)? })
}

fn add_locator_hdlr(
    ns: &Namespace,
    env: &mut IoctlEnvelope,
) -> Result<NoResp, OvstackError> {
    let req: AddLocatorReq = env.copy_in_req()?;
    ns.add_locator(req.app, req.addr, req.weight)?;
    Ok(NoResp::default())
}

fn del_locator_hdlr(
    ns: &Namespace,
    env: &mut IoctlEnvelope,
) -> Result<NoResp, OvstackError> {
    let req: DelLocatorReq = env.copy_in_req()?;
    ns.delete_locator(req.app, req.addr)?;
    Ok(NoResp::default())
}

fn set_locator_weight_hdlr(
    ns: &Namespace,
    env: &mut IoctlEnvelope,
) -> Result<NoResp, OvstackError> {
    let req: SetLocatorWeightReq = env.copy_in_req()?;
    ns.set_locator_weight(req.app, req.addr, req.weight)?;
    Ok(NoResp::default())
}

fn get_locator_hdlr(
    ns: &Namespace,
    env: &mut IoctlEnvelope,
) -> Result<LocatorDesc, OvstackError> {
    let req: GetLocatorReq = env.copy_in_req()?;
    ns.get_locator(req.app, req.addr)
}

fn list_locators_hdlr(
    ns: &Namespace,
    env: &mut IoctlEnvelope,
) -> Result<ListLocatorsResp, OvstackError> {
    let req: AppReq = env.copy_in_req()?;
    ns.list_locators(req.app)
}

fn add_node_hdlr(
    ns: &Namespace,
    env: &mut IoctlEnvelope,
) -> Result<NoResp, OvstackError> {
    let req: AddNodeReq = env.copy_in_req()?;
    ns.add_node(req.app, req.node_id, req.addr, req.weight)?;
    Ok(NoResp::default())
}

fn del_node_hdlr(
    ns: &Namespace,
    env: &mut IoctlEnvelope,
) -> Result<NoResp, OvstackError> {
    let req: DelNodeReq = env.copy_in_req()?;
    ns.delete_node(req.app, req.node_id, req.addr)?;
    Ok(NoResp::default())
}

fn set_node_weight_hdlr(
    ns: &Namespace,
    env: &mut IoctlEnvelope,
) -> Result<NoResp, OvstackError> {
    let req: SetNodeWeightReq = env.copy_in_req()?;
    ns.set_node_weight(req.app, req.node_id, req.addr, req.weight)?;
    Ok(NoResp::default())
}

fn get_node_hdlr(
    ns: &Namespace,
    env: &mut IoctlEnvelope,
) -> Result<NodeDesc, OvstackError> {
    let req: GetNodeReq = env.copy_in_req()?;
    ns.get_node(req.app, req.node_id)
}

fn list_nodes_hdlr(
    ns: &Namespace,
    env: &mut IoctlEnvelope,
) -> Result<ListNodesResp, OvstackError> {
    let req: AppReq = env.copy_in_req()?;
    ns.list_nodes(req.app)
}

fn add_route_hdlr(
    ns: &Namespace,
    env: &mut IoctlEnvelope,
) -> Result<NoResp, OvstackError> {
    let req: RouteReq = env.copy_in_req()?;
    ns.add_route(req.app, req.dst, req.nexthop)?;
    Ok(NoResp::default())
}

fn del_route_hdlr(
    ns: &Namespace,
    env: &mut IoctlEnvelope,
) -> Result<NoResp, OvstackError> {
    let req: RouteReq = env.copy_in_req()?;
    ns.delete_route(req.app, req.dst, req.nexthop)?;
    Ok(NoResp::default())
}

fn list_routes_hdlr(
    ns: &Namespace,
    env: &mut IoctlEnvelope,
) -> Result<ListRoutesResp, OvstackError> {
    let req: AppReq = env.copy_in_req()?;
    ns.list_routes(req.app)
}
