// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use super::CmdOk;
use serde::Deserialize;
use serde::Serialize;

/// A point-in-time copy of a namespace's forwarding counters.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct OvstackStatsSnap {
    /// Encapsulated datagrams handed to the transport.
    pub tx_datagrams: u64,
    /// Copies delivered to a local application because the own node
    /// was one of the next hops.
    pub tx_local_deliveries: u64,
    /// Datagrams received from the transport.
    pub rx_datagrams: u64,
    /// Received datagrams delivered to their application.
    pub rx_delivered: u64,
    /// Received datagrams re-entered into the transmit path.
    pub rx_relayed: u64,

    pub drop_no_route: u64,
    pub drop_no_locator: u64,
    pub drop_ttl_exceeded: u64,
    pub drop_unknown_app: u64,
    pub drop_alloc_failure: u64,
    pub drop_echo: u64,
    pub drop_rpf: u64,
    pub drop_own_unset: u64,
    pub drop_truncated: u64,
    pub drop_bad_version: u64,
    pub drop_transport: u64,
}

impl OvstackStatsSnap {
    /// Sum of every drop counter.
    pub fn drops(&self) -> u64 {
        self.drop_no_route
            + self.drop_no_locator
            + self.drop_ttl_exceeded
            + self.drop_unknown_app
            + self.drop_alloc_failure
            + self.drop_echo
            + self.drop_rpf
            + self.drop_own_unset
            + self.drop_truncated
            + self.drop_bad_version
            + self.drop_transport
    }
}

impl CmdOk for OvstackStatsSnap {}
