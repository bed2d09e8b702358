// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Namespace forwarding counters.
//!
//! Every counter is a relaxed atomic: the hot path bumps them without
//! taking a lock, and a snapshot is only ever a best-effort view.

use super::forward::DropReason;
use crate::api::OvstackStatsSnap;
use core::sync::atomic::AtomicU64;
use core::sync::atomic::Ordering;

/// A monotonically increasing 64-bit counter.
#[derive(Debug, Default)]
pub struct StatU64(AtomicU64);

impl StatU64 {
    pub fn incr(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn val(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct OvstackStats {
    pub tx_datagrams: StatU64,
    pub tx_local_deliveries: StatU64,
    pub rx_datagrams: StatU64,
    pub rx_delivered: StatU64,
    pub rx_relayed: StatU64,

    pub drop_no_route: StatU64,
    pub drop_no_locator: StatU64,
    pub drop_ttl_exceeded: StatU64,
    pub drop_unknown_app: StatU64,
    pub drop_alloc_failure: StatU64,
    pub drop_echo: StatU64,
    pub drop_rpf: StatU64,
    pub drop_own_unset: StatU64,
    pub drop_truncated: StatU64,
    pub drop_bad_version: StatU64,
    pub drop_transport: StatU64,
}

impl OvstackStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one drop for `reason`.
    pub fn drop(&self, reason: DropReason) {
        let stat = match reason {
            DropReason::NoRoute => &self.drop_no_route,
            DropReason::NoLocator => &self.drop_no_locator,
            DropReason::TtlExceeded => &self.drop_ttl_exceeded,
            DropReason::UnknownApplication => &self.drop_unknown_app,
            DropReason::AllocationFailure => &self.drop_alloc_failure,
            DropReason::Echo => &self.drop_echo,
            DropReason::Rpf => &self.drop_rpf,
            DropReason::OwnNodeUnset => &self.drop_own_unset,
            DropReason::Truncated => &self.drop_truncated,
            DropReason::BadVersion => &self.drop_bad_version,
            DropReason::Transport => &self.drop_transport,
        };
        stat.incr(1);
    }

    pub fn snapshot(&self) -> OvstackStatsSnap {
        OvstackStatsSnap::from(self)
    }
}

impl From<&OvstackStats> for OvstackStatsSnap {
    fn from(stats: &OvstackStats) -> Self {
        Self {
            tx_datagrams: stats.tx_datagrams.val(),
            tx_local_deliveries: stats.tx_local_deliveries.val(),
            rx_datagrams: stats.rx_datagrams.val(),
            rx_delivered: stats.rx_delivered.val(),
            rx_relayed: stats.rx_relayed.val(),
            drop_no_route: stats.drop_no_route.val(),
            drop_no_locator: stats.drop_no_locator.val(),
            drop_ttl_exceeded: stats.drop_ttl_exceeded.val(),
            drop_unknown_app: stats.drop_unknown_app.val(),
            drop_alloc_failure: stats.drop_alloc_failure.val(),
            drop_echo: stats.drop_echo.val(),
            drop_rpf: stats.drop_rpf.val(),
            drop_own_unset: stats.drop_own_unset.val(),
            drop_truncated: stats.drop_truncated.val(),
            drop_bad_version: stats.drop_bad_version.val(),
            drop_transport: stats.drop_transport.val(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn drops_land_in_their_counter() {
        let stats = OvstackStats::new();
        stats.drop(DropReason::Echo);
        stats.drop(DropReason::Echo);
        stats.drop(DropReason::TtlExceeded);
        stats.tx_datagrams.incr(3);

        let snap = stats.snapshot();
        assert_eq!(snap.drop_echo, 2);
        assert_eq!(snap.drop_ttl_exceeded, 1);
        assert_eq!(snap.drops(), 3);
        assert_eq!(snap.tx_datagrams, 3);
    }
}
