// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Common routines for integration tests.

// This type of pedantry is more trouble than it's worth here.
#![allow(dead_code)]

pub mod fabric;

// Let's make our lives easier and pub use a bunch of stuff.
pub use ovstack::api::APP_ETHER;
pub use ovstack::api::APP_IP;
pub use ovstack::api::APP_IPV6;
pub use ovstack::api::AppId;
pub use ovstack::api::IpAddr;
pub use ovstack::api::NodeId;
pub use ovstack::api::OvstackCfg;
pub use ovstack::api::OvstackError;
pub use ovstack::api::Vni;
pub use ovstack::engine::DropReason;
pub use ovstack::engine::Namespace;
pub use ovstack::engine::ProcessResult;
pub use ovstack::engine::app::AppRecv;
pub use ovstack::engine::app::Application;
pub use ovstack::engine::forward::Forwarded;
pub use ovstack::engine::forward::TxMeta;
pub use ovstack::engine::header::OVERLAY_HDR_SZ;
pub use ovstack::engine::header::OverlayHdr;
pub use ovstack::engine::transport::Datagram;
pub use ovstack::engine::transport::Transport;

pub use fabric::Fabric;
pub use fabric::PumpEvent;
pub use fabric::TestNode;

use ovstack::ddi::sync::KMutex;
use ovstack::provider::LogProvider;
use ovstack::provider::PrintlnLog;
use ovstack::provider::Providers;
use ovstack::provider::SlogLog;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

static SLOG_WANTED: AtomicBool = AtomicBool::new(false);
static SLOG: OnceLock<slog::Logger> = OnceLock::new();

/// Choose the log provider for this test binary. Meant to be called
/// from a `#[ctor::ctor]`: it only reads the environment, the logger
/// itself is built on first use.
pub fn init_log() {
    SLOG_WANTED.store(std::env::var_os("RUST_LOG").is_some(), Ordering::Relaxed);
}

/// A log provider for a test namespace: the terminal `slog` logger
/// when `RUST_LOG` is set, plain `println!` otherwise.
pub fn log_provider() -> Box<dyn LogProvider> {
    if SLOG_WANTED.load(Ordering::Relaxed) {
        let log = SLOG.get_or_init(ovstack::provider::default_slog);
        Box::new(SlogLog::new(log.clone()))
    } else {
        Box::new(PrintlnLog)
    }
}

/// One payload handed to a [`CaptureApp`].
#[derive(Clone, Debug)]
pub struct Delivery {
    pub hdr: OverlayHdr,
    pub payload: Vec<u8>,
}

/// An application which records everything delivered to it.
#[derive(Default)]
pub struct CaptureApp {
    got: KMutex<Vec<Delivery>>,
}

impl CaptureApp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.got.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.got.lock().len()
    }
}

impl AppRecv for CaptureApp {
    fn recv(&self, hdr: &OverlayHdr, payload: &[u8]) {
        self.got.lock().push(Delivery { hdr: *hdr, payload: payload.to_vec() });
    }
}

/// One datagram handed to a [`RecordingTransport`], in wire form.
#[derive(Clone, Debug)]
pub struct Sent {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub bytes: Vec<u8>,
}

impl Sent {
    pub fn hdr(&self) -> OverlayHdr {
        OverlayHdr::parse(&self.bytes).expect("recorded a bad header").0
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[OVERLAY_HDR_SZ..]
    }
}

/// A transport which records every datagram instead of sending it.
#[derive(Default)]
pub struct RecordingTransport {
    sent: KMutex<Vec<Sent>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Everything recorded so far.
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    /// Everything recorded so far, leaving the record empty.
    pub fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl Transport for RecordingTransport {
    fn send(&self, dgram: &Datagram<'_>) -> Result<(), DropReason> {
        let bytes = dgram.to_bytes()?;
        self.sent.lock().push(Sent { src: dgram.src, dst: dgram.dst, bytes });
        Ok(())
    }
}

/// A namespace with default configuration sending into a fresh
/// [`RecordingTransport`].
pub fn test_ns(name: &str) -> (Arc<Namespace>, Arc<RecordingTransport>) {
    test_ns_cfg(name, OvstackCfg::default())
}

pub fn test_ns_cfg(
    name: &str,
    cfg: OvstackCfg,
) -> (Arc<Namespace>, Arc<RecordingTransport>) {
    let tx = RecordingTransport::new();
    let ns = Namespace::new(
        name,
        cfg,
        tx.clone(),
        Providers { log: log_provider() },
    )
    .expect("bad test namespace config");
    (Arc::new(ns), tx)
}

pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

pub fn n(id: u32) -> NodeId {
    NodeId::new(id)
}
