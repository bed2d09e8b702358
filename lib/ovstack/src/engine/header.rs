// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The overlay header.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Version    |      TTL      |      App      |     Flags     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          Virtual Network Identifier (VNI)     |   Reserved    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                             Hash                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Destination Node Id                       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       Source Node Id                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! All multi-byte fields are in network order.

use crate::api::AppId;
use crate::api::NodeId;
use crate::api::OVSTACK_HEADER_VERSION;
use crate::api::Vni;
use alloc::vec::Vec;
use core::mem;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;

pub const OVERLAY_HDR_SZ: usize = OverlayHdrRaw::SIZE;

/// The decoded overlay header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OverlayHdr {
    pub version: u8,
    pub ttl: u8,
    pub app: AppId,
    pub flags: u8,
    pub vni: Vni,
    pub rsv: u8,
    pub hash: u32,
    pub dst: NodeId,
    pub src: NodeId,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OverlayHdrError {
    Truncated { len: usize },
    BadVersion { version: u8 },
}

impl OverlayHdr {
    /// A header for a locally originated packet.
    pub fn originate(
        app: AppId,
        ttl: u8,
        vni: Vni,
        flags: u8,
        hash: u32,
        dst: NodeId,
        src: NodeId,
    ) -> Self {
        Self {
            version: OVSTACK_HEADER_VERSION,
            ttl,
            app,
            flags,
            vni,
            rsv: 0,
            hash,
            dst,
            src,
        }
    }

    /// Parse the header at the front of `bytes`, returning it along
    /// with the remaining payload.
    pub fn parse(bytes: &[u8]) -> Result<(Self, &[u8]), OverlayHdrError> {
        let (raw, payload) = OverlayHdrRaw::read_from_prefix(bytes)
            .map_err(|_| OverlayHdrError::Truncated { len: bytes.len() })?;

        if raw.version != OVSTACK_HEADER_VERSION {
            return Err(OverlayHdrError::BadVersion { version: raw.version });
        }

        Ok((Self::from(&raw), payload))
    }

    /// Append the wire form of this header to `dst`.
    pub fn emit(&self, dst: &mut Vec<u8>) {
        dst.extend_from_slice(OverlayHdrRaw::from(self).as_bytes());
    }
}

impl From<&OverlayHdrRaw> for OverlayHdr {
    fn from(raw: &OverlayHdrRaw) -> Self {
        let vni_rsv = u32::from_be_bytes(raw.vni_rsv);
        Self {
            version: raw.version,
            ttl: raw.ttl,
            app: AppId::new(raw.app),
            flags: raw.flags,
            vni: Vni::from_word(vni_rsv),
            rsv: (vni_rsv & 0xFF) as u8,
            hash: u32::from_be_bytes(raw.hash),
            dst: NodeId::new(u32::from_be_bytes(raw.dst)),
            src: NodeId::new(u32::from_be_bytes(raw.src)),
        }
    }
}

impl From<&OverlayHdr> for OverlayHdrRaw {
    fn from(hdr: &OverlayHdr) -> Self {
        let vni_rsv = hdr.vni.to_word() | u32::from(hdr.rsv);
        Self {
            version: hdr.version,
            ttl: hdr.ttl,
            app: hdr.app.as_u8(),
            flags: hdr.flags,
            vni_rsv: vni_rsv.to_be_bytes(),
            hash: hdr.hash.to_be_bytes(),
            dst: hdr.dst.as_u32().to_be_bytes(),
            src: hdr.src.as_u32().to_be_bytes(),
        }
    }
}

/// The wire form of [`OverlayHdr`]: multi-byte fields big-endian.
#[repr(C)]
#[derive(
    Clone, Copy, Debug, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
)]
pub struct OverlayHdrRaw {
    pub version: u8,
    pub ttl: u8,
    pub app: u8,
    pub flags: u8,
    pub vni_rsv: [u8; 4],
    pub hash: [u8; 4],
    pub dst: [u8; 4],
    pub src: [u8; 4],
}

impl OverlayHdrRaw {
    pub const SIZE: usize = mem::size_of::<Self>();
}
