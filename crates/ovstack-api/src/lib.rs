// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

#![no_std]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;

use alloc::string::String;
use core::fmt;
use core::fmt::Display;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

pub mod cfg;
pub mod cmd;
pub mod encap;
pub mod ip;
pub mod stat;

pub use cfg::*;
pub use cmd::*;
pub use encap::*;
pub use ip::*;
pub use stat::*;

/// The overall version of the API. Anytime an API is added, removed,
/// or modified, this number should increment. Currently we attach no
/// semantic meaning to the number other than as a means to verify
/// that the control client and the engine are compiled for the same
/// API.
pub const API_VERSION: u64 = 3;

/// Initial TTL of a locally originated overlay packet.
pub const OVSTACK_TTL: u8 = 128;

/// The well-known UDP port carrying overlay datagrams.
pub const OVSTACK_PORT: u16 = 60002;

/// The only overlay header version understood by this stack.
pub const OVSTACK_HEADER_VERSION: u8 = 1;

/// Locator weight used when an add operation does not specify one.
pub const OVSTACK_DEFAULT_WEIGHT: u8 = 50;

/// Well-known application ids.
pub const APP_IP: AppId = AppId(4);
pub const APP_IPV6: AppId = AppId(6);
pub const APP_ETHER: AppId = AppId(7);

/// The identity of an overlay node.
///
/// Node ids are opaque 32-bit values. The value zero is reserved to
/// mean "unset" and is what an application's own node carries until
/// it is configured.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct NodeId(u32);

impl NodeId {
    pub const UNSET: Self = Self(0);

    pub const fn new(val: u32) -> Self {
        Self(val)
    }

    pub const fn is_unset(&self) -> bool {
        self.0 == 0
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for NodeId {
    fn from(val: u32) -> Self {
        Self(val)
    }
}

impl From<NodeId> for u32 {
    fn from(id: NodeId) -> u32 {
        id.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>()
            .map(Self)
            .map_err(|e| format!("invalid node id {s}: {e}"))
    }
}

/// The identity of an upper-layer application multiplexed over the
/// overlay.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct AppId(u8);

impl AppId {
    pub const fn new(val: u8) -> Self {
        Self(val)
    }

    pub const fn as_u8(&self) -> u8 {
        self.0
    }
}

impl From<u8> for AppId {
    fn from(val: u8) -> Self {
        Self(val)
    }
}

impl From<AppId> for u8 {
    fn from(id: AppId) -> u8 {
        id.0
    }
}

impl Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AppId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ip" => Ok(APP_IP),
            "ipv6" => Ok(APP_IPV6),
            "ether" => Ok(APP_ETHER),
            _ => s
                .parse::<u8>()
                .map(Self)
                .map_err(|e| format!("invalid application id {s}: {e}")),
        }
    }
}

/// A locator selection weight. Valid weights are `1..=255`.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct Weight(u8);

impl Weight {
    pub const DEFAULT: Self = Self(OVSTACK_DEFAULT_WEIGHT);

    pub fn new(val: u8) -> Result<Self, OvstackError> {
        if val == 0 {
            return Err(OvstackError::InvalidArgument(String::from(
                "locator weight must be at least 1",
            )));
        }

        Ok(Self(val))
    }

    pub const fn get(&self) -> u8 {
        self.0
    }
}

impl Default for Weight {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for Weight {
    type Error = OvstackError;

    fn try_from(val: u8) -> Result<Self, Self::Error> {
        Self::new(val)
    }
}
