// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The overlay routing stack.
//!
//! A node/locator directory plus a forwarding engine which lets
//! independent applications exchange payloads between nodes named by
//! a stable 32-bit node id, regardless of the IPv4/IPv6 addresses
//! ("locators") those nodes are reachable at.
//!
//! Everything hangs off a [`engine::namespace::Namespace`]: it owns
//! the application registry, the transport endpoint, the forwarding
//! counters, and the providers.

#![allow(clippy::len_without_is_empty)]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

extern crate alloc;

#[macro_use]
extern crate cfg_if;

pub mod api;
pub mod ctl;
pub mod ddi;
pub mod engine;
pub mod provider;
