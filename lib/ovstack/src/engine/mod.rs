// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The overlay engine.
//!
//! Bottom up: [`node`] holds a node's weighted locators and the
//! selector, [`directory`] and [`route`] are the per-application
//! tables, [`app`] is the registry of applications, [`forward`] is
//! the transmit/receive state machine, and [`namespace`] ties all of
//! it to a transport and a set of counters.

pub mod app;
pub mod directory;
pub mod forward;
pub mod header;
pub mod ioctl;
pub mod namespace;
pub mod node;
pub mod route;
pub mod stat;
pub mod transport;

pub use forward::DropReason;
pub use forward::ProcessResult;
pub use namespace::Namespace;
