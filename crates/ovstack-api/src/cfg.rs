// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use super::OVSTACK_DEFAULT_WEIGHT;
use super::OVSTACK_PORT;
use super::OVSTACK_TTL;
use super::OvstackError;
use super::Weight;
use alloc::string::String;
use serde::Deserialize;
use serde::Serialize;

/// Configuration of one overlay namespace.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct OvstackCfg {
    /// TTL written into the header of every locally originated
    /// packet. Relayed packets keep the TTL they arrived with, less
    /// one.
    pub ttl: u8,

    /// The UDP port overlay datagrams are sent to and received on.
    pub port: u16,

    /// Weight assigned to a locator when the add operation does not
    /// carry one.
    pub default_weight: u8,
}

impl Default for OvstackCfg {
    fn default() -> Self {
        Self {
            ttl: OVSTACK_TTL,
            port: OVSTACK_PORT,
            default_weight: OVSTACK_DEFAULT_WEIGHT,
        }
    }
}

impl OvstackCfg {
    pub fn validate(&self) -> Result<(), OvstackError> {
        if self.ttl == 0 {
            return Err(OvstackError::InvalidArgument(String::from(
                "initial TTL must be at least 1",
            )));
        }

        let _ = self.default_weight()?;
        Ok(())
    }

    /// The configured default weight.
    pub fn default_weight(&self) -> Result<Weight, OvstackError> {
        Weight::new(self.default_weight)
    }

    /// Resolve an optional caller supplied weight, falling back to
    /// the configured default.
    pub fn weight_or_default(
        &self,
        weight: Option<u8>,
    ) -> Result<Weight, OvstackError> {
        match weight {
            Some(w) => Weight::new(w),
            None => self.default_weight(),
        }
    }
}
