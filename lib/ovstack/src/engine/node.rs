// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Nodes, their locators, and locator selection.
//!
//! A [`Node`] is an immutable value once it has been published in a
//! directory snapshot. All mutation happens on a private copy which
//! the directory then swaps in, so a reader walking a node's locator
//! lists always sees a weight sum that matches those lists.

use crate::api::AddrFamily;
use crate::api::IpAddr;
use crate::api::LocatorDesc;
use crate::api::NodeDesc;
use crate::api::NodeId;
use crate::api::OvstackError;
use crate::api::Weight;
use crate::ddi::time::Moment;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Display;

/// The locator family a selection is restricted to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Family {
    V4,
    V6,
    /// Both families: the IPv4 list followed by the IPv6 list, over
    /// the combined weight space.
    Any,
}

impl From<AddrFamily> for Family {
    fn from(af: AddrFamily) -> Self {
        match af {
            AddrFamily::V4 => Self::V4,
            AddrFamily::V6 => Self::V6,
        }
    }
}

/// An address at which a node can be reached, with its selection
/// weight.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Locator {
    addr: IpAddr,
    weight: Weight,
}

impl Locator {
    pub fn new(addr: IpAddr, weight: Weight) -> Self {
        Self { addr, weight }
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn weight(&self) -> Weight {
        self.weight
    }

    pub fn family(&self) -> AddrFamily {
        self.addr.family()
    }
}

impl Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (weight {})", self.addr, self.weight)
    }
}

impl From<&Locator> for LocatorDesc {
    fn from(loc: &Locator) -> Self {
        LocatorDesc { addr: loc.addr, weight: loc.weight.get() }
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    id: NodeId,
    ipv4: Vec<Locator>,
    ipv6: Vec<Locator>,
    weight_sum_v4: u32,
    weight_sum_v6: u32,
    last_update: Moment,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            ipv4: Vec::new(),
            ipv6: Vec::new(),
            weight_sum_v4: 0,
            weight_sum_v6: 0,
            last_update: Moment::now(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: NodeId) {
        self.id = id;
    }

    pub fn last_update(&self) -> Moment {
        self.last_update
    }

    pub fn locators(&self, af: AddrFamily) -> &[Locator] {
        match af {
            AddrFamily::V4 => &self.ipv4,
            AddrFamily::V6 => &self.ipv6,
        }
    }

    /// All locators, IPv4 first.
    pub fn iter(&self) -> impl Iterator<Item = &Locator> {
        self.ipv4.iter().chain(self.ipv6.iter())
    }

    pub fn count(&self, af: AddrFamily) -> usize {
        self.locators(af).len()
    }

    pub fn weight_sum(&self, af: AddrFamily) -> u32 {
        match af {
            AddrFamily::V4 => self.weight_sum_v4,
            AddrFamily::V6 => self.weight_sum_v6,
        }
    }

    pub fn find_locator(&self, addr: &IpAddr) -> Option<&Locator> {
        self.locators(addr.family()).iter().find(|l| l.addr == *addr)
    }

    pub fn has_locator(&self, addr: &IpAddr) -> bool {
        self.find_locator(addr).is_some()
    }

    fn parts_mut(&mut self, af: AddrFamily) -> (&mut Vec<Locator>, &mut u32) {
        match af {
            AddrFamily::V4 => (&mut self.ipv4, &mut self.weight_sum_v4),
            AddrFamily::V6 => (&mut self.ipv6, &mut self.weight_sum_v6),
        }
    }

    /// Add a locator, folding its weight into the family's sum.
    pub fn add_locator(
        &mut self,
        addr: IpAddr,
        weight: Weight,
    ) -> Result<(), OvstackError> {
        if self.has_locator(&addr) {
            return Err(OvstackError::LocatorExists { node: self.id, addr });
        }

        let (list, sum) = self.parts_mut(addr.family());
        list.push(Locator::new(addr, weight));
        *sum += u32::from(weight.get());
        self.last_update = Moment::now();
        Ok(())
    }

    /// Remove a locator, subtracting its weight from the family's sum.
    pub fn remove_locator(
        &mut self,
        addr: &IpAddr,
    ) -> Result<Locator, OvstackError> {
        let node = self.id;
        let (list, sum) = self.parts_mut(addr.family());
        let Some(idx) = list.iter().position(|l| l.addr == *addr) else {
            return Err(OvstackError::LocatorNotFound { node, addr: *addr });
        };

        let loc = list.remove(idx);
        *sum -= u32::from(loc.weight.get());
        self.last_update = Moment::now();
        Ok(loc)
    }

    /// Change a locator's weight, returning the old one. The family's
    /// sum moves by the difference.
    pub fn set_locator_weight(
        &mut self,
        addr: &IpAddr,
        weight: Weight,
    ) -> Result<Weight, OvstackError> {
        let node = self.id;
        let (list, sum) = self.parts_mut(addr.family());
        let Some(loc) = list.iter_mut().find(|l| l.addr == *addr) else {
            return Err(OvstackError::LocatorNotFound { node, addr: *addr });
        };

        let old = loc.weight;
        *sum = *sum - u32::from(old.get()) + u32::from(weight.get());
        loc.weight = weight;
        self.last_update = Moment::now();
        Ok(old)
    }

    /// Pick a locator for `hash`.
    ///
    /// The hash is reduced into the weight space of `family` and the
    /// candidate list is walked, consuming each locator's weight,
    /// until the remainder lands inside one. The result depends only
    /// on the node's locator lists and `hash`, so a flow always maps
    /// to the same locator while those are unchanged, and over many
    /// flows each locator's share is proportional to its weight.
    ///
    /// Returns `None` when the family has no locators.
    pub fn select(&self, hash: u32, family: Family) -> Option<&Locator> {
        let none: &[Locator] = &[];
        let (space, first, second) = match family {
            Family::V4 => (self.weight_sum_v4, self.ipv4.as_slice(), none),
            Family::V6 => (self.weight_sum_v6, self.ipv6.as_slice(), none),
            Family::Any => (
                self.weight_sum_v4.saturating_add(self.weight_sum_v6),
                self.ipv4.as_slice(),
                self.ipv6.as_slice(),
            ),
        };

        if space == 0 {
            return None;
        }

        let mut h = hash % space;
        for loc in first.iter().chain(second.iter()) {
            let w = u32::from(loc.weight.get());
            if h < w {
                return Some(loc);
            }
            h -= w;
        }

        None
    }

    pub fn desc(&self, now: Moment) -> NodeDesc {
        NodeDesc {
            node_id: self.id,
            locators: self.iter().map(LocatorDesc::from).collect(),
            weight_sum_v4: self.weight_sum_v4,
            weight_sum_v6: self.weight_sum_v6,
            idle_ms: now.delta_as_millis(self.last_update),
        }
    }

    /// Recompute both weight sums from the locator lists and compare
    /// them against the maintained values.
    #[cfg(any(feature = "test-help", test))]
    pub fn weight_sums_consistent(&self) -> bool {
        let sum = |list: &[Locator]| -> u32 {
            list.iter().map(|l| u32::from(l.weight.get())).sum()
        };
        sum(&self.ipv4) == self.weight_sum_v4
            && sum(&self.ipv6) == self.weight_sum_v6
    }
}
