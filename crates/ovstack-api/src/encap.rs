// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use super::OvstackError;
use alloc::string::String;
use alloc::string::ToString;
use core::fmt;
use core::fmt::Display;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

/// A 24-bit Virtual Network Identifier carried in the overlay header.
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
pub struct Vni {
    // A VNI is 24-bit. Storing three bytes means an out-of-range
    // value cannot be represented at all.
    //
    // The bytes are in network order.
    inner: [u8; 3],
}

impl Vni {
    pub const MAX: u32 = 0x00FF_FFFF;

    /// Attempt to create a new VNI from any value which can be
    /// converted to a `u32`.
    ///
    /// # Errors
    ///
    /// Returns [`OvstackError::InvalidArgument`] when the value
    /// exceeds the 24-bit VNI space.
    pub fn new<N: Into<u32>>(val: N) -> Result<Vni, OvstackError> {
        let val = val.into();
        if val > Self::MAX {
            return Err(OvstackError::InvalidArgument(format!(
                "VNI value exceeds maximum: {val}"
            )));
        }

        let be_bytes = val.to_be_bytes();
        Ok(Vni { inner: [be_bytes[1], be_bytes[2], be_bytes[3]] })
    }

    /// Return the bytes that represent this VNI. The bytes are in
    /// network order.
    pub fn bytes(&self) -> [u8; 3] {
        self.inner
    }

    /// Build a VNI from the upper 24 bits of a header word. The low
    /// 8 bits are the reserved field and are ignored.
    pub fn from_word(word: u32) -> Self {
        let b = word.to_be_bytes();
        Vni { inner: [b[0], b[1], b[2]] }
    }

    /// Place this VNI in the upper 24 bits of a header word, leaving
    /// the reserved low byte zeroed.
    pub fn to_word(self) -> u32 {
        u32::from(self) << 8
    }
}

impl From<Vni> for u32 {
    fn from(vni: Vni) -> u32 {
        let bytes = vni.inner;
        u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
    }
}

impl FromStr for Vni {
    type Err = String;

    fn from_str(val: &str) -> Result<Self, Self::Err> {
        let n = val.parse::<u32>().map_err(|e| e.to_string())?;
        Self::new(n).map_err(|e| e.to_string())
    }
}

impl Display for Vni {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", u32::from(*self))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn good_vni() {
        assert!(Vni::new(0u32).is_ok());
        assert!(Vni::new(11u8).is_ok());
        assert!(Vni::new((1u32 << 24) - 1).is_ok());
    }

    #[test]
    fn bad_vni() {
        assert!(Vni::new(2u32.pow(24)).is_err());
        assert!(Vni::new(2u32.pow(30)).is_err());
        assert!("16777216".parse::<Vni>().is_err());
    }

    #[test]
    fn vni_round_trip() {
        let vni = Vni::new(7777u32).unwrap();
        assert_eq!([0x00, 0x1E, 0x61], vni.bytes());
        assert_eq!(7777, u32::from(vni));
    }

    #[test]
    fn vni_header_word() {
        let vni = Vni::new(0x00AB_CDEFu32).unwrap();
        assert_eq!(vni.to_word(), 0xABCD_EF00);
        // The reserved byte never leaks into the VNI.
        assert_eq!(Vni::from_word(0xABCD_EF7F), vni);
    }
}
