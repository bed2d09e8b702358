// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The outer transport carrying encapsulated overlay packets.

use super::forward::DropReason;
use super::header::OVERLAY_HDR_SZ;
use super::header::OverlayHdr;
use crate::api::IpAddr;
use alloc::vec::Vec;

/// One encapsulated overlay packet, ready to be put on the wire.
///
/// The header belongs to this datagram alone; the payload is shared
/// by every leg of a multipath send.
#[derive(Clone, Copy, Debug)]
pub struct Datagram<'a> {
    /// The outer source locator.
    pub src: IpAddr,
    /// The outer destination locator.
    pub dst: IpAddr,
    pub hdr: OverlayHdr,
    pub payload: &'a [u8],
}

impl Datagram<'_> {
    pub fn len(&self) -> usize {
        OVERLAY_HDR_SZ + self.payload.len()
    }

    /// Header followed by payload, as it goes on the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DropReason> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(self.len())
            .map_err(|_| DropReason::AllocationFailure)?;
        self.hdr.emit(&mut bytes);
        bytes.extend_from_slice(self.payload);
        Ok(bytes)
    }
}

/// Something which can carry a [`Datagram`] to its outer destination.
///
/// `send` is called on the packet path and must not block. A failure
/// costs only the one datagram.
pub trait Transport: Send + Sync {
    fn send(&self, dgram: &Datagram<'_>) -> Result<(), DropReason>;
}

cfg_if! {
    if #[cfg(feature = "userland")] {
        use crate::ddi::sync::KRwLock;
        use std::io;
        use std::net::SocketAddr;
        use std::net::UdpSocket;

        /// A [`Transport`] over UDP sockets, one per bound local
        /// locator.
        pub struct UdpTransport {
            port: u16,
            socks: KRwLock<Vec<(IpAddr, UdpSocket)>>,
        }

        impl UdpTransport {
            /// Create a transport sending to `port` on every peer.
            pub fn new(port: u16) -> Self {
                Self { port, socks: KRwLock::new(Vec::new()) }
            }

            /// The port datagrams are sent to.
            pub fn port(&self) -> u16 {
                self.port
            }

            /// Bind a non-blocking socket on `local`, returning the
            /// address actually bound.
            pub fn bind(&self, local: SocketAddr) -> io::Result<SocketAddr> {
                let sock = UdpSocket::bind(local)?;
                sock.set_nonblocking(true)?;
                let bound = sock.local_addr()?;
                self.socks.write().push((IpAddr::from(bound.ip()), sock));
                Ok(bound)
            }

            /// Read one datagram from the socket bound to `local`.
            ///
            /// Returns the number of bytes read and the outer source
            /// address, which is what the receive path wants for its
            /// reverse path check.
            pub fn recv_from(
                &self,
                local: IpAddr,
                buf: &mut [u8],
            ) -> io::Result<(usize, IpAddr)> {
                let socks = self.socks.read();
                let Some((_, sock)) = socks.iter().find(|(a, _)| *a == local)
                else {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        "no socket bound to that locator",
                    ));
                };

                let (len, from) = sock.recv_from(buf)?;
                Ok((len, IpAddr::from(from.ip())))
            }
        }

        impl Transport for UdpTransport {
            fn send(&self, dgram: &Datagram<'_>) -> Result<(), DropReason> {
                let socks = self.socks.read();

                // Prefer the socket bound to the exact source locator,
                // then any socket of the same family.
                let family = dgram.dst.family();
                let sock = socks
                    .iter()
                    .find(|(a, _)| *a == dgram.src)
                    .or_else(|| socks.iter().find(|(a, _)| a.family() == family))
                    .map(|(_, s)| s)
                    .ok_or(DropReason::Transport)?;

                let bytes = dgram.to_bytes()?;
                let dst = SocketAddr::new(dgram.dst.into(), self.port);
                sock.send_to(&bytes, dst).map_err(|_| DropReason::Transport)?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::AppId;
    use crate::api::NodeId;
    use crate::api::Vni;
    use std::thread;
    use std::time::Duration;

    fn hdr() -> OverlayHdr {
        OverlayHdr::originate(
            AppId::new(7),
            128,
            Vni::default(),
            0,
            0,
            NodeId::new(200),
            NodeId::new(100),
        )
    }

    #[test]
    fn datagram_bytes() {
        let dgram = Datagram {
            src: "10.0.0.1".parse().unwrap(),
            dst: "10.0.0.2".parse().unwrap(),
            hdr: hdr(),
            payload: b"hello",
        };
        let bytes = dgram.to_bytes().unwrap();
        assert_eq!(bytes.len(), OVERLAY_HDR_SZ + 5);
        assert_eq!(&bytes[OVERLAY_HDR_SZ..], b"hello");

        let (parsed, payload) = OverlayHdr::parse(&bytes).unwrap();
        assert_eq!(parsed, dgram.hdr);
        assert_eq!(payload, b"hello");
    }

    #[cfg(feature = "userland")]
    #[test]
    fn udp_loopback() {
        let rx = UdpTransport::new(0);
        let rx_addr = rx.bind("127.0.0.1:0".parse().unwrap()).unwrap();

        let tx = UdpTransport::new(rx_addr.port());
        let tx_addr = tx.bind("127.0.0.1:0".parse().unwrap()).unwrap();

        let lo: IpAddr = "127.0.0.1".parse().unwrap();
        let dgram = Datagram { src: lo, dst: lo, hdr: hdr(), payload: b"ping" };
        tx.send(&dgram).unwrap();

        let mut buf = [0u8; 64];
        let mut got = None;
        for _ in 0..200 {
            match rx.recv_from(lo, &mut buf) {
                Ok(res) => {
                    got = Some(res);
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(5));
                }
                Err(e) => panic!("recv failed: {e}"),
            }
        }

        let (len, from) = got.expect("no datagram received");
        assert_eq!(from, IpAddr::from(tx_addr.ip()));
        let (parsed, payload) = OverlayHdr::parse(&buf[..len]).unwrap();
        assert_eq!(parsed.dst, NodeId::new(200));
        assert_eq!(payload, b"ping");
    }

    #[cfg(feature = "userland")]
    #[test]
    fn udp_no_socket_for_family() {
        let tx = UdpTransport::new(1);
        let dgram = Datagram {
            src: "fd00::1".parse().unwrap(),
            dst: "fd00::2".parse().unwrap(),
            hdr: hdr(),
            payload: b"",
        };
        assert_eq!(tx.send(&dgram), Err(DropReason::Transport));
    }
}
