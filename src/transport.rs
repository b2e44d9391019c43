//! Datagram transport abstraction.
//!
//! The core never owns a socket: something outside feeds it inbound
//! datagrams and it pushes outbound ones through a [`Transport`]. The demo
//! binary wires this to UDP; tests capture the channel directly.

use std::fmt;

use async_trait::async_trait;

/// A client endpoint on the wire: the (network, station) byte pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Station {
    pub net: u8,
    pub stn: u8,
}

impl Station {
    pub fn new(net: u8, stn: u8) -> Self {
        Self { net, stn }
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.net, self.stn)
    }
}

/// An inbound datagram handed to the server core.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub from: Station,
    pub port: u8,
    pub ctrl: u8,
    pub data: Vec<u8>,
}

/// An outbound datagram produced by the server core.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub to: Station,
    pub port: u8,
    pub ctrl: u8,
    pub data: Vec<u8>,
}

/// Delivers a payload to a destination station. Implementations frame the
/// payload however their medium requires; the core treats the envelope as
/// opaque.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, to: Station, port: u8, ctrl: u8, data: &[u8]) -> std::io::Result<()>;
}
