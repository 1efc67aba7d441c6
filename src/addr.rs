//! Socket addressing: a host IP plus a port, and a connection's 4-tuple.

use std::fmt::{self, Display};
use std::net::Ipv4Addr;

/// A single `(address, port)` pair, as used for local and remote socket
/// addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: Ipv4Addr, port: u16) -> Self {
        Self { address, port }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

impl From<(Ipv4Addr, u16)> for Endpoint {
    fn from((address, port): (Ipv4Addr, u16)) -> Self {
        Self::new(address, port)
    }
}

/// A connection's 4-tuple: `(local_ip, local_port, remote_ip, remote_port)`.
///
/// Used as the key into the protocol's `half_open` and `established` tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoints {
    pub local: Endpoint,
    pub remote: Endpoint,
}

impl Endpoints {
    pub fn new(local: Endpoint, remote: Endpoint) -> Self {
        Self { local, remote }
    }
}

impl Display for Endpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.local, self.remote)
    }
}
