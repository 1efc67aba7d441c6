//! A reliable, stream-oriented transport protocol running over a simulated
//! lossy, corrupting IPv4 packet network.
//!
//! # Organization
//!
//! - [`Substrate`] simulates the packet network: independent loss and
//!   corruption on every send, silent drops for unattached destinations.
//! - [`Host`] is a single attached machine, owning a small registry of
//!   protocols keyed by wire protocol number.
//! - [`rdt::Rdt`] is the Reliable Data Transport protocol itself, and
//!   [`rdt::Socket`] is the connection applications actually talk to —
//!   `bind`/`listen`/`accept`/`connect`/`send`/`recv`, backed by a
//!   stop-and-wait, alternating-bit sender/receiver and a three-way
//!   handshake.
//! - [`sdp`] is the Sample Datagram Protocol, a second, deliberately
//!   minimal protocol that exists only to exercise [`host::Protocol`]
//!   without any real demultiplexing.
//! - [`message::Message`] is a zero-copy chunked byte buffer used for
//!   accumulating received application data.
//!
//! Two protocols can share one [`Substrate`] and one [`Host`]: RDT
//! registers at `0xFE`, SDP at `0xFD`.

pub mod addr;
pub use addr::{Endpoint, Endpoints};

pub mod error;
pub use error::{AttachError, RegisterError, SocketError};

pub mod logging;

pub mod message;
pub use message::Message;

pub mod host;
pub use host::{Host, Protocol};

pub mod substrate;
pub use substrate::Substrate;

pub mod rdt;
pub use rdt::{Rdt, Socket};

pub mod sdp;
pub use sdp::Sdp;

use std::hash::BuildHasherDefault;

/// A [`dashmap::DashMap`] keyed with the non-cryptographic `FxHasher`, used
/// for the protocol and connection registries below.
pub type FxDashMap<K, V> = dashmap::DashMap<K, V, BuildHasherDefault<rustc_hash::FxHasher>>;
