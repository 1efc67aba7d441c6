//! The Reliable Data Transport protocol: a stop-and-wait, alternating-bit
//! transport running over [`crate::substrate::Substrate`].
//!
//! `Rdt` is the [`crate::host::Protocol`] implementation — it owns the four
//! connection tables and does nothing but classify and route inbound
//! segments, plus drive the server side of the handshake. Everything a
//! socket *does* (connect, send, recv, accept) lives on [`socket::Socket`]
//! itself, following the same split a `socket_api.rs`/`socket.rs` pair
//! draws between the protocol-wide demultiplexer and the per-socket state
//! machine.

pub mod segment;
pub mod socket;

pub use socket::Socket;

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::addr::{Endpoint, Endpoints};
use crate::error::DemuxError;
use crate::error::SocketError;
use crate::host::{Host, Protocol};
use segment::{Segment, FLAG_ACK, FLAG_SYN};
use socket::SocketState;

/// The wire protocol number RDT registers under.
pub const PROTO_ID: u8 = 0xFE;

const EPHEMERAL_RANGE: std::ops::RangeInclusive<u16> = 49152..=65535;
const EPHEMERAL_ATTEMPTS: usize = 4096;

#[derive(Default)]
struct Tables {
    bound_ports: HashMap<u16, Arc<Socket>>,
    listening: HashMap<u16, Arc<Socket>>,
    half_open: HashMap<Endpoints, Arc<Socket>>,
    established: HashMap<Endpoints, Arc<Socket>>,
}

/// The RDT protocol instance attached to one [`Host`].
pub struct Rdt {
    local_ip: Ipv4Addr,
    host: Weak<Host>,
    retransmit_timeout: Duration,
    tables: Mutex<Tables>,
    /// A handle back to ourselves so [`Protocol::input`], which only gets
    /// `&self`, can still hand an `Arc<Rdt>` to the server-side handshake
    /// worker it spawns.
    self_ref: Weak<Rdt>,
}

impl Rdt {
    /// Creates a new RDT instance for the host reached through `host`, at
    /// `local_ip`. `host` is a weak reference since the host's protocol
    /// registry holds an `Arc` the other way.
    pub fn new(local_ip: Ipv4Addr, host: Weak<Host>, retransmit_timeout: Duration) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            local_ip,
            host,
            retransmit_timeout,
            tables: Mutex::new(Tables::default()),
            self_ref: self_ref.clone(),
        })
    }

    pub fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }

    pub fn retransmit_timeout(&self) -> Duration {
        self.retransmit_timeout
    }

    fn host(&self) -> Arc<Host> {
        self.host.upgrade().expect("host outlives its registered protocols")
    }

    fn arc(&self) -> Arc<Rdt> {
        self.self_ref.upgrade().expect("Rdt outlives its own input() call")
    }

    pub(crate) fn tx(&self, bytes: &[u8], dst: Ipv4Addr) {
        self.host().output(PROTO_ID, bytes, dst);
    }

    /// Creates a fresh, unbound socket on this protocol instance.
    pub fn new_socket(self: &Arc<Self>) -> Arc<Socket> {
        Socket::new(self.clone())
    }

    pub(crate) fn bind_port(&self, port: u16, socket: Arc<Socket>) -> Result<(), SocketError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.bound_ports.contains_key(&port) {
            return Err(SocketError::AddressInUse);
        }
        tables.bound_ports.insert(port, socket);
        Ok(())
    }

    pub(crate) fn alloc_ephemeral_port(&self, socket: Arc<Socket>) -> Result<u16, SocketError> {
        let mut tables = self.tables.lock().unwrap();
        for _ in 0..EPHEMERAL_ATTEMPTS {
            let port = rand::Rng::gen_range(&mut rand::thread_rng(), EPHEMERAL_RANGE);
            if !tables.bound_ports.contains_key(&port) {
                tables.bound_ports.insert(port, socket);
                return Ok(port);
            }
        }
        Err(SocketError::AddressInUse)
    }

    pub(crate) fn start_listening(&self, port: u16, socket: Arc<Socket>) -> Result<(), SocketError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.listening.contains_key(&port) {
            return Err(SocketError::AddressInUse);
        }
        tables.listening.insert(port, socket);
        Ok(())
    }

    pub(crate) fn begin_half_open(&self, endpoints: Endpoints, socket: Arc<Socket>) {
        self.tables.lock().unwrap().half_open.insert(endpoints, socket);
    }

    pub(crate) fn complete_client_handshake(&self, endpoints: Endpoints) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(socket) = tables.half_open.remove(&endpoints) {
            tables.established.insert(endpoints, socket);
        }
    }

    /// True once the given tuple is no longer in `half_open` — either
    /// migrated to `established` or never existed — used by a server-side
    /// retransmit worker to know when to stop.
    fn handshake_settled(&self, endpoints: &Endpoints) -> bool {
        let tables = self.tables.lock().unwrap();
        !tables.half_open.contains_key(endpoints)
    }

    /// Entry point for the server side of the handshake: a SYN arrived for
    /// a listening port.
    fn handle_syn(self: &Arc<Self>, src_ip: Ipv4Addr, seg: &Segment) {
        let listener = {
            let tables = self.tables.lock().unwrap();
            tables.listening.get(&seg.dst_port).cloned()
        };
        let Some(listener) = listener else {
            tracing::debug!(target: "rdt::protocol", port = seg.dst_port, "SYN for unbound port");
            return;
        };

        let local = Endpoint::new(self.local_ip, seg.dst_port);
        let remote = Endpoint::new(src_ip, seg.src_port);
        let endpoints = Endpoints::new(local, remote);

        let (child, is_new) = {
            let mut tables = self.tables.lock().unwrap();
            if tables.established.contains_key(&endpoints) {
                // A stale, retransmitted SYN for a connection that's
                // already fully established. Ignore it rather than
                // standing up a second half-open connection on the same
                // tuple, which would silently replace the live one the
                // moment its own ACK arrived.
                tracing::debug!(target: "rdt::protocol", %endpoints, "stale SYN for established connection, dropped");
                return;
            }
            if let Some(existing) = tables.half_open.get(&endpoints) {
                (existing.clone(), false)
            } else {
                let child = Socket::new_child(self.clone(), endpoints, &listener);
                *child.expected_recv.write().unwrap() = (seg.seq as u8) ^ 1;
                tables.half_open.insert(endpoints, child.clone());
                (child, true)
            }
        };

        let syn_ack = Segment::new(
            local.port,
            remote.port,
            0,
            ((seg.seq as u8) ^ 1) as u32,
            FLAG_SYN | FLAG_ACK,
            Vec::new(),
        );
        let syn_ack_bytes = syn_ack.encode();
        self.tx(&syn_ack_bytes, remote.address);

        if is_new {
            let rdt = self.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(rdt.retransmit_timeout) => {
                            if rdt.handshake_settled(&endpoints) {
                                break;
                            }
                            rdt.tx(&syn_ack_bytes, endpoints.remote.address);
                        }
                        _ = child.handshake_done.notified() => break,
                    }
                }
            });
        }
    }

    /// A bare ACK arrived. If it completes a half-open server handshake,
    /// finish it and hand the new connection to its listener; otherwise
    /// it's an ack for data this socket's established peer sent.
    fn handle_ack(&self, src_ip: Ipv4Addr, seg: &Segment) {
        let local = Endpoint::new(self.local_ip, seg.dst_port);
        let remote = Endpoint::new(src_ip, seg.src_port);
        let endpoints = Endpoints::new(local, remote);

        let half_open_match = {
            let tables = self.tables.lock().unwrap();
            tables.half_open.get(&endpoints).cloned()
        };

        if let Some(child) = half_open_match {
            if seg.payload.is_empty() {
                let mut tables = self.tables.lock().unwrap();
                tables.half_open.remove(&endpoints);
                tables.established.insert(endpoints, child.clone());
                drop(tables);

                child.set_state(SocketState::Connected);
                *child.send_seq.write().unwrap() = 1;
                child.handshake_done.notify_waiters();

                if let Some(listener) = child.parent.read().unwrap().as_ref().and_then(Weak::upgrade) {
                    listener.enqueue_accepted(child);
                }
            } else {
                tracing::debug!(target: "rdt::protocol", %endpoints, "payload-carrying ACK during handshake, dropped");
            }
            return;
        }

        let established_match = {
            let tables = self.tables.lock().unwrap();
            tables.established.get(&endpoints).cloned()
        };
        match established_match {
            Some(socket) => socket.offer_segment(seg.clone()),
            None => tracing::debug!(target: "rdt::protocol", %endpoints, "ACK for unknown connection, dropped"),
        }
    }

    /// A SYN-ACK arrived: either an answer to our own pending connect, or a
    /// retransmitted one for a connection we've already established (in
    /// which case we just re-send our ACK).
    fn handle_syn_ack(&self, src_ip: Ipv4Addr, seg: &Segment) {
        let local = Endpoint::new(self.local_ip, seg.dst_port);
        let remote = Endpoint::new(src_ip, seg.src_port);
        let endpoints = Endpoints::new(local, remote);

        let half_open_match = {
            let tables = self.tables.lock().unwrap();
            tables.half_open.get(&endpoints).cloned()
        };
        if let Some(socket) = half_open_match {
            socket.offer_segment(seg.clone());
            return;
        }

        let established_match = {
            let tables = self.tables.lock().unwrap();
            tables.established.get(&endpoints).cloned()
        };
        match established_match {
            Some(socket) => {
                let expected = *socket.expected_recv.read().unwrap();
                let ack = Segment::new(local.port, remote.port, 1, expected as u32, FLAG_ACK, Vec::new());
                self.tx(&ack.encode(), remote.address);
            }
            None => tracing::debug!(target: "rdt::protocol", %endpoints, "SYN-ACK for unknown connection, dropped"),
        }
    }

    /// Anything else: plain data (no flags) headed for an established
    /// connection, or a payload-carrying ACK — both dispatch to the
    /// socket's data handler.
    fn handle_data_or_unknown(&self, src_ip: Ipv4Addr, seg: &Segment) {
        let local = Endpoint::new(self.local_ip, seg.dst_port);
        let remote = Endpoint::new(src_ip, seg.src_port);
        let endpoints = Endpoints::new(local, remote);

        let established_match = {
            let tables = self.tables.lock().unwrap();
            tables.established.get(&endpoints).cloned()
        };
        match established_match {
            Some(socket) => socket.handle_data(seg.seq, &seg.payload),
            None => tracing::trace!(target: "rdt::protocol", %endpoints, "segment for unknown connection, dropped"),
        }
    }
}

impl Protocol for Rdt {
    fn id(&self) -> u8 {
        PROTO_ID
    }

    fn input(&self, bytes: &[u8], src_ip: Ipv4Addr) {
        if !Segment::verify(bytes) {
            tracing::trace!(target: "rdt::protocol", %src_ip, "dropped segment failing checksum");
            return;
        }
        let seg = match Segment::decode(bytes) {
            Ok(seg) => seg,
            Err(DemuxError::MalformedSegment) => {
                tracing::trace!(target: "rdt::protocol", %src_ip, "dropped malformed segment");
                return;
            }
        };

        if src_ip == self.local_ip && seg.src_port == seg.dst_port {
            tracing::trace!(target: "rdt::protocol", %src_ip, "dropped self-addressed loopback segment");
            return;
        }

        if seg.is_syn() {
            self.arc().handle_syn(src_ip, &seg);
        } else if seg.is_syn_ack() {
            self.handle_syn_ack(src_ip, &seg);
        } else if seg.is_ack() {
            self.handle_ack(src_ip, &seg);
        } else {
            self.handle_data_or_unknown(src_ip, &seg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unattached_rdt() -> Arc<Rdt> {
        Rdt::new(Ipv4Addr::new(127, 0, 0, 1), Weak::new(), Duration::from_millis(10))
    }

    #[test]
    fn bind_rejects_duplicate_port() {
        let rdt = unattached_rdt();
        let a = rdt.new_socket();
        let b = rdt.new_socket();
        assert!(rdt.bind_port(4000, a).is_ok());
        assert!(matches!(rdt.bind_port(4000, b), Err(SocketError::AddressInUse)));
    }

    #[test]
    fn listen_rejects_duplicate_port() {
        let rdt = unattached_rdt();
        let a = rdt.new_socket();
        let b = rdt.new_socket();
        assert!(rdt.start_listening(4001, a).is_ok());
        assert!(matches!(rdt.start_listening(4001, b), Err(SocketError::AddressInUse)));
    }

    #[test]
    fn ephemeral_ports_land_in_range_and_never_collide() {
        let rdt = unattached_rdt();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            let socket = rdt.new_socket();
            let port = rdt.alloc_ephemeral_port(socket).unwrap();
            assert!((49152..=65535).contains(&port));
            assert!(seen.insert(port), "ephemeral port allocator returned a duplicate");
        }
    }

    #[test]
    fn handshake_migrates_half_open_to_established() {
        let rdt = unattached_rdt();
        let local = Endpoint::new(Ipv4Addr::new(127, 0, 0, 1), 4002);
        let remote = Endpoint::new(Ipv4Addr::new(127, 0, 0, 2), 5000);
        let endpoints = Endpoints::new(local, remote);
        let socket = rdt.new_socket();

        rdt.begin_half_open(endpoints, socket);
        assert!(rdt.tables.lock().unwrap().half_open.contains_key(&endpoints));

        rdt.complete_client_handshake(endpoints);
        let tables = rdt.tables.lock().unwrap();
        assert!(!tables.half_open.contains_key(&endpoints));
        assert!(tables.established.contains_key(&endpoints));
    }
}
