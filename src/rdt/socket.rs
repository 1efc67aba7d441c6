//! The connection-oriented socket applications interact with.
//!
//! Grounded on `protocols/socket_api/socket.rs`'s `Socket`: state tracked in
//! a handful of small locks, blocking calls implemented as
//! `Notify`-gated loops rather than futures stored on the struct. The
//! client-side three-way handshake and the stop-and-wait sender both live
//! here since both are things a socket *does*, not things the protocol does
//! to a socket — the protocol (`Rdt::input`) only ever routes segments to
//! the right socket and drives the server side of the handshake.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::{Arc, RwLock, Weak};

use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::time::timeout;

use crate::addr::{Endpoint, Endpoints};
use crate::error::SocketError;
use crate::message::Message;
use crate::rdt::segment::{Segment, FLAG_ACK, FLAG_SYN};
use crate::rdt::Rdt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SocketState {
    Closed,
    Bound,
    Listening,
    Connecting,
    Connected,
}

/// One endpoint of an RDT connection, or a not-yet-connected socket that
/// may still become one.
///
/// Sockets always live behind an `Arc`: the protocol's tables, a listening
/// socket's accept queue, and the application all hold references to the
/// same instance.
pub struct Socket {
    rdt: Arc<Rdt>,
    state: RwLock<SocketState>,
    local: RwLock<Option<Endpoint>>,
    remote: RwLock<Option<Endpoint>>,

    /// The listening socket this one was spawned from, while it is still
    /// completing its handshake or living in a listener's accept queue.
    /// A weak handle: the listener owns its children only through the
    /// accept queue, never the other way around.
    pub(crate) parent: RwLock<Option<Weak<Socket>>>,

    pub(crate) send_seq: RwLock<u8>,
    pub(crate) expected_recv: RwLock<u8>,

    /// Handshake and pure-ACK segments land here for whichever method
    /// (`connect` or `send`) is currently waiting on them.
    segment_tx: mpsc::UnboundedSender<Segment>,
    segment_rx: AsyncMutex<mpsc::UnboundedReceiver<Segment>>,

    /// Signalled once when a server-side child's handshake completes, so
    /// its retransmit worker can stop.
    pub(crate) handshake_done: Notify,

    recv_buffer: std::sync::Mutex<Message>,
    recv_notify: Notify,

    accept_queue: std::sync::Mutex<VecDeque<Arc<Socket>>>,
    accept_notify: Notify,
}

impl Socket {
    pub(crate) fn new(rdt: Arc<Rdt>) -> Arc<Self> {
        let (segment_tx, segment_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            rdt,
            state: RwLock::new(SocketState::Closed),
            local: RwLock::new(None),
            remote: RwLock::new(None),
            parent: RwLock::new(None),
            send_seq: RwLock::new(0),
            expected_recv: RwLock::new(0),
            segment_tx,
            segment_rx: AsyncMutex::new(segment_rx),
            handshake_done: Notify::new(),
            recv_buffer: std::sync::Mutex::new(Message::new(Vec::new())),
            recv_notify: Notify::new(),
            accept_queue: std::sync::Mutex::new(VecDeque::new()),
            accept_notify: Notify::new(),
        })
    }

    /// Constructs a server-side child socket, already addressed and already
    /// mid-handshake, on behalf of the demultiplexer.
    pub(crate) fn new_child(rdt: Arc<Rdt>, endpoints: Endpoints, listener: &Arc<Socket>) -> Arc<Self> {
        let child = Self::new(rdt);
        *child.local.write().unwrap() = Some(endpoints.local);
        *child.remote.write().unwrap() = Some(endpoints.remote);
        *child.state.write().unwrap() = SocketState::Connecting;
        *child.parent.write().unwrap() = Some(Arc::downgrade(listener));
        child
    }

    /// This socket's local address, once bound or connected.
    pub fn local(&self) -> Option<Endpoint> {
        *self.local.read().unwrap()
    }

    /// This socket's peer address, once connected or accepted.
    pub fn remote(&self) -> Option<Endpoint> {
        *self.remote.read().unwrap()
    }

    pub(crate) fn state(&self) -> SocketState {
        *self.state.read().unwrap()
    }

    pub(crate) fn set_state(&self, state: SocketState) {
        *self.state.write().unwrap() = state;
    }

    pub(crate) fn endpoints(&self) -> Option<Endpoints> {
        Some(Endpoints::new(self.local()?, self.remote()?))
    }

    /// Delivers a handshake/ack segment to whichever call is waiting on it.
    /// Silently dropped if nothing is currently receiving (the channel is
    /// unbounded and has no listener only in the window right after a
    /// socket is constructed, before `connect`/`send` are called).
    pub(crate) fn offer_segment(&self, segment: Segment) {
        let _ = self.segment_tx.send(segment);
    }

    /// Delivers application data in sequence order, waking any pending
    /// `recv`.
    pub(crate) fn deliver(&self, payload: &[u8]) {
        self.recv_buffer.lock().unwrap().concatenate(Message::new(payload.to_vec()));
        self.recv_notify.notify_one();
    }

    /// Pushes a freshly-handshaken child onto this listening socket's
    /// accept queue and wakes a waiting `accept`.
    pub(crate) fn enqueue_accepted(&self, child: Arc<Socket>) {
        self.accept_queue.lock().unwrap().push_back(child);
        self.accept_notify.notify_one();
    }

    /// Binds to a specific local port.
    pub fn bind(self: &Arc<Self>, address: Ipv4Addr, port: u16) -> Result<(), SocketError> {
        let mut state = self.state.write().unwrap();
        match *state {
            SocketState::Closed => {}
            SocketState::Connecting | SocketState::Connected | SocketState::Listening => {
                return Err(SocketError::AlreadyConnected)
            }
            SocketState::Bound => return Err(SocketError::AddressInUse),
        }
        self.rdt.bind_port(port, self.clone())?;
        *self.local.write().unwrap() = Some(Endpoint::new(address, port));
        *state = SocketState::Bound;
        Ok(())
    }

    /// Marks this bound socket as a listener, accepting inbound connections
    /// on its local port.
    pub fn listen(self: &Arc<Self>) -> Result<(), SocketError> {
        let mut state = self.state.write().unwrap();
        match *state {
            SocketState::Bound => {}
            SocketState::Closed => return Err(SocketError::NotBound),
            SocketState::Connecting | SocketState::Connected | SocketState::Listening => {
                return Err(SocketError::AlreadyConnected)
            }
        }
        let port = self.local().expect("bound socket always has a local endpoint").port;
        self.rdt.start_listening(port, self.clone())?;
        *state = SocketState::Listening;
        Ok(())
    }

    /// Waits for and returns the next completed inbound connection.
    pub async fn accept(self: &Arc<Self>) -> Result<(Arc<Socket>, Endpoint), SocketError> {
        if self.state() != SocketState::Listening {
            return Err(SocketError::NotListening);
        }
        loop {
            if let Some(child) = self.accept_queue.lock().unwrap().pop_front() {
                let remote = child.remote().expect("accepted child is always addressed");
                return Ok((child, remote));
            }
            self.accept_notify.notified().await;
        }
    }

    /// Performs the client side of the three-way handshake against
    /// `(remote_addr, remote_port)`, blocking until the connection is
    /// established.
    pub async fn connect(self: &Arc<Self>, remote_addr: Ipv4Addr, remote_port: u16) -> Result<(), SocketError> {
        match self.state() {
            SocketState::Connected => return Err(SocketError::AlreadyConnected),
            SocketState::Listening => return Err(SocketError::AlreadyListening),
            SocketState::Connecting => return Err(SocketError::AlreadyConnected),
            SocketState::Closed | SocketState::Bound => {}
        }

        if self.local().is_none() {
            let port = self.rdt.alloc_ephemeral_port(self.clone())?;
            *self.local.write().unwrap() = Some(Endpoint::new(self.rdt.local_ip(), port));
        }
        let local = self.local().unwrap();
        let remote = Endpoint::new(remote_addr, remote_port);
        let endpoints = Endpoints::new(local, remote);

        *self.remote.write().unwrap() = Some(remote);
        *self.send_seq.write().unwrap() = 0;
        self.set_state(SocketState::Connecting);
        self.rdt.begin_half_open(endpoints, self.clone());

        let syn = Segment::new(local.port, remote.port, 0, 0, FLAG_SYN, Vec::new());
        let syn_bytes = syn.encode();

        let timeout_dur = self.rdt.retransmit_timeout();
        let mut rx = self.segment_rx.lock().await;
        let syn_ack = loop {
            self.rdt.tx(&syn_bytes, remote.address);
            let found = loop {
                match timeout(timeout_dur, rx.recv()).await {
                    Ok(Some(seg)) if seg.is_syn_ack() => break Some(seg),
                    Ok(Some(_)) => continue,
                    Ok(None) => break None,
                    Err(_elapsed) => break None,
                }
            };
            if let Some(seg) = found {
                break seg;
            }
        };
        drop(rx);

        let peer_seq = syn_ack.seq;
        *self.expected_recv.write().unwrap() = (peer_seq as u8) ^ 1;
        *self.send_seq.write().unwrap() = 1;

        self.rdt.complete_client_handshake(endpoints);
        self.set_state(SocketState::Connected);

        let ack = Segment::new(
            local.port,
            remote.port,
            1,
            ((peer_seq as u8) ^ 1) as u32,
            FLAG_ACK,
            Vec::new(),
        );
        self.rdt.tx(&ack.encode(), remote.address);

        Ok(())
    }

    /// Sends `payload` reliably, blocking until it is acknowledged.
    ///
    /// `payload` must fit in the segment's 16-bit `data_len` field; anything
    /// longer is refused rather than silently truncated onto the wire.
    pub async fn send(self: &Arc<Self>, payload: &[u8]) -> Result<(), SocketError> {
        if self.state() != SocketState::Connected {
            return Err(SocketError::NotConnected);
        }
        if payload.len() > u16::MAX as usize {
            return Err(SocketError::PayloadTooLarge);
        }
        let local = self.local().expect("connected socket is addressed");
        let remote = self.remote().expect("connected socket is addressed");
        let seq = *self.send_seq.read().unwrap();

        let segment = Segment::new(local.port, remote.port, seq as u32, 0, 0, payload.to_vec());
        let bytes = segment.encode();

        let expected_ack = seq ^ 1;
        let timeout_dur = self.rdt.retransmit_timeout();
        let mut rx = self.segment_rx.lock().await;
        loop {
            self.rdt.tx(&bytes, remote.address);
            let acked = loop {
                match timeout(timeout_dur, rx.recv()).await {
                    Ok(Some(seg)) if seg.is_ack() && (seg.ack as u8) == expected_ack => break true,
                    Ok(Some(_)) => continue,
                    Ok(None) => break false,
                    Err(_elapsed) => break false,
                }
            };
            if acked {
                break;
            }
        }
        drop(rx);

        *self.send_seq.write().unwrap() = seq ^ 1;
        Ok(())
    }

    /// Reads up to `max_len` bytes (or all buffered bytes, if `max_len` is
    /// `None`), blocking until at least one byte is available.
    pub async fn recv(self: &Arc<Self>, max_len: Option<usize>) -> Result<Vec<u8>, SocketError> {
        if self.state() != SocketState::Connected {
            return Err(SocketError::NotConnected);
        }
        loop {
            {
                let mut buffer = self.recv_buffer.lock().unwrap();
                if !buffer.is_empty() {
                    let take = max_len.unwrap_or(buffer.len()).min(buffer.len());
                    return Ok(buffer.cut(take).to_vec());
                }
            }
            self.recv_notify.notified().await;
        }
    }

    /// Handles an in-sequence or duplicate data segment arriving for this
    /// established connection, acknowledging it either way. Called
    /// synchronously from the demultiplexer.
    pub(crate) fn handle_data(self: &Arc<Self>, seq: u32, payload: &[u8]) {
        let local = self.local().expect("established socket is addressed");
        let remote = self.remote().expect("established socket is addressed");
        let mut expected = self.expected_recv.write().unwrap();
        let seq = (seq & 0xff) as u8;

        let ack_number = if seq == *expected {
            self.deliver(payload);
            let delivered = *expected;
            *expected ^= 1;
            delivered ^ 1
        } else {
            // Duplicate of the last segment we already delivered; don't
            // deliver it again, just re-acknowledge what we actually have.
            *expected
        };
        drop(expected);

        let ack = Segment::new(local.port, remote.port, 0, ack_number as u32, FLAG_ACK, Vec::new());
        self.rdt.tx(&ack.encode(), remote.address);
    }
}
