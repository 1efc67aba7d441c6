//! The Sample Datagram Protocol: a minimal, deliberately useless protocol
//! that demonstrates the [`Protocol`] contract without doing any real
//! demultiplexing.
//!
//! Grounded directly on `original_source/sdp.py`: every inbound datagram is
//! broadcast to every socket ever created on this protocol instance, with
//! no routing by address or port at all. The Python original documents
//! this as "of no practical use" beyond showing the shape of a protocol —
//! kept here unchanged for the same reason.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Notify;

use crate::host::{Host, Protocol};
use crate::message::Message;

/// The wire protocol number SDP registers under.
pub const PROTO_ID: u8 = 0xFD;

/// The SDP protocol instance attached to one [`Host`].
pub struct Sdp {
    host: Weak<Host>,
    sockets: Mutex<Vec<Arc<SdpSocket>>>,
}

impl Sdp {
    pub fn new(host: Weak<Host>) -> Arc<Self> {
        Arc::new(Self {
            host,
            sockets: Mutex::new(Vec::new()),
        })
    }

    fn host(&self) -> Arc<Host> {
        self.host.upgrade().expect("host outlives its registered protocols")
    }

    /// Creates a new socket on this protocol instance. Every datagram this
    /// protocol receives, regardless of origin, is handed to every socket
    /// created this way.
    pub fn new_socket(self: &Arc<Self>) -> Arc<SdpSocket> {
        let socket = SdpSocket::new(self.clone());
        self.sockets.lock().unwrap().push(socket.clone());
        socket
    }
}

impl Protocol for Sdp {
    fn id(&self) -> u8 {
        PROTO_ID
    }

    fn input(&self, bytes: &[u8], src_ip: Ipv4Addr) {
        let sockets = self.sockets.lock().unwrap().clone();
        for socket in sockets {
            socket.deliver(bytes, src_ip);
        }
    }
}

/// A socket on the Sample Datagram Protocol. Every `recvfrom` returns
/// whatever this protocol instance received earliest and hasn't yet handed
/// out, from anywhere, addressed to anyone.
pub struct SdpSocket {
    proto: Arc<Sdp>,
    inbox: Mutex<VecDeque<(Message, Ipv4Addr)>>,
    notify: Notify,
}

impl SdpSocket {
    fn new(proto: Arc<Sdp>) -> Arc<Self> {
        Arc::new(Self {
            proto,
            inbox: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        })
    }

    fn deliver(&self, bytes: &[u8], src_ip: Ipv4Addr) {
        self.inbox.lock().unwrap().push_back((Message::new(bytes.to_vec()), src_ip));
        self.notify.notify_one();
    }

    /// Sends `payload` to `dst`, unacknowledged and unreliable, with no
    /// header at all.
    pub fn send_to(&self, payload: &[u8], dst: Ipv4Addr) {
        self.proto.host().output(PROTO_ID, payload, dst);
    }

    /// Blocks until a datagram has arrived, then returns it along with the
    /// address it came from, in the order it was received.
    pub async fn recv_from(&self) -> (Vec<u8>, Ipv4Addr) {
        loop {
            if let Some((msg, src)) = self.inbox.lock().unwrap().pop_front() {
                return (msg.to_vec(), src);
            }
            self.notify.notified().await;
        }
    }
}
