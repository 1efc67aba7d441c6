//! The simulated lossy, corrupting packet substrate that hosts attach to.
//!
//! Grounded on `original_source/network.py`'s `Network` class: independent
//! per-send trials for loss and corruption, a single uniformly-random byte
//! flipped on a corrupted send, and a silent drop when the destination IP
//! isn't attached. A `network.rs`/`Attachment`-style channel idiom inspires
//! the attach-by-IP bookkeeping, but delivery here is a direct host-to-host
//! call (spawned onto its own task) rather than a generic `Sender<Delivery>`
//! channel, since a [`Substrate`] only ever forwards to one other [`Host`]
//! per send.

use std::net::Ipv4Addr;
use std::sync::Arc;

use rand::Rng;

use crate::error::AttachError;
use crate::host::Host;
use crate::FxDashMap;

/// A simulated IPv4 packet network connecting a fixed set of [`Host`]s.
///
/// Every send independently rolls for loss and, if not lost, for
/// corruption. Both probabilities are constant for the lifetime of the
/// substrate.
pub struct Substrate {
    hosts: FxDashMap<Ipv4Addr, Arc<Host>>,
    loss: f64,
    per: f64,
}

impl Substrate {
    /// Creates a substrate with the given loss probability and per-byte
    /// corruption probability, each in `[0.0, 1.0]`.
    pub fn new(loss: f64, per: f64) -> Arc<Self> {
        Arc::new(Self {
            hosts: FxDashMap::default(),
            loss,
            per,
        })
    }

    /// Attaches `host` at `ip`. Fails if another host already occupies that
    /// address.
    pub fn attach(&self, host: Arc<Host>, ip: Ipv4Addr) -> Result<(), AttachError> {
        match self.hosts.entry(ip) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(AttachError::AddressInUse(ip)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(host);
                Ok(())
            }
        }
    }

    /// Transmits `bytes` for protocol `proto_id` from `src` to `dst`.
    ///
    /// Loss and corruption are each decided by an independent Bernoulli
    /// trial on this call. A lost segment never reaches `dst`; an unknown
    /// `dst` is a silent drop either way. Delivery, when it happens, runs on
    /// its own task so a long chain of sends (e.g. a SYN immediately
    /// answered by a SYN-ACK) doesn't recurse through the caller's stack.
    pub fn tx(&self, proto_id: u8, bytes: &[u8], src: Ipv4Addr, dst: Ipv4Addr) {
        let mut rng = rand::thread_rng();
        if rng.gen_bool(self.loss) {
            tracing::trace!(target: "rdt::substrate", %src, %dst, proto_id, "segment lost");
            return;
        }

        let mut bytes = bytes.to_vec();
        if !bytes.is_empty() && rng.gen_bool(self.per) {
            let pos = rng.gen_range(0..bytes.len());
            let value = rng.gen::<u8>();
            tracing::trace!(target: "rdt::substrate", %src, %dst, proto_id, pos, "segment corrupted");
            bytes[pos] = value;
        }

        match self.hosts.get(&dst) {
            Some(host) => {
                let host = host.clone();
                tokio::spawn(async move {
                    host.input(proto_id, &bytes, src);
                });
            }
            None => {
                tracing::trace!(target: "rdt::substrate", %src, %dst, proto_id, "no host at destination");
            }
        }
    }
}
