//! A host: a named endpoint on the substrate that owns a small registry of
//! protocols, each identified by a one-byte protocol number.
//!
//! Grounded on `original_source/network.py`'s `Host` class: a host attaches
//! itself to the network at construction, keeps a `proto_id -> protocol`
//! map, and forwards `input`/`output` calls into it. A `Machine`-style
//! registry (`machine.rs`) is the same idea generalized to an arbitrary set
//! of stacked protocol *types*; a [`Host`] only ever needs a flat map keyed
//! by the wire protocol number, since nothing here stacks protocols on top
//! of one another.

use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::error::RegisterError;
use crate::substrate::Substrate;
use crate::FxDashMap;

/// Something that can receive segments demultiplexed by a [`Host`].
///
/// Implementors keep their own reference to the host (so they can call
/// [`Host::output`] when they need to send) and to their local IP address,
/// both supplied at construction time.
pub trait Protocol: Send + Sync {
    /// The one-byte protocol number this instance is registered under.
    fn id(&self) -> u8;

    /// Handle one inbound segment, addressed from `src_ip`.
    ///
    /// Called synchronously by [`Host::input`]; any work that needs to wait
    /// (a retransmit timer, a blocked `recv`) must be spawned rather than
    /// awaited here.
    fn input(&self, bytes: &[u8], src_ip: Ipv4Addr);
}

/// A single simulated machine attached to a [`Substrate`].
pub struct Host {
    pub ip: Ipv4Addr,
    substrate: Arc<Substrate>,
    protocols: FxDashMap<u8, Arc<dyn Protocol>>,
}

impl Host {
    /// Creates a host and attaches it to `substrate` at `ip`.
    pub fn new(substrate: Arc<Substrate>, ip: Ipv4Addr) -> Result<Arc<Self>, crate::error::AttachError> {
        let host = Arc::new(Self {
            ip,
            substrate: substrate.clone(),
            protocols: FxDashMap::default(),
        });
        substrate.attach(host.clone(), ip)?;
        Ok(host)
    }

    /// Registers a protocol instance under its own [`Protocol::id`].
    ///
    /// Re-registering the same instance (by pointer identity) is a no-op,
    /// mirroring the original's allowance for idempotent re-registration of
    /// the same class. Registering a different instance under an
    /// already-occupied id is a [`RegisterError::Conflict`].
    pub fn register(&self, protocol: Arc<dyn Protocol>) -> Result<(), RegisterError> {
        let id = protocol.id();
        match self.protocols.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                if Arc::ptr_eq(existing.get(), &protocol) {
                    Ok(())
                } else {
                    Err(RegisterError::Conflict(id))
                }
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(protocol);
                Ok(())
            }
        }
    }

    /// Sends `bytes` for protocol `proto_id` out onto the substrate, bound
    /// for `dst`.
    pub fn output(&self, proto_id: u8, bytes: &[u8], dst: Ipv4Addr) {
        self.substrate.tx(proto_id, bytes, self.ip, dst);
    }

    /// Delivers an inbound segment to the registered protocol, if any.
    pub fn input(&self, proto_id: u8, bytes: &[u8], src_ip: Ipv4Addr) {
        match self.protocols.get(&proto_id) {
            Some(protocol) => protocol.input(bytes, src_ip),
            None => tracing::trace!(
                target: "rdt::host",
                proto_id,
                %src_ip,
                "dropped segment for unregistered protocol"
            ),
        }
    }
}
