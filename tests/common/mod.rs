//! Shared setup for integration tests: wiring a [`Substrate`] and one or
//! more [`Host`]s, each running an [`Rdt`] instance.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use rdt::{Host, Rdt, Substrate};

/// The retransmit timeout used by every test host. Short enough that a
/// lossy test doesn't take long to retry its way to success.
pub const TEST_RETRANSMIT_TIMEOUT: Duration = Duration::from_millis(20);

/// Attaches a new host to `substrate` at `ip` and registers a fresh `Rdt`
/// instance on it.
pub fn host_with_rdt(substrate: &Arc<Substrate>, ip: Ipv4Addr) -> (Arc<Host>, Arc<Rdt>) {
    let host = Host::new(substrate.clone(), ip).expect("address not already attached");
    let rdt = Rdt::new(ip, Arc::downgrade(&host), TEST_RETRANSMIT_TIMEOUT);
    host.register(rdt.clone()).expect("0xFE not already registered");
    (host, rdt)
}

/// Two hosts, each with one `Rdt` instance, on a substrate with the given
/// loss probability and per-byte corruption probability.
pub fn pair(loss: f64, per: f64) -> (Arc<Rdt>, Arc<Rdt>, Ipv4Addr, Ipv4Addr) {
    let substrate = Substrate::new(loss, per);
    let client_ip = Ipv4Addr::new(10, 0, 0, 1);
    let server_ip = Ipv4Addr::new(10, 0, 0, 2);
    let (_client_host, client_rdt) = host_with_rdt(&substrate, client_ip);
    let (_server_host, server_rdt) = host_with_rdt(&substrate, server_ip);
    (client_rdt, server_rdt, client_ip, server_ip)
}

/// A lossless, uncorrupted pair — the common case for correctness tests.
pub fn lossless_pair() -> (Arc<Rdt>, Arc<Rdt>, Ipv4Addr, Ipv4Addr) {
    pair(0.0, 0.0)
}
