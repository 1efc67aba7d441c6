//! A minimal two-host conversation over RDT: a server echoes back whatever
//! the client sends it, once.
//!
//! Run with `cargo run --example ping_pong` once this file is wired up as
//! a Cargo example target (see the crate's `Cargo.toml`).

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use rdt::{Host, Rdt, Substrate};

#[tokio::main]
async fn main() {
    rdt::logging::init_tracing();

    let substrate = Substrate::new(0.0, 0.0);

    let server_ip = Ipv4Addr::new(10, 0, 0, 1);
    let server_host = Host::new(substrate.clone(), server_ip).expect("attach server");
    let server_rdt = Rdt::new(server_ip, Arc::downgrade(&server_host), Duration::from_millis(50));
    server_host.register(server_rdt.clone()).expect("register server rdt");

    let client_ip = Ipv4Addr::new(10, 0, 0, 2);
    let client_host = Host::new(substrate.clone(), client_ip).expect("attach client");
    let client_rdt = Rdt::new(client_ip, Arc::downgrade(&client_host), Duration::from_millis(50));
    client_host.register(client_rdt.clone()).expect("register client rdt");

    let listener = server_rdt.new_socket();
    listener.bind(server_ip, 7).unwrap();
    listener.listen().unwrap();

    let server = tokio::spawn(async move {
        let (connection, _remote) = listener.accept().await.unwrap();
        let request = connection.recv(None).await.unwrap();
        println!("server received: {}", String::from_utf8_lossy(&request));
        connection.send(b"pong").await.unwrap();
    });

    let client = client_rdt.new_socket();
    client.connect(server_ip, 7).await.unwrap();
    client.send(b"ping").await.unwrap();
    let reply = client.recv(None).await.unwrap();
    println!("client received: {}", String::from_utf8_lossy(&reply));

    server.await.unwrap();
}
