//! Multiple simultaneous connections sharing one host, covering the shapes
//! of `test_rdt.py`'s `A3_Lossless_1x2` (one client, two different
//! listening hosts), `A5_Lossless_2x1` (two different clients, one
//! listening host), and `A7_Lossless_ManyConns` (many connections across
//! many ports).

mod common;

use std::net::Ipv4Addr;

use rdt::Substrate;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_client_two_listening_hosts_do_not_interfere() {
    let substrate = Substrate::new(0.0, 0.0);
    let client_ip = Ipv4Addr::new(10, 0, 1, 1);
    let server_a_ip = Ipv4Addr::new(10, 0, 1, 2);
    let server_b_ip = Ipv4Addr::new(10, 0, 1, 3);

    let (_h, client_rdt) = common::host_with_rdt(&substrate, client_ip);
    let (_h, server_a_rdt) = common::host_with_rdt(&substrate, server_a_ip);
    let (_h, server_b_rdt) = common::host_with_rdt(&substrate, server_b_ip);

    let listener_a = server_a_rdt.new_socket();
    listener_a.bind(server_a_ip, 8000).unwrap();
    listener_a.listen().unwrap();
    let listener_b = server_b_rdt.new_socket();
    listener_b.bind(server_b_ip, 8000).unwrap();
    listener_b.listen().unwrap();

    let accept_a = tokio::spawn({
        let listener_a = listener_a.clone();
        async move { listener_a.accept().await.unwrap() }
    });
    let accept_b = tokio::spawn({
        let listener_b = listener_b.clone();
        async move { listener_b.accept().await.unwrap() }
    });

    let client_a = client_rdt.new_socket();
    client_a.connect(server_a_ip, 8000).await.unwrap();
    let client_b = client_rdt.new_socket();
    client_b.connect(server_b_ip, 8000).await.unwrap();

    let (server_side_a, _) = accept_a.await.unwrap();
    let (server_side_b, _) = accept_b.await.unwrap();

    client_a.send(b"to a").await.unwrap();
    client_b.send(b"to b").await.unwrap();

    assert_eq!(server_side_a.recv(None).await.unwrap(), b"to a");
    assert_eq!(server_side_b.recv(None).await.unwrap(), b"to b");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_clients_one_listening_host_do_not_interfere() {
    let substrate = Substrate::new(0.0, 0.0);
    let client_a_ip = Ipv4Addr::new(10, 0, 2, 1);
    let client_b_ip = Ipv4Addr::new(10, 0, 2, 2);
    let server_ip = Ipv4Addr::new(10, 0, 2, 3);

    let (_h, client_a_rdt) = common::host_with_rdt(&substrate, client_a_ip);
    let (_h, client_b_rdt) = common::host_with_rdt(&substrate, client_b_ip);
    let (_h, server_rdt) = common::host_with_rdt(&substrate, server_ip);

    let listener = server_rdt.new_socket();
    listener.bind(server_ip, 8100).unwrap();
    listener.listen().unwrap();

    let client_a = client_a_rdt.new_socket();
    client_a.connect(server_ip, 8100).await.unwrap();
    let (server_side_a, remote_a) = listener.accept().await.unwrap();
    assert_eq!(remote_a.address, client_a_ip);

    let client_b = client_b_rdt.new_socket();
    client_b.connect(server_ip, 8100).await.unwrap();
    let (server_side_b, remote_b) = listener.accept().await.unwrap();
    assert_eq!(remote_b.address, client_b_ip);

    client_a.send(b"from a").await.unwrap();
    client_b.send(b"from b").await.unwrap();
    server_side_a.send(b"to a").await.unwrap();
    server_side_b.send(b"to b").await.unwrap();

    assert_eq!(server_side_a.recv(None).await.unwrap(), b"from a");
    assert_eq!(server_side_b.recv(None).await.unwrap(), b"from b");
    assert_eq!(client_a.recv(None).await.unwrap(), b"to a");
    assert_eq!(client_b.recv(None).await.unwrap(), b"to b");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_connections_across_many_ports() {
    let substrate = Substrate::new(0.0, 0.0);
    let client_ip = Ipv4Addr::new(10, 0, 3, 1);
    let server_ip = Ipv4Addr::new(10, 0, 3, 2);
    let (_h, client_rdt) = common::host_with_rdt(&substrate, client_ip);
    let (_h, server_rdt) = common::host_with_rdt(&substrate, server_ip);

    const PORTS: u16 = 10;
    const CONNS_PER_PORT: u16 = 5;

    let mut listeners = Vec::new();
    for i in 0..PORTS {
        let listener = server_rdt.new_socket();
        listener.bind(server_ip, 9100 + i).unwrap();
        listener.listen().unwrap();
        listeners.push(listener);
    }

    // Establish and immediately exercise each connection in lockstep, so
    // a listening port's accept queue never holds more than the one
    // connection under test — this isolates "many ports, many conns"
    // multiplexing from any assumption about cross-connection ordering.
    let mut counter = 0u8;
    for (port_index, listener) in listeners.iter().enumerate() {
        for _ in 0..CONNS_PER_PORT {
            let accept_task = {
                let listener = listener.clone();
                tokio::spawn(async move { listener.accept().await.unwrap() })
            };

            let client = client_rdt.new_socket();
            client.connect(server_ip, 9100 + port_index as u16).await.unwrap();

            let (server_side, _remote) = accept_task.await.unwrap();
            let payload = [counter];
            counter = counter.wrapping_add(1);
            client.send(&payload).await.unwrap();
            assert_eq!(server_side.recv(None).await.unwrap(), payload);
        }
    }
}
