//! Connection setup and lossless data transfer, covering the shapes of
//! `test_rdt.py`'s `A1_Lossless_1x1` (basic oneway/twoway transfer) and
//! `A2_Lossless_SameHost` (both sockets on one host).

mod common;

use common::lossless_pair;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn connect_then_send_one_message() {
    let (client_rdt, server_rdt, _client_ip, server_ip) = lossless_pair();

    let listener = server_rdt.new_socket();
    listener.bind(server_ip, 9000).unwrap();
    listener.listen().unwrap();

    let accept_task = tokio::spawn({
        let listener = listener.clone();
        async move { listener.accept().await.unwrap() }
    });

    let client = client_rdt.new_socket();
    client.connect(server_ip, 9000).await.unwrap();

    let (server_side, remote) = accept_task.await.unwrap();
    assert_eq!(remote.address, client.local().unwrap().address);
    assert_eq!(remote.port, client.local().unwrap().port);

    client.send(b"hello, world").await.unwrap();
    let received = server_side.recv(None).await.unwrap();
    assert_eq!(received, b"hello, world");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn connect_without_explicit_bind_gets_ephemeral_port() {
    let (client_rdt, server_rdt, _client_ip, server_ip) = lossless_pair();

    let listener = server_rdt.new_socket();
    listener.bind(server_ip, 9001).unwrap();
    listener.listen().unwrap();

    let accept_task = tokio::spawn({
        let listener = listener.clone();
        async move { listener.accept().await.unwrap() }
    });

    let client = client_rdt.new_socket();
    client.connect(server_ip, 9001).await.unwrap();
    let local = client.local().unwrap();
    assert!((49152..=65535).contains(&local.port));

    accept_task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bidirectional_transfer() {
    let (client_rdt, server_rdt, _client_ip, server_ip) = lossless_pair();

    let listener = server_rdt.new_socket();
    listener.bind(server_ip, 9002).unwrap();
    listener.listen().unwrap();

    let accept_task = tokio::spawn({
        let listener = listener.clone();
        async move { listener.accept().await.unwrap() }
    });

    let client = client_rdt.new_socket();
    client.connect(server_ip, 9002).await.unwrap();
    let (server_side, _remote) = accept_task.await.unwrap();

    client.send(b"ping").await.unwrap();
    assert_eq!(server_side.recv(None).await.unwrap(), b"ping");

    server_side.send(b"pong").await.unwrap();
    assert_eq!(client.recv(None).await.unwrap(), b"pong");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_sequential_messages_preserve_order() {
    let (client_rdt, server_rdt, _client_ip, server_ip) = lossless_pair();

    let listener = server_rdt.new_socket();
    listener.bind(server_ip, 9003).unwrap();
    listener.listen().unwrap();

    let accept_task = tokio::spawn({
        let listener = listener.clone();
        async move { listener.accept().await.unwrap() }
    });

    let client = client_rdt.new_socket();
    client.connect(server_ip, 9003).await.unwrap();
    let (server_side, _remote) = accept_task.await.unwrap();

    for i in 0u8..50 {
        client.send(&[i]).await.unwrap();
    }

    let mut received = Vec::new();
    while received.len() < 50 {
        received.extend(server_side.recv(None).await.unwrap());
    }
    let expected: Vec<u8> = (0u8..50).collect();
    assert_eq!(received, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn both_sockets_on_same_host() {
    let (client_rdt, server_rdt, _client_ip, server_ip) = lossless_pair();
    // Re-use the server's own Rdt instance for the client side too, so
    // both ends of the connection live on the same simulated host.
    let _ = client_rdt;

    let listener = server_rdt.new_socket();
    listener.bind(server_ip, 9004).unwrap();
    listener.listen().unwrap();

    let accept_task = tokio::spawn({
        let listener = listener.clone();
        async move { listener.accept().await.unwrap() }
    });

    let client = server_rdt.new_socket();
    client.connect(server_ip, 9004).await.unwrap();
    let (server_side, _remote) = accept_task.await.unwrap();

    client.send(b"same host").await.unwrap();
    assert_eq!(server_side.recv(None).await.unwrap(), b"same host");
}
