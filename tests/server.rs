use std::io::ErrorKind;
use std::net::UdpSocket;
use std::time::Duration;

use tftp_relay::packet::{ErrorCode, Packet};
use tftp_relay::Server;

#[test]
fn test_serve_when_request_is_not_read_or_write() {
    let serve_dir = tempfile::tempdir().unwrap();
    let server = Server::bind("127.0.0.1:0", serve_dir.path()).unwrap();
    let serve_addr = server.local_addr().unwrap();

    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();

    let bytes = Packet::error(ErrorCode::FileNotFound, "file not found").encode();
    socket.send_to(&bytes, serve_addr).unwrap();

    let err = server.serve().err().unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    // The sender is told why.
    let mut buf = [0; 516];
    let (len, from) = socket.recv_from(&mut buf).unwrap();
    assert_eq!(from, serve_addr);
    match Packet::decode(&buf[..len]).unwrap() {
        Packet::Error(err) => assert_eq!(err.code, ErrorCode::IllegalOperation),
        other => panic!("expected an error packet, got {}", other),
    }
}

#[test]
fn test_serve_when_datagram_is_malformed() {
    let serve_dir = tempfile::tempdir().unwrap();
    let server = Server::bind("127.0.0.1:0", serve_dir.path()).unwrap();

    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .send_to(&[0, 1, b'n', b'o', b'n', b'u', b'l'], server.local_addr().unwrap())
        .unwrap();

    assert!(server.serve().is_err());
}

#[test]
fn test_bind_requires_directory() {
    let serve_dir = tempfile::tempdir().unwrap();
    let missing = serve_dir.path().join("missing");

    assert!(Server::bind("127.0.0.1:0", &missing).is_err());
}

#[test]
fn test_handler_knows_its_request() {
    let serve_dir = tempfile::tempdir().unwrap();
    let server = Server::bind("127.0.0.1:0", serve_dir.path()).unwrap();

    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let bytes = Packet::rrq("notes.txt", tftp_relay::packet::Mode::Octet).encode();
    socket.send_to(&bytes, server.local_addr().unwrap()).unwrap();

    let handler = server.serve().unwrap();
    assert_eq!(handler.client(), socket.local_addr().unwrap());
    assert_eq!(handler.request().filename, "notes.txt");
}
