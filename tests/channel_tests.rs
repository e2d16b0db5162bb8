// edgert: Integration tests for the channel layer
// These exercise real POSIX message queues; names are suffixed with the test
// process id so parallel runs cannot collide on kernel objects.

use edgert::{Channel, ChannelState, RtError, MAX_PAYLOAD};

fn unique(name: &str) -> String {
    format!("{}{}", name, std::process::id())
}

#[test]
fn test_framing_preserves_boundaries_and_bytes() {
    let name = unique("FrameT");
    let mut server = Channel::create(&name).unwrap();
    let mut client = Channel::connect(&name).unwrap();

    for (i, size) in [8usize, 100, MAX_PAYLOAD].into_iter().enumerate() {
        let payload: Vec<u8> = (0..size).map(|j| (i + j) as u8).collect();
        client.send(&payload).unwrap();

        let mut buf = vec![0u8; MAX_PAYLOAD];
        let received = server.receive(&mut buf).unwrap();
        assert_eq!(received, size, "message boundary lost");
        assert_eq!(&buf[..received], &payload[..], "payload corrupted");
    }
}

#[test]
fn test_oversized_send_rejected() {
    let name = unique("BigT");
    let _server = Channel::create(&name).unwrap();
    let mut client = Channel::connect(&name).unwrap();

    let too_big = vec![0u8; MAX_PAYLOAD + 1];
    assert!(matches!(
        client.send(&too_big),
        Err(RtError::TooLarge { len, max }) if len == MAX_PAYLOAD + 1 && max == MAX_PAYLOAD
    ));
    // The channel is still usable after the rejection
    client.send(&[1, 2, 3]).unwrap();
}

#[test]
fn test_connect_absent_channel_is_not_found() {
    assert!(matches!(
        Channel::connect(&unique("Ghost")),
        Err(RtError::NotFound(_))
    ));
}

#[test]
fn test_server_cleanup_unlinks_transport() {
    let name = unique("LifeT");
    let mut server = Channel::create(&name).unwrap();
    let mut client = Channel::connect(&name).unwrap();

    client.send(b"ping").unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(server.receive(&mut buf).unwrap(), 4);
    assert_eq!(&buf[..4], b"ping");

    server.cleanup();
    assert_eq!(server.state(), ChannelState::Closed);

    // The kernel object is gone: a late client finds nothing
    assert!(matches!(
        Channel::connect(&name),
        Err(RtError::NotFound(_))
    ));

    // A fresh create under the same name succeeds
    let again = Channel::create(&name).unwrap();
    drop(again);
}

#[test]
fn test_cleanup_is_idempotent_and_fast_fails() {
    let name = unique("IdemT");
    let mut server = Channel::create(&name).unwrap();

    server.cleanup();
    server.cleanup();
    assert_eq!(server.state(), ChannelState::Closed);
    assert!(!server.is_ready());

    let mut buf = [0u8; 8];
    assert!(matches!(
        server.receive(&mut buf),
        Err(RtError::BrokenChannel(_))
    ));
}

#[test]
fn test_nonblocking_receive_on_empty_queue() {
    let name = unique("NbT");
    let mut server = Channel::create(&name).unwrap();
    server.set_nonblocking(true).unwrap();

    let mut buf = [0u8; 8];
    assert!(matches!(server.receive(&mut buf), Err(RtError::WouldBlock)));
}

#[test]
fn test_nonblocking_send_observes_queue_depth() {
    let name = unique("DepthT");
    let mut server = Channel::create(&name).unwrap();
    let mut client = Channel::connect(&name).unwrap();
    client.set_nonblocking(true).unwrap();

    for i in 0..edgert::QUEUE_DEPTH {
        client.send(&[i as u8; 8]).unwrap();
    }
    assert!(matches!(client.send(&[0u8; 8]), Err(RtError::WouldBlock)));

    // Draining one slot makes room again
    let mut buf = [0u8; 8];
    server.receive(&mut buf).unwrap();
    client.send(&[9u8; 8]).unwrap();
}

#[test]
fn test_fifo_delivery_order() {
    let name = unique("OrderT");
    let mut server = Channel::create(&name).unwrap();
    let mut client = Channel::connect(&name).unwrap();

    for i in 0u8..5 {
        client.send(&[i, i, i]).unwrap();
    }
    for i in 0u8..5 {
        let mut buf = [0u8; 8];
        let n = server.receive(&mut buf).unwrap();
        assert_eq!((n, buf[0]), (3, i));
    }
}
