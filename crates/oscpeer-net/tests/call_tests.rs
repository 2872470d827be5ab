//! Call semantics: success, timeout, supersede, validation.

use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::{Duration, Instant};

use oscpeer_core::{ArgKind, MessageSchema, Validate};
use oscpeer_net::{CallError, CallHandler, OscVersion, Peer, TransportMode};
use rosc::{OscMessage, OscPacket, OscType};

fn free_udp_addr() -> SocketAddr {
    UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap()
}

fn udp_pair() -> (Peer, Peer) {
    let b_addr = free_udp_addr();
    let a = Peer::builder(b_addr)
        .mode(TransportMode::Udp)
        .version(OscVersion::Osc11)
        .bind("127.0.0.1:0".parse().unwrap())
        .poll_interval(Duration::from_millis(20))
        .build()
        .unwrap();
    let b = Peer::builder(a.local_addr().unwrap())
        .mode(TransportMode::Udp)
        .version(OscVersion::Osc11)
        .bind(b_addr)
        .poll_interval(Duration::from_millis(20))
        .build()
        .unwrap();
    (a, b)
}

/// A peer whose outgoing messages land nowhere; replies are injected by
/// dispatching directly.
fn lone_peer() -> Peer {
    Peer::builder(free_udp_addr())
        .mode(TransportMode::Udp)
        .version(OscVersion::Osc11)
        .bind("127.0.0.1:0".parse().unwrap())
        .build()
        .unwrap()
}

fn msg(addr: &str, args: Vec<OscType>) -> OscMessage {
    OscMessage {
        addr: addr.to_string(),
        args,
    }
}

#[test]
fn call_success_over_udp() {
    let (a, b) = udp_pair();

    let replier = b.clone();
    b.dispatcher()
        .add_handler("/ping", move |_| {
            replier
                .send_to_addr("/pong", vec![OscType::String("pong!".to_string())])
                .unwrap();
        })
        .unwrap();

    let calls = CallHandler::new(&a);
    a.start_listening().unwrap();
    b.start_listening().unwrap();

    let reply = calls
        .call(msg("/ping", vec![]), "/pong", Duration::from_secs(1), None)
        .unwrap()
        .expect("reply within the timeout");
    assert_eq!(reply.addr, "/pong");
    assert_eq!(reply.args, vec![OscType::String("pong!".to_string())]);
    assert_eq!(calls.pending(), 0);

    a.stop_listening().unwrap();
    b.stop_listening().unwrap();
}

#[test]
fn call_timeout_when_nobody_replies() {
    let (a, b) = udp_pair();
    let calls = CallHandler::new(&a);
    a.start_listening().unwrap();
    b.start_listening().unwrap();

    let started = Instant::now();
    let reply = calls
        .call(msg("/ping", vec![]), "/pong", Duration::from_secs(1), None)
        .unwrap();
    let elapsed = started.elapsed();

    assert!(reply.is_none());
    assert!(elapsed >= Duration::from_millis(900), "returned too early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1500), "returned too late: {elapsed:?}");
    assert_eq!(calls.pending(), 0);

    a.stop_listening().unwrap();
    b.stop_listening().unwrap();
}

#[test]
fn call_rejects_invalid_reply() {
    let peer = lone_peer();
    let calls = Arc::new(CallHandler::new(&peer));

    let caller = calls.clone();
    let waiting = std::thread::spawn(move || {
        let int_reply: Arc<dyn Validate> = Arc::new(MessageSchema::new().arg(ArgKind::Int));
        caller.call(
            msg("/req", vec![]),
            "/pong",
            Duration::from_secs(2),
            Some(int_reply),
        )
    });

    std::thread::sleep(Duration::from_millis(100));
    peer.dispatcher().dispatch(OscPacket::Message(msg(
        "/pong",
        vec![OscType::String("not an int".to_string())],
    )));

    let outcome = waiting.join().unwrap();
    assert!(matches!(outcome, Err(CallError::Validation(_))));
    assert_eq!(calls.pending(), 0);
}

#[test]
fn newer_call_supersedes_same_return_address() {
    let peer = lone_peer();
    let calls = Arc::new(CallHandler::new(&peer));

    let first_caller = calls.clone();
    let first = std::thread::spawn(move || {
        first_caller.call(msg("/req", vec![]), "/pong", Duration::from_secs(2), None)
    });
    std::thread::sleep(Duration::from_millis(100));

    let second_caller = calls.clone();
    let second = std::thread::spawn(move || {
        second_caller.call(msg("/req", vec![]), "/pong", Duration::from_secs(2), None)
    });
    std::thread::sleep(Duration::from_millis(100));

    peer.dispatcher()
        .dispatch(OscPacket::Message(msg("/pong", vec![OscType::Int(2)])));

    assert!(matches!(first.join().unwrap(), Err(CallError::Superseded)));
    let reply = second.join().unwrap().unwrap().expect("reply");
    assert_eq!(reply.args, vec![OscType::Int(2)]);
}

#[test]
fn calls_on_distinct_return_addresses_are_concurrent() {
    let peer = lone_peer();
    let calls = Arc::new(CallHandler::new(&peer));

    let spawn_call = |addr: &'static str| {
        let caller = calls.clone();
        std::thread::spawn(move || {
            caller.call(msg("/req", vec![]), addr, Duration::from_secs(2), None)
        })
    };
    let one = spawn_call("/reply/one");
    let two = spawn_call("/reply/two");
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(calls.pending(), 2);

    let dispatcher = peer.dispatcher();
    dispatcher.dispatch(OscPacket::Message(msg("/reply/two", vec![OscType::Int(2)])));
    dispatcher.dispatch(OscPacket::Message(msg("/reply/one", vec![OscType::Int(1)])));

    let one = one.join().unwrap().unwrap().expect("reply one");
    let two = two.join().unwrap().unwrap().expect("reply two");
    assert_eq!(one.args, vec![OscType::Int(1)]);
    assert_eq!(two.args, vec![OscType::Int(2)]);
}

#[test]
fn stray_reply_is_dropped() {
    let peer = lone_peer();
    let calls = CallHandler::new(&peer);

    // no pending call: the message is dropped, nothing breaks
    peer.dispatcher()
        .dispatch(OscPacket::Message(msg("/pong", vec![])));
    assert_eq!(calls.pending(), 0);

    let reply = calls
        .call(msg("/req", vec![]), "/pong", Duration::from_millis(200), None)
        .unwrap();
    assert!(reply.is_none());
}

#[test]
fn fan_in_attached_to_a_pattern() {
    let peer = lone_peer();
    let calls = Arc::new(CallHandler::attach(&peer, "/replies/*").unwrap());

    let caller = calls.clone();
    let waiting = std::thread::spawn(move || {
        caller.call(
            msg("/req", vec![]),
            "/replies/7",
            Duration::from_secs(2),
            None,
        )
    });
    std::thread::sleep(Duration::from_millis(100));

    peer.dispatcher()
        .dispatch(OscPacket::Message(msg("/replies/7", vec![OscType::Int(7)])));

    let reply = waiting.join().unwrap().unwrap().expect("reply");
    assert_eq!(reply.args, vec![OscType::Int(7)]);
}
