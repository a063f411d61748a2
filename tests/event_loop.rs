mod common;

use chorus::Handle;
use chorus::RelayError;
use chorus::net::Transport;
use chorus::reactor::{EventLoop, Exit, StopToken};
use common::{FakeTransport, LISTENER, ScriptedPoller, readable, writable};

use mockall::predicate::eq;
use std::io;

type FakeLoop = EventLoop<FakeTransport, ScriptedPoller>;

fn relay() -> (FakeLoop, FakeTransport, ScriptedPoller, StopToken) {
    let transport = FakeTransport::new();
    let poller = ScriptedPoller::new();
    let stop = StopToken::new().expect("stop token");

    let relay = EventLoop::new(LISTENER, transport.clone(), poller.clone(), stop.clone());

    (relay, transport, poller, stop)
}

/// Accepts each handle in `handles` through the loop, one turn per accept.
fn connect(relay: &mut FakeLoop, transport: &FakeTransport, poller: &ScriptedPoller, handles: &[Handle]) {
    for &handle in handles {
        transport.push_accept(Ok(handle));
        poller.push(vec![readable(LISTENER)]);
        relay.turn().unwrap();
    }
}

#[test]
fn test_accepts_one_connection_per_turn() {
    let (mut relay, transport, poller, _stop) = relay();
    transport.push_accept(Ok(901));
    transport.push_accept(Ok(902));

    poller.push(vec![readable(LISTENER)]);
    relay.turn().unwrap();

    assert_eq!(relay.pool().len(), 1);
    assert!(relay.pool().find(901).is_some());
    assert_eq!(relay.stats().accepted, 1);
}

#[test]
fn test_listener_and_waker_are_always_watched() {
    let (mut relay, _transport, poller, _stop) = relay();

    relay.turn().unwrap();
    let sets = poller.last_sets();

    assert!(sets.is_read_interested(LISTENER));
    assert_eq!(sets.len(), 2, "listener plus stop waker");
}

#[test]
fn test_chunk_reaches_every_other_connection() {
    let (mut relay, transport, poller, _stop) = relay();
    connect(&mut relay, &transport, &poller, &[901, 902, 903]);

    transport.push_read(901, b"hi");
    poller.push(vec![readable(901)]);
    relay.turn().unwrap();

    assert!(relay.pool().find(902).unwrap().is_write_interested());
    assert!(relay.pool().find(903).unwrap().is_write_interested());
    assert!(!relay.pool().find(901).unwrap().is_write_interested());

    poller.push(vec![writable(902), writable(903)]);
    relay.turn().unwrap();

    assert_eq!(transport.wire(902), b"hi");
    assert_eq!(transport.wire(903), b"hi");
    assert_eq!(transport.wire(901), b"");
    assert_eq!(relay.stats().chunks_relayed, 1);
    assert_eq!(relay.stats().bytes_in, 2);
}

#[test]
fn test_write_interest_follows_queue() {
    let (mut relay, transport, poller, _stop) = relay();
    connect(&mut relay, &transport, &poller, &[901, 902]);

    transport.push_read(901, b"x");
    poller.push(vec![readable(901)]);
    relay.turn().unwrap();

    poller.push(vec![writable(902)]);
    relay.turn().unwrap();
    assert!(poller.last_sets().is_write_interested(902));
    assert!(!poller.last_sets().is_write_interested(901));

    relay.turn().unwrap();
    assert!(
        !poller.last_sets().is_write_interested(902),
        "flushed queue drops write interest"
    );
}

#[test]
fn test_peer_close_evicts_and_closes() {
    let (mut relay, transport, poller, _stop) = relay();
    connect(&mut relay, &transport, &poller, &[901, 902]);

    transport.push_read(902, b"");
    poller.push(vec![readable(902)]);
    relay.turn().unwrap();

    assert!(relay.pool().find(902).is_none());
    assert_eq!(transport.closed(), vec![902]);
    assert_eq!(relay.stats().evicted, 1);
}

#[test]
fn test_read_error_evicts() {
    let (mut relay, transport, poller, _stop) = relay();
    connect(&mut relay, &transport, &poller, &[901, 902]);

    transport.push_read(902, b"queued for 901");
    poller.push(vec![readable(902)]);
    relay.turn().unwrap();

    transport.push_read_error(901, io::ErrorKind::ConnectionReset);
    poller.push(vec![readable(901), writable(901)]);
    relay.turn().unwrap();

    assert!(relay.pool().find(901).is_none());
    assert_eq!(transport.closed(), vec![901]);
    assert_eq!(transport.wire(901), b"", "evicted before its write event");
}

#[test]
fn test_spurious_readable_is_ignored() {
    let (mut relay, transport, poller, _stop) = relay();
    connect(&mut relay, &transport, &poller, &[901]);

    poller.push(vec![readable(901)]);
    relay.turn().unwrap();

    assert!(relay.pool().find(901).is_some());
    assert!(transport.closed().is_empty());
}

#[test]
fn test_write_error_evicts() {
    let (mut relay, transport, poller, _stop) = relay();
    connect(&mut relay, &transport, &poller, &[901, 902]);

    transport.push_read(901, b"hi");
    transport.fail_writes(902, io::ErrorKind::BrokenPipe);
    poller.push(vec![readable(901)]);
    relay.turn().unwrap();

    poller.push(vec![writable(902)]);
    relay.turn().unwrap();

    assert!(relay.pool().find(902).is_none());
    assert_eq!(transport.closed(), vec![902]);
}

#[test]
fn test_scenario_three_clients() {
    let (mut relay, transport, poller, _stop) = relay();
    let (a, b, c) = (901, 902, 903);
    connect(&mut relay, &transport, &poller, &[a, b, c]);

    transport.push_read(a, b"hi");
    poller.push(vec![readable(a)]);
    relay.turn().unwrap();
    assert!(relay.pool().find(a).unwrap().outbound().is_empty());

    poller.push(vec![writable(b), writable(c)]);
    relay.turn().unwrap();

    transport.push_read(c, b"");
    poller.push(vec![readable(c)]);
    relay.turn().unwrap();
    assert_eq!(relay.pool().max_handle(), b);

    transport.push_read(b, b"bye");
    poller.push(vec![readable(b)]);
    relay.turn().unwrap();

    poller.push(vec![writable(a)]);
    relay.turn().unwrap();

    assert_eq!(transport.wire(a), b"bye");
    assert_eq!(transport.wire(b), b"hi");
    assert_eq!(transport.wire(c), b"hi");
}

#[test]
fn test_slow_recipient_is_evicted_whole() {
    let (relay, transport, poller, _stop) = relay();
    let mut relay = relay.backlog_limit(3);
    connect(&mut relay, &transport, &poller, &[901, 902, 903]);

    transport.push_read(901, b"abcd");
    poller.push(vec![readable(901)]);
    relay.turn().unwrap();

    assert!(relay.pool().find(902).is_none());
    assert!(relay.pool().find(903).is_none());
    assert_eq!(transport.closed(), vec![902, 903]);
    assert!(relay.pool().find(901).is_some());
}

#[test]
fn test_read_buffer_bounds_chunk_size() {
    let (relay, transport, poller, _stop) = relay();
    let mut relay = relay.read_buffer_size(2);
    connect(&mut relay, &transport, &poller, &[901, 902]);

    transport.push_read(901, b"abcdef");
    poller.push(vec![readable(901)]);
    relay.turn().unwrap();

    assert_eq!(relay.stats().bytes_in, 2);
    assert_eq!(
        relay.pool().find(902).unwrap().outbound().head(),
        Some(&b"ab"[..])
    );
}

#[test]
fn test_transient_accept_error_keeps_running() {
    let (mut relay, transport, poller, stop) = relay();
    transport.push_accept(Err(io::Error::from_raw_os_error(libc::EMFILE)));

    poller.push(vec![readable(LISTENER)]);
    relay.turn().unwrap();

    assert!(!stop.is_requested());
}

#[test]
fn test_descriptor_exhaustion_pauses_listener_until_eviction() {
    let (mut relay, transport, poller, stop) = relay();
    connect(&mut relay, &transport, &poller, &[901]);

    transport.push_accept(Err(io::Error::from_raw_os_error(libc::EMFILE)));
    poller.push(vec![readable(LISTENER)]);
    relay.turn().unwrap();

    relay.turn().unwrap();
    assert!(!poller.last_sets().is_read_interested(LISTENER));
    assert!(poller.last_sets().is_read_interested(901));

    transport.push_read(901, b"");
    poller.push(vec![readable(901)]);
    relay.turn().unwrap();

    relay.turn().unwrap();
    assert!(poller.last_sets().is_read_interested(LISTENER));
    assert!(!stop.is_requested());
}

#[test]
fn test_descriptor_exhaustion_with_empty_pool_keeps_listening() {
    let (mut relay, transport, poller, _stop) = relay();

    transport.push_accept(Err(io::Error::from_raw_os_error(libc::ENFILE)));
    poller.push(vec![readable(LISTENER)]);
    relay.turn().unwrap();

    relay.turn().unwrap();
    assert!(poller.last_sets().is_read_interested(LISTENER));
}

#[test]
fn test_handle_above_poller_limit_is_rejected() {
    let transport = FakeTransport::new();
    let poller = ScriptedPoller::with_handle_limit(1023);
    let stop = StopToken::new().expect("stop token");
    let mut relay = EventLoop::new(LISTENER, transport.clone(), poller.clone(), stop.clone());

    connect(&mut relay, &transport, &poller, &[901, 1500]);

    assert_eq!(relay.pool().len(), 1);
    assert!(relay.pool().find(1500).is_none());
    assert_eq!(transport.closed(), vec![1500]);
    assert_eq!(relay.stats().rejected, 1);

    relay.turn().unwrap();
    assert!(!poller.last_sets().is_read_interested(1500));
    assert!(!stop.is_requested());

    // The rest of the pool keeps relaying.
    connect(&mut relay, &transport, &poller, &[902]);
    transport.push_read(902, b"ok");
    poller.push(vec![readable(902)]);
    relay.turn().unwrap();
    poller.push(vec![writable(901)]);
    relay.turn().unwrap();

    assert_eq!(transport.wire(901), b"ok");
}

#[test]
fn test_broken_listener_stops_loop() {
    let (mut relay, transport, poller, stop) = relay();
    connect(&mut relay, &transport, &poller, &[901, 902]);

    transport.push_accept(Err(io::Error::from_raw_os_error(libc::EBADF)));
    poller.push(vec![readable(LISTENER)]);

    let exit = relay.run().unwrap();

    assert!(stop.is_requested());
    assert!(matches!(exit, Exit::ListenerFailed(_)));
    assert!(!exit.is_success());
    assert!(relay.pool().is_empty());
    assert_eq!(transport.closed(), vec![901, 902]);
}

#[test]
fn test_stop_tears_down_all_connections() {
    let (mut relay, transport, poller, stop) = relay();
    connect(&mut relay, &transport, &poller, &[901, 902, 903]);

    transport.push_read(901, b"never delivered");
    poller.push(vec![readable(901)]);
    relay.turn().unwrap();

    stop.request();
    let exit = relay.run().unwrap();

    assert!(matches!(exit, Exit::Stopped));
    assert!(relay.pool().is_empty());
    assert_eq!(transport.closed(), vec![901, 902, 903]);
    assert_eq!(transport.wire(902), b"", "queued data is discarded on shutdown");
    assert!(
        !transport.closed().contains(&LISTENER),
        "the listener belongs to the caller"
    );
}

#[test]
fn test_stop_with_no_connections() {
    let (mut relay, transport, _poller, stop) = relay();

    stop.request();
    let exit = relay.run().unwrap();

    assert!(exit.is_success());
    assert!(transport.closed().is_empty());
}

#[test]
fn test_wait_failure_is_fatal() {
    let (mut relay, transport, poller, _stop) = relay();
    connect(&mut relay, &transport, &poller, &[901]);

    poller.push_error(io::ErrorKind::InvalidInput);

    let err = relay.run().unwrap_err();

    assert!(matches!(err, RelayError::Wait(_)));
    assert_eq!(transport.closed(), vec![901]);
}

#[test]
fn test_stale_event_for_reused_handle_is_skipped() {
    let (mut relay, transport, poller, _stop) = relay();
    connect(&mut relay, &transport, &poller, &[901, 902]);

    // 902 closes and reports writable in the same batch; the write report
    // must not reach it. A later accept reuses its number.
    transport.push_read(902, b"");
    poller.push(vec![readable(902), writable(902)]);
    relay.turn().unwrap();

    connect(&mut relay, &transport, &poller, &[902]);
    let reused = relay.pool().find(902).unwrap().id();

    assert_eq!(transport.closed(), vec![902]);
    assert!(relay.pool().is_current(902, reused));
    assert_eq!(relay.stats().evicted, 1);
}

mockall::mock! {
    pub Socket {}

    impl Transport for Socket {
        fn accept(&mut self, listener: Handle) -> io::Result<Handle>;
        fn read(&mut self, handle: Handle, buffer: &mut [u8]) -> io::Result<usize>;
        fn write(&mut self, handle: Handle, buffer: &[u8]) -> io::Result<usize>;
        fn close(&mut self, handle: Handle);
    }
}

#[test]
fn test_evicted_handle_is_closed_exactly_once() {
    let mut socket = MockSocket::new();
    socket
        .expect_accept()
        .with(eq(LISTENER))
        .times(1)
        .returning(|_| Ok(901));
    socket
        .expect_read()
        .withf(|handle, _| *handle == 901)
        .times(1)
        .returning(|_, _| Ok(0));
    socket.expect_close().with(eq(901)).times(1).return_const(());

    let poller = ScriptedPoller::new();
    let stop = StopToken::new().unwrap();
    let mut relay = EventLoop::new(LISTENER, socket, poller.clone(), stop.clone());

    poller.push(vec![readable(LISTENER)]);
    relay.turn().unwrap();

    poller.push(vec![readable(901)]);
    relay.turn().unwrap();

    // A late report for the evicted handle must neither read nor close it.
    poller.push(vec![readable(901), writable(901)]);
    relay.turn().unwrap();

    stop.request();
    relay.run().unwrap();
}

#[test]
fn test_rejected_admit_closes_handle() {
    let mut socket = MockSocket::new();
    let mut accepted = vec![Ok(901), Ok(901)].into_iter();
    socket
        .expect_accept()
        .times(2)
        .returning(move |_| accepted.next().unwrap());
    socket.expect_close().with(eq(901)).times(2).return_const(());

    let poller = ScriptedPoller::new();
    let stop = StopToken::new().unwrap();
    let mut relay = EventLoop::new(LISTENER, socket, poller.clone(), stop.clone());

    poller.push(vec![readable(LISTENER)]);
    relay.turn().unwrap();
    poller.push(vec![readable(LISTENER)]);
    relay.turn().unwrap();

    assert_eq!(relay.stats().rejected, 1);
    assert_eq!(relay.pool().len(), 1);

    stop.request();
    relay.run().unwrap();
}
