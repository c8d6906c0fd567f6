//! Timeout behaviour against the mock time driver
//!
//! Everything that advances mock time lives in this one test so that no
//! other test sees the clock jump.

mod common;

use alt125x_emux::{Receive, TransferStatus};
use embassy_futures::block_on;
use embassy_futures::join::join;
use embassy_futures::yield_now;
use embassy_time::{Duration, Instant, MockDriver};

use common::{emux, peer_sends};

#[test]
fn test_receive_timeout() {
    let time = MockDriver::get();
    let mut ring = [0u8; 32];
    let mut buf = [0u8; 8];
    let mut short = [0u8; 4];
    let mut next = [0u8; 2];
    let emux = emux();
    let mux = emux.mux(0).unwrap();
    let port = emux.open(0, 1, &mut ring).unwrap();

    // Nothing arrives: times out with an empty buffer
    let start = Instant::now();
    let (result, _) = block_on(join(
        port.receive_timeout(&mut short, Duration::from_millis(50)),
        async {
            yield_now().await;
            time.advance(Duration::from_millis(50));
        },
    ));
    let (status, received) = result.unwrap();
    assert_eq!(status, TransferStatus::Timeout);
    assert_eq!(received.len, 0);
    assert!(Instant::now() - start >= Duration::from_millis(50));

    // Part of the data arrives: times out with what came in
    peer_sends(mux, 1, b"abc");
    let (result, _) = block_on(join(
        port.receive_timeout(&mut buf, Duration::from_millis(50)),
        async {
            yield_now().await;
            peer_sends(mux, 1, b"de");
            yield_now().await;
            time.advance(Duration::from_millis(60));
        },
    ));
    let (status, received) = result.unwrap();
    assert_eq!(status, TransferStatus::Timeout);
    assert_eq!(received.bytes(), b"abcde");
    assert!(!received.is_complete());

    // The port accepts the next receive
    peer_sends(mux, 1, b"xy");
    match port.receive_nonblock(&mut next).unwrap() {
        Receive::Done(data) => assert_eq!(data, b"xy"),
        other => panic!("expected inline completion, got {:?}", other),
    }
}
