#![allow(dead_code)]

use alt125x_emux::{Emux, MuxConfig, PhysicalMux, Transport};
use alt125x_protocol::{encode_frame, MuxParser, ParseEvent, MAX_FRAME_SIZE};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkDown;

/// Transport that records everything written to it
#[derive(Debug, Default)]
pub struct Recorder {
    pub wire: Vec<u8>,
    pub frames: usize,
    pub binds: usize,
    pub unbinds: usize,
    pub fail_bind: bool,
    /// Accept at most this many bytes per frame
    pub limit: Option<usize>,
}

impl Transport for Recorder {
    type Error = LinkDown;

    fn bind(&mut self) -> Result<(), LinkDown> {
        if self.fail_bind {
            return Err(LinkDown);
        }
        self.binds += 1;
        Ok(())
    }

    fn unbind(&mut self) {
        self.unbinds += 1;
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<usize, LinkDown> {
        let accepted = self.limit.map_or(frame.len(), |limit| limit.min(frame.len()));
        self.wire.extend_from_slice(&frame[..accepted]);
        self.frames += 1;
        Ok(accepted)
    }
}

pub type TestEmux<'b> = Emux<'b, CriticalSectionRawMutex, Recorder>;
pub type TestMux<'b> = PhysicalMux<'b, CriticalSectionRawMutex, Recorder>;

pub fn emux<'b>() -> TestEmux<'b> {
    Emux::new(
        [Recorder::default(), Recorder::default()],
        MuxConfig::default(),
    )
}

pub fn frame(port: u8, payload: &[u8]) -> Vec<u8> {
    let mut buffer = [0u8; MAX_FRAME_SIZE];
    let len = encode_frame(port, payload, &mut buffer).unwrap();
    buffer[..len].to_vec()
}

/// Deliver `payload` to `port` of `mux` as the peer would send it
pub fn peer_sends(mux: &TestMux<'_>, port: u8, payload: &[u8]) {
    mux.on_bytes_received(&frame(port, payload));
}

/// Decode a recorded wire into (port, payload) pairs
pub fn decode(wire: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut parser = MuxParser::default();
    let mut frames = Vec::new();
    for &byte in wire {
        if let Some(ParseEvent::Frame { port, payload }) = parser.feed(byte, 0) {
            frames.push((port, payload.to_vec()));
        }
    }
    frames
}
