//! Byte-at-a-time receive parser
//!
//! [`MuxParser::feed`] is called once per byte from the UART receive path.
//! Malformed frames are dropped and counted; nothing is reported upward
//! because the link has no retransmission.

use heapless::Vec;

use crate::config::{MuxConfig, HISTORY_DEPTH};
use crate::fcs;
use crate::frame::{port_of, DATA_MAX_LEN_OVERALL, EA, FLAG, MAX_HEADER_SIZE};

/// Payload plus FCS and closing flag
const BODY_CAPACITY: usize = DATA_MAX_LEN_OVERALL + 2;

/// Parse phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseState {
    /// Waiting for an opening flag
    SearchingPreamble,
    /// Collecting address, control and length bytes
    ReadingHeader,
    /// Collecting payload, FCS and closing flag
    ReadingPayload,
}

/// Something the caller must act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseEvent<'a> {
    /// A complete frame passed its checks
    Frame { port: u8, payload: &'a [u8] },
    /// Printable bootloader console byte, seen outside of any frame
    BootText(u8),
    /// The escape sequence arrived inside its timing window
    EscapeReset,
}

/// Receive counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParserStats {
    pub frames: u32,
    pub fcs_errors: u32,
    pub trailer_errors: u32,
    pub length_errors: u32,
    pub escape_resets: u32,
    pub boot_bytes: u32,
}

/// Receive state machine for one physical link
#[derive(Debug, Clone)]
pub struct MuxParser {
    config: MuxConfig,
    state: ParseState,
    header: Vec<u8, MAX_HEADER_SIZE>,
    body: Vec<u8, BODY_CAPACITY>,
    payload_len: usize,
    history: Vec<u8, HISTORY_DEPTH>,
    /// Time the first half of the escape sequence completed
    escape_armed_at: Option<u64>,
    boot_mode: bool,
    stats: ParserStats,
}

impl Default for MuxParser {
    fn default() -> Self {
        Self::new(MuxConfig::default())
    }
}

impl MuxParser {
    pub fn new(config: MuxConfig) -> Self {
        Self {
            config,
            state: ParseState::SearchingPreamble,
            header: Vec::new(),
            body: Vec::new(),
            payload_len: 0,
            history: Vec::new(),
            escape_armed_at: None,
            boot_mode: false,
            stats: ParserStats::default(),
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    /// Whether bootloader text is currently being passed through
    pub fn in_boot_mode(&self) -> bool {
        self.boot_mode
    }

    /// Return to the initial state, forgetting history and boot mode
    ///
    /// Counters are kept.
    pub fn reset(&mut self) {
        self.restart();
        self.history.clear();
        self.escape_armed_at = None;
        self.boot_mode = false;
    }

    /// Feed one received byte
    ///
    /// `now_ms` is a monotonic timestamp used only to time the escape
    /// sequence.
    pub fn feed(&mut self, byte: u8, now_ms: u64) -> Option<ParseEvent<'_>> {
        if self.track_escape(byte, now_ms) {
            debug!("escape sequence, parser reset");
            self.reset();
            self.stats.escape_resets = self.stats.escape_resets.wrapping_add(1);
            return Some(ParseEvent::EscapeReset);
        }

        match self.state {
            ParseState::SearchingPreamble => self.search(byte),
            ParseState::ReadingHeader => {
                self.read_header(byte);
                None
            }
            ParseState::ReadingPayload => {
                // Capacity covers the largest accepted length
                let _ = self.body.push(byte);
                if self.body.len() == self.payload_len + 2 {
                    self.finish_frame()
                } else {
                    None
                }
            }
        }
    }

    /// Push `byte` into the history and check both escape halves
    ///
    /// The second half is checked before the first is re-armed so that a
    /// pattern shared by both halves cannot satisfy itself.
    fn track_escape(&mut self, byte: u8, now_ms: u64) -> bool {
        if self.history.is_full() {
            self.history.remove(0);
        }
        let _ = self.history.push(byte);

        let part_one = &self.config.escape_part_one;
        let part_two = &self.config.escape_part_two;
        if part_one.is_empty() || part_two.is_empty() {
            return false;
        }

        if self.history.ends_with(part_two) {
            if let Some(armed_at) = self.escape_armed_at.take() {
                let delay = now_ms.saturating_sub(armed_at);
                let min = u64::from(self.config.escape_min_delay_ms);
                let max = u64::from(self.config.escape_max_delay_ms);
                if (min..=max).contains(&delay) {
                    return true;
                }
                trace!("escape second half after {} ms, ignored", delay);
            }
        }

        if self.history.ends_with(part_one) {
            self.escape_armed_at = Some(now_ms);
        }
        false
    }

    fn search(&mut self, byte: u8) -> Option<ParseEvent<'_>> {
        if byte == FLAG {
            self.boot_mode = false;
            self.begin_header();
            return None;
        }

        if self.boot_mode {
            if is_console_text(byte) {
                self.stats.boot_bytes = self.stats.boot_bytes.wrapping_add(1);
                return Some(ParseEvent::BootText(byte));
            }
        } else if !self.config.boot_banner.is_empty()
            && self.history.ends_with(&self.config.boot_banner)
        {
            debug!("bootloader banner, passing console text through");
            self.boot_mode = true;
        }
        None
    }

    fn begin_header(&mut self) {
        self.header.clear();
        let _ = self.header.push(FLAG);
        self.state = ParseState::ReadingHeader;
    }

    fn read_header(&mut self, byte: u8) {
        // Back-to-back flags: the first one closed something we missed
        if byte == FLAG && self.header.len() == 1 {
            return;
        }

        let _ = self.header.push(byte);
        match self.header.len() {
            4 if byte & EA != 0 => self.begin_payload(usize::from(byte >> 1)),
            5 => {
                let low = usize::from(self.header[3] >> 1);
                self.begin_payload(low | usize::from(byte) << 7);
            }
            _ => {}
        }
    }

    fn begin_payload(&mut self, len: usize) {
        if len == 0 || len > DATA_MAX_LEN_OVERALL {
            debug!("bad frame length {}, dropped", len);
            self.stats.length_errors = self.stats.length_errors.wrapping_add(1);
            self.restart();
            return;
        }
        self.payload_len = len;
        self.body.clear();
        self.state = ParseState::ReadingPayload;
    }

    fn finish_frame(&mut self) -> Option<ParseEvent<'_>> {
        let len = self.payload_len;
        let port = port_of(self.header[1]);
        let received_fcs = self.body[len];
        let trailer = self.body[len + 1];

        self.state = ParseState::SearchingPreamble;
        self.payload_len = 0;

        if trailer != FLAG {
            debug!("missing closing flag on port {}, dropped", port);
            self.stats.trailer_errors = self.stats.trailer_errors.wrapping_add(1);
            return None;
        }
        let expected = fcs::compute(&self.header[1..], &self.body[..len]);
        if received_fcs != expected {
            debug!(
                "fcs mismatch on port {}: got {} want {}, dropped",
                port,
                received_fcs,
                expected
            );
            self.stats.fcs_errors = self.stats.fcs_errors.wrapping_add(1);
            return None;
        }

        trace!("frame for port {}, {} bytes", port, len);
        self.stats.frames = self.stats.frames.wrapping_add(1);
        Some(ParseEvent::Frame {
            port,
            payload: &self.body[..len],
        })
    }

    /// Drop any partial frame
    fn restart(&mut self) {
        self.state = ParseState::SearchingPreamble;
        self.header.clear();
        self.body.clear();
        self.payload_len = 0;
    }
}

fn is_console_text(byte: u8) -> bool {
    matches!(byte, 0x20..=0x7E | b'\r' | b'\n' | b'\t')
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec::Vec as StdVec;

    use super::*;
    use crate::config::pattern;
    use crate::frame::{encode_frame, MAX_FRAME_SIZE};

    fn encode(port: u8, payload: &[u8]) -> StdVec<u8> {
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len = encode_frame(port, payload, &mut buffer).unwrap();
        buffer[..len].to_vec()
    }

    /// Feed `bytes` at a fixed time, collecting delivered frames
    fn feed_all(parser: &mut MuxParser, bytes: &[u8], now_ms: u64) -> StdVec<(u8, StdVec<u8>)> {
        let mut frames = StdVec::new();
        for &byte in bytes {
            if let Some(ParseEvent::Frame { port, payload }) = parser.feed(byte, now_ms) {
                frames.push((port, payload.to_vec()));
            }
        }
        frames
    }

    fn feed_at(parser: &mut MuxParser, bytes: &[u8], now_ms: u64) -> bool {
        let mut reset = false;
        for &byte in bytes {
            if parser.feed(byte, now_ms) == Some(ParseEvent::EscapeReset) {
                reset = true;
            }
        }
        reset
    }

    #[test]
    fn test_frame_round_trip() {
        let mut parser = MuxParser::default();
        let frames = feed_all(&mut parser, &encode(1, b"AT\r\n"), 0);

        assert_eq!(frames, [(1, b"AT\r\n".to_vec())]);
        assert_eq!(parser.state(), ParseState::SearchingPreamble);
        assert_eq!(parser.stats().frames, 1);
    }

    #[test]
    fn test_two_byte_length_round_trip() {
        let payload: StdVec<u8> = (0..600u16).map(|i| i as u8).collect();
        let mut parser = MuxParser::default();
        let frames = feed_all(&mut parser, &encode(5, &payload), 0);

        assert_eq!(frames, [(5, payload)]);
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut data = StdVec::from([0x00, 0xFF, 0x12, 0x34]);
        data.extend(encode(2, b"OK"));

        let mut parser = MuxParser::default();
        assert_eq!(feed_all(&mut parser, &data, 0), [(2, b"OK".to_vec())]);
    }

    #[test]
    fn test_back_to_back_flags_resync() {
        // Closing flag of a lost frame followed by a new opening flag
        let mut data = StdVec::from([FLAG]);
        data.extend(encode(3, b"+CEREG: 1"));

        let mut parser = MuxParser::default();
        assert_eq!(feed_all(&mut parser, &data, 0), [(3, b"+CEREG: 1".to_vec())]);
    }

    #[test]
    fn test_consecutive_frames() {
        let mut data = encode(1, b"first");
        data.extend(encode(2, b"second"));

        let mut parser = MuxParser::default();
        let frames = feed_all(&mut parser, &data, 0);
        assert_eq!(frames, [(1, b"first".to_vec()), (2, b"second".to_vec())]);
    }

    #[test]
    fn test_fcs_mismatch_dropped() {
        let mut data = encode(1, b"hello");
        let fcs_index = data.len() - 2;
        data[fcs_index] ^= 0x01;

        let mut parser = MuxParser::default();
        assert!(feed_all(&mut parser, &data, 0).is_empty());
        assert_eq!(parser.stats().fcs_errors, 1);
        assert_eq!(parser.state(), ParseState::SearchingPreamble);
    }

    #[test]
    fn test_missing_trailer_dropped() {
        let mut data = encode(1, b"hello");
        let last = data.len() - 1;
        data[last] = 0x7E;

        let mut parser = MuxParser::default();
        assert!(feed_all(&mut parser, &data, 0).is_empty());
        assert_eq!(parser.stats().trailer_errors, 1);
        assert_eq!(parser.state(), ParseState::SearchingPreamble);
    }

    #[test]
    fn test_length_boundaries() {
        // Zero, single-byte form
        let mut parser = MuxParser::default();
        feed_all(&mut parser, &[FLAG, 0x07, 0xEF, 0x01], 0);
        assert_eq!(parser.state(), ParseState::SearchingPreamble);
        assert_eq!(parser.stats().length_errors, 1);

        // 1024 accepted
        let payload = [0xA5u8; DATA_MAX_LEN_OVERALL];
        let frames = feed_all(&mut parser, &encode(1, &payload), 0);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].1.len(), DATA_MAX_LEN_OVERALL);

        // 1025 rejected at the header
        let len = DATA_MAX_LEN_OVERALL + 1;
        let header = [FLAG, 0x07, 0xEF, ((len & 0x7F) as u8) << 1, (len >> 7) as u8];
        feed_all(&mut parser, &header, 0);
        assert_eq!(parser.state(), ParseState::SearchingPreamble);
        assert_eq!(parser.stats().length_errors, 2);
    }

    #[test]
    fn test_two_byte_length_space_never_panics() {
        let mut parser = MuxParser::default();
        for value in 0..=u16::MAX {
            let [low, high] = value.to_le_bytes();
            let low = low & !EA;
            feed_all(&mut parser, &[FLAG, 0x07, 0xEF, low, high], 0);

            let len = usize::from(low >> 1) | usize::from(high) << 7;
            if len == 0 || len > DATA_MAX_LEN_OVERALL {
                assert_eq!(parser.state(), ParseState::SearchingPreamble);
            } else {
                assert_eq!(parser.state(), ParseState::ReadingPayload);
            }
            parser.reset();
        }
    }

    #[test]
    fn test_escape_resets_mid_payload() {
        let mut parser = MuxParser::default();
        let data = encode(1, b"0123456789");
        feed_all(&mut parser, &data[..8], 0);
        assert_eq!(parser.state(), ParseState::ReadingPayload);

        assert!(!feed_at(&mut parser, b"+++", 1_000));
        assert!(feed_at(&mut parser, b"---", 1_100));
        assert_eq!(parser.state(), ParseState::SearchingPreamble);
        assert_eq!(parser.stats().escape_resets, 1);
    }

    #[test]
    fn test_escape_resets_mid_header() {
        let mut parser = MuxParser::default();
        feed_all(&mut parser, &[FLAG, 0x07], 0);
        assert_eq!(parser.state(), ParseState::ReadingHeader);

        feed_at(&mut parser, b"+++", 200);
        assert!(feed_at(&mut parser, b"---", 275));
        assert_eq!(parser.state(), ParseState::SearchingPreamble);
    }

    #[test]
    fn test_escape_window_edges() {
        for (delay, expect_reset) in [(74, false), (75, true), (125, true), (126, false)] {
            let mut parser = MuxParser::default();
            feed_all(&mut parser, &[FLAG, 0x07, 0xEF], 0);

            feed_at(&mut parser, b"+++", 10);
            let reset = feed_at(&mut parser, b"---", 10 + delay);
            assert_eq!(reset, expect_reset, "delay {delay}");
            if !expect_reset {
                assert_ne!(parser.state(), ParseState::SearchingPreamble);
            }
        }
    }

    #[test]
    fn test_escape_disabled_by_empty_pattern() {
        let config = MuxConfig {
            escape_part_one: pattern(b""),
            ..Default::default()
        };
        let mut parser = MuxParser::new(config);
        feed_at(&mut parser, b"+++", 0);
        assert!(!feed_at(&mut parser, b"---", 100));
    }

    #[test]
    fn test_boot_text_passthrough() {
        let mut parser = MuxParser::default();
        let mut text = StdVec::new();
        let mut data = b"\x00BOOT v1.2\r\n\x01".to_vec();
        data.extend(encode(1, b"x"));
        data.extend(b"after");

        for &byte in &data {
            if let Some(ParseEvent::BootText(b)) = parser.feed(byte, 0) {
                text.push(b);
            }
        }

        assert_eq!(text, b" v1.2\r\n");
        assert!(!parser.in_boot_mode());
        assert_eq!(parser.stats().boot_bytes, 7);
        assert_eq!(parser.stats().frames, 1);
    }

    #[test]
    fn test_no_boot_text_without_banner() {
        let mut parser = MuxParser::default();
        for &byte in b"hello world" {
            assert_eq!(parser.feed(byte, 0), None);
        }
    }
}
