//! Frame encoding for the multiplexer protocol.
//!
//! Frame format:
//! - FLAG (1 byte): 0xF9 opening flag
//! - ADDRESS (1 byte): `port << 2 | C/R | EA`
//! - CONTROL (1 byte): 0xEF, unnumbered information with header check
//! - LENGTH (1 or 2 bytes): `len << 1 | 1` for lengths up to 127, otherwise
//!   `(len & 0x7F) << 1` followed by `len >> 7`
//! - PAYLOAD (1-1024 bytes)
//! - FCS (1 byte): see [`crate::fcs`]
//! - FLAG (1 byte): 0xF9 closing flag

use crate::fcs;

/// Frame delimiter
pub const FLAG: u8 = 0xF9;

/// Extension bit: set on the last byte of a multi-byte field
pub const EA: u8 = 0x01;

/// Command/response bit in the address byte
pub const CR: u8 = 0x02;

/// Control byte: unnumbered information with header check
pub const CONTROL_UIH: u8 = 0xEF;

/// Largest payload carried by one frame
///
/// The length field could express 32767 bytes; the receive buffer is
/// sized for this cap instead.
pub const DATA_MAX_LEN_OVERALL: usize = 1024;

/// Largest payload expressible with a single length byte
pub const SHORT_LENGTH_MAX: usize = 0x7F;

/// Largest virtual port id the address byte can carry
pub const MAX_PORT_ID: u8 = 0x3F;

/// Longest header: flag, address, control and two length bytes
pub const MAX_HEADER_SIZE: usize = 5;

/// Longest complete frame
pub const MAX_FRAME_SIZE: usize = MAX_HEADER_SIZE + DATA_MAX_LEN_OVERALL + 2;

/// Errors that can occur while encoding a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Frames must carry at least one byte
    EmptyPayload,
    /// Payload exceeds [`DATA_MAX_LEN_OVERALL`]
    PayloadTooLarge,
    /// Port id does not fit the address field
    InvalidPort,
    /// Output buffer too small for the encoded frame
    BufferTooSmall,
}

/// Address byte for a virtual port
pub const fn address(port: u8) -> u8 {
    (port << 2) | CR | EA
}

/// Virtual port carried by an address byte
pub const fn port_of(address: u8) -> u8 {
    address >> 2
}

/// Encoded size of a frame carrying `len` payload bytes
pub const fn frame_size(len: usize) -> usize {
    let header = if len <= SHORT_LENGTH_MAX { 4 } else { 5 };
    header + len + 2
}

/// Encode one frame for `port` into `out`
///
/// Returns the number of bytes written.
pub fn encode_frame(port: u8, payload: &[u8], out: &mut [u8]) -> Result<usize, FrameError> {
    if port > MAX_PORT_ID {
        return Err(FrameError::InvalidPort);
    }
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    if payload.len() > DATA_MAX_LEN_OVERALL {
        return Err(FrameError::PayloadTooLarge);
    }

    let len = payload.len();
    let size = frame_size(len);
    if out.len() < size {
        return Err(FrameError::BufferTooSmall);
    }

    out[0] = FLAG;
    out[1] = address(port);
    out[2] = CONTROL_UIH;
    let header = if len <= SHORT_LENGTH_MAX {
        out[3] = ((len as u8) << 1) | EA;
        4
    } else {
        out[3] = ((len & 0x7F) as u8) << 1;
        out[4] = (len >> 7) as u8;
        5
    };

    out[header..header + len].copy_from_slice(payload);
    out[header + len] = fcs::compute(&out[1..header], payload);
    out[header + len + 1] = FLAG;

    Ok(size)
}

/// Splits a payload of any length into frames
///
/// Each fragment of up to [`DATA_MAX_LEN_OVERALL`] bytes becomes one
/// independently checked frame.
///
/// ```ignore
/// let mut encoder = FrameEncoder::new(1, data)?;
/// while let Some(frame) = encoder.next_frame() {
///     uart.write_all(frame)?;
/// }
/// ```
pub struct FrameEncoder<'a> {
    port: u8,
    chunks: core::slice::Chunks<'a, u8>,
    buf: [u8; MAX_FRAME_SIZE],
}

impl<'a> FrameEncoder<'a> {
    pub fn new(port: u8, data: &'a [u8]) -> Result<Self, FrameError> {
        if port > MAX_PORT_ID {
            return Err(FrameError::InvalidPort);
        }
        if data.is_empty() {
            return Err(FrameError::EmptyPayload);
        }
        Ok(Self {
            port,
            chunks: data.chunks(DATA_MAX_LEN_OVERALL),
            buf: [0; MAX_FRAME_SIZE],
        })
    }

    /// Number of frames needed for `len` bytes
    pub const fn frame_count(len: usize) -> usize {
        len.div_ceil(DATA_MAX_LEN_OVERALL)
    }

    /// Encode the next fragment
    pub fn next_frame(&mut self) -> Option<&[u8]> {
        let chunk = self.chunks.next()?;
        // Port and chunk length were validated up front
        let size = encode_frame(self.port, chunk, &mut self.buf).ok()?;
        Some(&self.buf[..size])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_short_frame() {
        let mut buffer = [0u8; 16];
        let len = encode_frame(1, b"AT\r\n", &mut buffer).unwrap();

        assert_eq!(len, 10);
        assert_eq!(buffer[0], FLAG);
        assert_eq!(buffer[1], 0x07); // port 1, C/R, EA
        assert_eq!(buffer[2], CONTROL_UIH);
        assert_eq!(buffer[3], 0x09); // length 4, EA
        assert_eq!(&buffer[4..8], b"AT\r\n");
        assert_eq!(buffer[8], fcs::compute(&buffer[1..4], b"AT\r\n"));
        assert_eq!(buffer[9], FLAG);
    }

    #[test]
    fn test_encode_long_length_field() {
        let payload = [0x11u8; 300];
        let mut buffer = [0u8; MAX_FRAME_SIZE];
        let len = encode_frame(3, &payload, &mut buffer).unwrap();

        assert_eq!(len, 5 + 300 + 2);
        assert_eq!(buffer[3] & EA, 0);
        let decoded = (buffer[3] >> 1) as usize | (buffer[4] as usize) << 7;
        assert_eq!(decoded, 300);
        assert_eq!(buffer[len - 1], FLAG);
    }

    #[test]
    fn test_length_boundary_between_forms() {
        assert_eq!(frame_size(127), 4 + 127 + 2);
        assert_eq!(frame_size(128), 5 + 128 + 2);
    }

    #[test]
    fn test_encode_rejects_bad_input() {
        let mut buffer = [0u8; MAX_FRAME_SIZE + 8];
        assert_eq!(
            encode_frame(1, &[], &mut buffer),
            Err(FrameError::EmptyPayload)
        );
        assert_eq!(
            encode_frame(1, &[0u8; DATA_MAX_LEN_OVERALL + 1], &mut buffer),
            Err(FrameError::PayloadTooLarge)
        );
        assert_eq!(
            encode_frame(64, b"x", &mut buffer),
            Err(FrameError::InvalidPort)
        );
        assert_eq!(
            encode_frame(1, b"hello", &mut buffer[..8]),
            Err(FrameError::BufferTooSmall)
        );
    }

    #[test]
    fn test_address_round_trip() {
        for port in 0..=MAX_PORT_ID {
            assert_eq!(port_of(address(port)), port);
            assert_eq!(address(port) & EA, EA);
        }
    }

    #[test]
    fn test_encoder_fragments_long_payload() {
        let data = [0x5Au8; 2500];
        let mut encoder = FrameEncoder::new(2, &data).unwrap();

        let mut sizes = [0usize; 4];
        let mut count = 0;
        while let Some(frame) = encoder.next_frame() {
            assert_eq!(frame[0], FLAG);
            assert_eq!(port_of(frame[1]), 2);
            sizes[count] = frame.len();
            count += 1;
        }

        assert_eq!(count, 3);
        assert_eq!(FrameEncoder::frame_count(2500), 3);
        assert_eq!(sizes[..3], [frame_size(1024), frame_size(1024), frame_size(452)]);
    }

    #[test]
    fn test_encoder_rejects_empty() {
        assert!(matches!(
            FrameEncoder::new(0, &[]),
            Err(FrameError::EmptyPayload)
        ));
    }
}
