//! Serial Multiplexer Protocol
//!
//! This crate defines the framing used to carry several virtual serial
//! ports over one physical UART between the ALT125x and its host. Frames
//! follow the 3GPP 27.010 basic-option layout:
//!
//! ```text
//! ┌──────┬─────────┬─────────┬──────────┬─────────────┬─────┬──────┐
//! │ FLAG │ ADDRESS │ CONTROL │ LENGTH   │ PAYLOAD     │ FCS │ FLAG │
//! │ 0xF9 │ 1B      │ 1B      │ 1B or 2B │ 1-1024B     │ 1B  │ 0xF9 │
//! └──────┴─────────┴─────────┴──────────┴─────────────┴─────┴──────┘
//! ```
//!
//! - ADDRESS carries the virtual port id in bits 2-7
//! - LENGTH bit 0 set means a single length byte (7-bit length); clear
//!   means a second byte follows with the next 8 bits
//! - FCS is computed over everything between the flags except itself
//!
//! The receive side is a byte-at-a-time [`MuxParser`]. Besides frames it
//! recognises a timed escape sequence that resets it, and a bootloader
//! banner after which plain console text is passed through to a default
//! port until the first frame arrives.

#![no_std]
#![deny(unsafe_code)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod config;
pub mod fcs;
pub mod frame;
pub mod parser;

pub use config::{MuxConfig, Pattern, HISTORY_DEPTH};
pub use frame::{
    encode_frame, FrameEncoder, FrameError, DATA_MAX_LEN_OVERALL, FLAG, MAX_FRAME_SIZE,
    MAX_PORT_ID,
};
pub use parser::{MuxParser, ParseEvent, ParseState, ParserStats};
