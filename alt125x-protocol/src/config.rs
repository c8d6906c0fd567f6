//! Receive-side configuration
//!
//! The escape sequence and the boot banner are matched against a short
//! history of received bytes, so every pattern must fit in
//! [`HISTORY_DEPTH`] bytes.

use heapless::Vec;

/// Bytes of receive history kept for pattern matching
pub const HISTORY_DEPTH: usize = 16;

/// A byte pattern matched against the receive history
pub type Pattern = Vec<u8, HISTORY_DEPTH>;

/// Default first half of the escape sequence
pub const ESCAPE_PART_ONE: &[u8] = b"+++";

/// Default second half of the escape sequence
pub const ESCAPE_PART_TWO: &[u8] = b"---";

/// Default bootloader banner
pub const BOOT_BANNER: &[u8] = b"BOOT";

/// Parser configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MuxConfig {
    /// First half of the escape sequence (empty disables escape detection)
    pub escape_part_one: Pattern,
    /// Second half of the escape sequence
    pub escape_part_two: Pattern,
    /// Shortest accepted gap between the two halves
    pub escape_min_delay_ms: u32,
    /// Longest accepted gap between the two halves
    pub escape_max_delay_ms: u32,
    /// Bootloader banner (empty disables boot passthrough)
    pub boot_banner: Pattern,
    /// Virtual port that receives bootloader console text
    pub boot_port: u8,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            escape_part_one: pattern(ESCAPE_PART_ONE),
            escape_part_two: pattern(ESCAPE_PART_TWO),
            escape_min_delay_ms: 75,
            escape_max_delay_ms: 125,
            boot_banner: pattern(BOOT_BANNER),
            boot_port: 0,
        }
    }
}

/// Build a pattern, keeping at most [`HISTORY_DEPTH`] bytes
pub fn pattern(bytes: &[u8]) -> Pattern {
    bytes.iter().copied().take(HISTORY_DEPTH).collect()
}
