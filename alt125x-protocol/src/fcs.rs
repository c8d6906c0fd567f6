//! Frame check sequence
//!
//! CRC-8 with the reflected 0x07 polynomial, seeded with 0xFF (the
//! CRC-8/ROHC parameter set). The transmitted FCS is the one's complement
//! of the final register value.

use crc::{Crc, CRC_8_ROHC};

const FCS: Crc<u8> = Crc::<u8>::new(&CRC_8_ROHC);

/// FCS over the header bytes after the opening flag, then the payload
pub fn compute(header: &[u8], payload: &[u8]) -> u8 {
    let mut digest = FCS.digest();
    digest.update(header);
    digest.update(payload);
    !digest.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Table-driven reference from the 27.010 annex
    fn reference(data: &[u8]) -> u8 {
        let mut table = [0u8; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut crc = i as u8;
            for _ in 0..8 {
                crc = if crc & 1 != 0 { (crc >> 1) ^ 0xE0 } else { crc >> 1 };
            }
            *entry = crc;
        }

        let mut fcs = 0xFFu8;
        for &byte in data {
            fcs = table[(fcs ^ byte) as usize];
        }
        0xFF - fcs
    }

    #[test]
    fn test_matches_reference_table() {
        let samples: [&[u8]; 4] = [&[0x07, 0xEF, 0x09], b"AT\r\n", &[0x00], &[0xFF; 40]];
        for sample in samples {
            assert_eq!(compute(sample, &[]), reference(sample));
        }
    }

    #[test]
    fn test_split_is_transparent() {
        let header = [0x07, 0xEF, 0x09];
        let payload = *b"AT\r\n";
        let mut joined = [0u8; 7];
        joined[..3].copy_from_slice(&header);
        joined[3..].copy_from_slice(&payload);

        assert_eq!(compute(&header, &payload), compute(&joined, &[]));
    }

    #[test]
    fn test_known_control_channel_fcs() {
        // SABM on DLCI 0: F9 03 3F 01 1C F9
        assert_eq!(compute(&[0x03, 0x3F, 0x01], &[]), 0x1C);
    }
}
