//! Transfer statistics

use alt125x_hal::RxErrors;

/// Running counters for one UART
///
/// Counters only ever grow; they start from zero when the driver is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UartStats {
    /// Bytes pushed into the transmit FIFO
    pub tx_bytes: u32,
    /// Bytes accepted from the receive FIFO
    pub rx_bytes: u32,
    pub parity_errors: u32,
    pub break_errors: u32,
    pub overrun_errors: u32,
    pub frame_errors: u32,
    /// Times receive interrupts were paused because the ring buffer filled
    pub rx_throttles: u32,
}

impl UartStats {
    pub(crate) fn record_errors(&mut self, errors: RxErrors) {
        if errors.contains(RxErrors::PARITY) {
            self.parity_errors = self.parity_errors.wrapping_add(1);
        }
        if errors.contains(RxErrors::BREAK) {
            self.break_errors = self.break_errors.wrapping_add(1);
        }
        if errors.contains(RxErrors::OVERRUN) {
            self.overrun_errors = self.overrun_errors.wrapping_add(1);
        }
        if errors.contains(RxErrors::FRAMING) {
            self.frame_errors = self.frame_errors.wrapping_add(1);
        }
    }

    /// Total hardware receive errors of any kind
    pub fn rx_errors(&self) -> u32 {
        self.parity_errors
            .wrapping_add(self.break_errors)
            .wrapping_add(self.overrun_errors)
            .wrapping_add(self.frame_errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_each_error_kind() {
        let mut stats = UartStats::default();
        stats.record_errors(RxErrors::PARITY | RxErrors::FRAMING);
        stats.record_errors(RxErrors::OVERRUN);
        stats.record_errors(RxErrors::empty());

        assert_eq!(stats.parity_errors, 1);
        assert_eq!(stats.frame_errors, 1);
        assert_eq!(stats.overrun_errors, 1);
        assert_eq!(stats.break_errors, 0);
        assert_eq!(stats.rx_errors(), 3);
    }
}
