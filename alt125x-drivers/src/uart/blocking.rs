//! Polling transfers
//!
//! These spin on FIFO status bits and never yield. They bypass the ring
//! buffer and the interrupt path entirely, and are intended for bring-up
//! and debug output before interrupts are serviced.

use core::hint::spin_loop;

use alt125x_hal::{IrqMask, RxErrors, UartRegs};

use super::{LineState, UartDriver, UartError};

impl<'d, R: UartRegs> UartDriver<'d, R> {
    /// Send `data`, spinning while the transmit FIFO is full
    pub fn send_block(&mut self, data: &[u8]) -> Result<usize, UartError> {
        if self.tx.state == LineState::Busy {
            return Err(UartError::Busy);
        }
        if data.is_empty() {
            return Ok(0);
        }
        self.handshake()?;

        for &byte in data {
            while self.regs.tx_fifo_full() {
                spin_loop();
            }
            self.regs.write_data(byte);
            self.stats.tx_bytes = self.stats.tx_bytes.wrapping_add(1);
        }
        Ok(data.len())
    }

    /// Fill `buf`, spinning while the receive FIFO is empty
    ///
    /// Receive interrupts are masked for the duration so the interrupt
    /// handler does not race the polling loop for FIFO entries.
    pub fn receive_block(&mut self, buf: &mut [u8]) -> Result<usize, UartError> {
        if self.rx.state == LineState::Busy {
            return Err(UartError::Busy);
        }

        self.regs.disable_interrupts(IrqMask::RX_ANY);
        let result = self.poll_rx(buf);
        if !self.rx_throttled {
            self.regs.enable_interrupts(IrqMask::RX_ANY);
        }
        result
    }

    /// Spin until the transmitter has shifted everything out
    pub fn flush_block(&mut self) {
        while self.regs.tx_busy() {
            spin_loop();
        }
    }

    /// Polling adapter implementing `embedded_io::{Read, Write}`
    pub fn blocking(&mut self) -> Blocking<'_, 'd, R> {
        Blocking { uart: self }
    }

    fn poll_rx(&mut self, buf: &mut [u8]) -> Result<usize, UartError> {
        for slot in buf.iter_mut() {
            while self.regs.rx_fifo_empty() {
                spin_loop();
            }
            let word = self.regs.read_data();
            let errors = word.errors();
            self.stats.record_errors(errors);
            if errors.contains(RxErrors::BREAK) {
                return Err(UartError::Break);
            }
            *slot = word.byte();
            self.stats.rx_bytes = self.stats.rx_bytes.wrapping_add(1);
        }
        Ok(buf.len())
    }
}

/// Borrowed polling view of a [`UartDriver`]
pub struct Blocking<'a, 'd, R: UartRegs> {
    uart: &'a mut UartDriver<'d, R>,
}

impl<R: UartRegs> embedded_io::ErrorType for Blocking<'_, '_, R> {
    type Error = UartError;
}

impl<R: UartRegs> embedded_io::Write for Blocking<'_, '_, R> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.uart.send_block(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.uart.flush_block();
        Ok(())
    }
}

impl<R: UartRegs> embedded_io::Read for Blocking<'_, '_, R> {
    /// Waits for the first byte, then takes whatever else is already queued
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut count = self.uart.receive_block(&mut buf[..1])?;
        while count < buf.len() && !self.uart.regs.rx_fifo_empty() {
            count += self.uart.receive_block(&mut buf[count..count + 1])?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alt125x_hal::mock::MockRegs;
    use alt125x_hal::{DataWord, UartConfig};
    use embedded_io::{Read, Write};

    use crate::uart::Transfer;

    #[test]
    fn test_send_block_writes_fifo() {
        let mut ring = [0u8; 8];
        let mut uart = UartDriver::new(MockRegs::new(32), UartConfig::default(), &mut ring);

        assert_eq!(uart.send_block(b"boot ok\r\n"), Ok(9));
        uart.regs_mut().shift_out();
        assert_eq!(uart.regs().wire(), b"boot ok\r\n");
        assert_eq!(uart.stats().tx_bytes, 9);
    }

    #[test]
    fn test_send_block_refused_while_nonblock_pending() {
        let mut ring = [0u8; 8];
        let data = [0u8; 12];
        let mut uart = UartDriver::new(MockRegs::new(4), UartConfig::default(), &mut ring);

        assert_eq!(uart.send_nonblock(&data), Ok(Transfer::Pending));
        assert_eq!(uart.send_block(b"x"), Err(UartError::Busy));
    }

    #[test]
    fn test_receive_block_bypasses_ring() {
        let mut ring = [0u8; 8];
        let mut buf = [0u8; 3];
        let mut uart = UartDriver::new(MockRegs::new(8), UartConfig::default(), &mut ring);

        for byte in [1, 2, 3] {
            uart.regs_mut().inject(byte);
        }
        assert_eq!(uart.receive_block(&mut buf), Ok(3));
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(uart.buffered(), 0);
        assert!(uart.regs().enabled_interrupts().contains(IrqMask::RX));
    }

    #[test]
    fn test_receive_block_stops_on_break() {
        let mut ring = [0u8; 8];
        let mut buf = [0u8; 2];
        let mut uart = UartDriver::new(MockRegs::new(8), UartConfig::default(), &mut ring);

        uart.regs_mut().inject(0x41);
        uart.regs_mut()
            .inject_word(DataWord::with_errors(0, RxErrors::BREAK));

        assert_eq!(uart.receive_block(&mut buf), Err(UartError::Break));
        assert_eq!(uart.stats().break_errors, 1);
    }

    #[test]
    fn test_embedded_io_adapter() {
        let mut ring = [0u8; 8];
        let mut buf = [0u8; 16];
        let mut uart = UartDriver::new(MockRegs::new(32), UartConfig::default(), &mut ring);

        for byte in b"OK\r\n" {
            uart.regs_mut().inject(*byte);
        }

        {
            let mut io = uart.blocking();
            io.write_all(b"AT\r\n").unwrap();
            assert_eq!(io.read(&mut buf), Ok(4));
        }
        assert_eq!(&buf[..4], b"OK\r\n");

        uart.regs_mut().shift_out();
        assert_eq!(uart.regs().wire(), b"AT\r\n");
    }
}
