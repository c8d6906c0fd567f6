//! Physical link abstraction

use alt125x_drivers::{Serial, UartDriver, UartError};
use alt125x_hal::UartRegs;
use embassy_sync::blocking_mutex::raw::RawMutex;

/// Byte sink for one physical multiplexed link
///
/// The mux binds the transport when its first virtual port opens and
/// unbinds it when the last one closes. Received bytes do not go through
/// this trait; the receive side pushes them into
/// [`crate::PhysicalMux::on_byte_received`].
pub trait Transport {
    type Error;

    /// Prepare the link for use
    fn bind(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Release the link
    fn unbind(&mut self) {}

    /// Send one encoded frame, returning the number of bytes accepted
    fn transmit(&mut self, frame: &[u8]) -> Result<usize, Self::Error>;
}

/// Frames go out through the polling send path
impl<R: UartRegs> Transport for UartDriver<'_, R> {
    type Error = UartError;

    fn bind(&mut self) -> Result<(), UartError> {
        self.set_tx_enabled(true);
        self.set_rx_enabled(true);
        Ok(())
    }

    fn unbind(&mut self) {
        self.set_tx_enabled(false);
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<usize, UartError> {
        self.send_block(frame)
    }
}

/// Shared driver: frames go out through the polling send path while the
/// receive task keeps reading the same UART through [`Serial::read_available`]
impl<M: RawMutex, R: UartRegs> Transport for &Serial<'_, M, R> {
    type Error = UartError;

    fn bind(&mut self) -> Result<(), UartError> {
        self.with_driver(|uart| uart.bind())
    }

    fn unbind(&mut self) {
        self.with_driver(|uart| uart.unbind())
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<usize, UartError> {
        self.with_driver(|uart| uart.transmit(frame))
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    type Error = T::Error;

    fn bind(&mut self) -> Result<(), Self::Error> {
        T::bind(self)
    }

    fn unbind(&mut self) {
        T::unbind(self)
    }

    fn transmit(&mut self, frame: &[u8]) -> Result<usize, Self::Error> {
        T::transmit(self, frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alt125x_hal::mock::MockRegs;
    use alt125x_hal::{Line, UartConfig};

    #[test]
    fn test_uart_transport_writes_frame() {
        let mut ring = [0u8; 8];
        let mut uart = UartDriver::new(MockRegs::new(32), UartConfig::default(), &mut ring);

        uart.set_tx_enabled(false);
        assert_eq!(uart.bind(), Ok(()));
        assert!(uart.regs().line(Line::Tx));

        let frame = [0xF9, 0x07, 0xEF, 0x05, b'A', b'T', 0x00, 0xF9];
        assert_eq!(uart.transmit(&frame), Ok(8));
        uart.regs_mut().shift_out();
        assert_eq!(uart.regs().wire(), &frame);

        uart.unbind();
        assert!(!uart.regs().line(Line::Tx));
    }
}
