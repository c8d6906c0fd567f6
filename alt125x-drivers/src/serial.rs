//! Async serial wrapper
//!
//! [`Serial`] shares one [`UartDriver`] between the UART interrupt and any
//! number of tasks. Tasks start nonblocking transfers and wait on a
//! [`Signal`] that the interrupt side raises on completion or abort.
//!
//! ```ignore
//! static SERIAL: StaticCell<Serial<'static, CriticalSectionRawMutex, Regs>> = StaticCell::new();
//!
//! #[interrupt]
//! fn UART0() {
//!     SERIAL.on_interrupt();
//! }
//!
//! let n = serial.write(b"AT\r\n").await?;
//! ```

use core::cell::RefCell;

use alt125x_hal::UartRegs;
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;

use crate::uart::{IrqEvents, Receive, Received, Transfer, UartDriver, UartError};

/// UART driver shared between interrupt and task context
pub struct Serial<'d, M: RawMutex, R: UartRegs> {
    uart: Mutex<M, RefCell<UartDriver<'d, R>>>,
    /// Bytes handed to the FIFO when a send finished or was aborted
    tx_done: Signal<M, usize>,
    /// Buffer of a receive that finished or was aborted
    rx_done: Signal<M, Received<'d>>,
    /// Raised when bytes land in the ring buffer
    rx_ready: Signal<M, ()>,
    rx_break: Signal<M, ()>,
}

impl<'d, M: RawMutex, R: UartRegs> Serial<'d, M, R> {
    pub fn new(uart: UartDriver<'d, R>) -> Self {
        Self {
            uart: Mutex::new(RefCell::new(uart)),
            tx_done: Signal::new(),
            rx_done: Signal::new(),
            rx_ready: Signal::new(),
            rx_break: Signal::new(),
        }
    }

    /// Service the UART interrupt and wake waiting tasks
    pub fn on_interrupt(&self) {
        let (events, sent, received) = self.uart.lock(|uart| {
            let mut uart = uart.borrow_mut();
            let events = uart.on_interrupt();
            let sent = uart.tx_count();
            let received = if events.contains(IrqEvents::RX_COMPLETE) {
                uart.take_received()
            } else {
                None
            };
            (events, sent, received)
        });

        if events.contains(IrqEvents::TX_COMPLETE) {
            self.tx_done.signal(sent);
        }
        if let Some(data) = received {
            let len = data.len();
            self.rx_done.signal(Received { data, len });
        }
        if events.contains(IrqEvents::RX_BUFFERED) {
            self.rx_ready.signal(());
        }
        if events.contains(IrqEvents::BREAK) {
            self.rx_break.signal(());
        }
    }

    /// Send all of `data`
    ///
    /// A send refused with [`UartError::HandshakeTimeout`] is retried until
    /// the peer raises CTS. Returns the number of bytes sent, which is less
    /// than `data.len()` if [`Self::abort_write`] cancelled the transfer.
    pub async fn write(&self, data: &'d [u8]) -> Result<usize, UartError> {
        self.tx_done.reset();
        loop {
            let result = self.with_driver(|uart| uart.send_nonblock(data));
            match result {
                Ok(Transfer::Done) => return Ok(data.len()),
                Ok(Transfer::Pending) => break,
                Err(UartError::HandshakeTimeout) => {
                    trace!("write: handshake timeout, retrying");
                    yield_now().await;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(self.tx_done.wait().await)
    }

    /// Fill `buf`
    ///
    /// Completes immediately if the ring buffer already holds enough data.
    /// The returned buffer is short if [`Self::abort_read`] cancelled the
    /// transfer.
    pub async fn read(&self, buf: &'d mut [u8]) -> Result<Received<'d>, UartError> {
        self.rx_done.reset();
        let receive = self.with_driver(|uart| uart.receive_nonblock(buf))?;
        match receive {
            Receive::Done(data) => {
                let len = data.len();
                Ok(Received { data, len })
            }
            Receive::Pending { .. } => Ok(self.rx_done.wait().await),
        }
    }

    /// Wait for received bytes and copy what is buffered into `buf`
    ///
    /// Returns as soon as at least one byte is available. Bytes claimed by
    /// an in-flight [`Self::read`] do not count. This is the feed for a
    /// receive task that hands the stream to a protocol parser.
    pub async fn read_available(&self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        loop {
            let count = self.with_driver(|uart| uart.read_buffered(buf));
            if count > 0 {
                return count;
            }
            self.rx_ready.wait().await;
        }
    }

    /// Cancel an in-flight [`Self::write`], waking it with the partial count
    pub fn abort_write(&self) -> Option<usize> {
        let sent = self.with_driver(|uart| uart.abort_send())?;
        self.tx_done.signal(sent);
        Some(sent)
    }

    /// Cancel an in-flight [`Self::read`], waking it with the partial buffer
    pub fn abort_read(&self) -> Option<usize> {
        let received = self.with_driver(|uart| uart.abort_receive())?;
        let len = received.len;
        self.rx_done.signal(received);
        Some(len)
    }

    /// Wait for the next break condition on the line
    pub async fn wait_break(&self) {
        self.rx_break.wait().await
    }

    /// Run `f` with exclusive access to the driver
    pub fn with_driver<T>(&self, f: impl FnOnce(&mut UartDriver<'d, R>) -> T) -> T {
        self.uart.lock(|uart| f(&mut uart.borrow_mut()))
    }
}
