//! Interrupt-driven UART transfer engine
//!
//! One [`UartDriver`] owns one UART register block and a ring buffer over
//! caller storage. It offers two families of entry points:
//!
//! - **Nonblocking** ([`UartDriver::send_nonblock`],
//!   [`UartDriver::receive_nonblock`]): return immediately, either done or
//!   pending. Pending transfers are advanced by [`UartDriver::on_interrupt`],
//!   which reports completions as [`IrqEvents`].
//! - **Polling** ([`UartDriver::send_block`], [`UartDriver::receive_block`]):
//!   spin on FIFO status without involving interrupts or the ring buffer.
//!   Meant for bring-up and debug paths.
//!
//! At most one nonblocking transfer per direction may be outstanding; a
//! second request is rejected with [`UartError::Busy`].
//!
//! While no receive is outstanding, incoming bytes accumulate in the ring
//! buffer. When the ring fills, receive interrupts are masked until the next
//! receive call drains it.

mod blocking;
mod stats;

pub use blocking::Blocking;
pub use stats::UartStats;

use alt125x_hal::{DataWord, FlowControl, IrqMask, Line, RxErrors, UartConfig, UartRegs};
use bitflags::bitflags;

use crate::ring::RingBuffer;

/// Errors reported synchronously by the transfer engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UartError {
    /// Empty buffer or otherwise unusable argument
    InvalidParameter,
    /// A transfer in the same direction is already outstanding
    Busy,
    /// CTS was not asserted within the configured poll budget
    HandshakeTimeout,
    /// Break condition seen by a polling receive
    Break,
}

impl embedded_io::Error for UartError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            UartError::InvalidParameter => embedded_io::ErrorKind::InvalidInput,
            UartError::Busy => embedded_io::ErrorKind::Other,
            UartError::HandshakeTimeout => embedded_io::ErrorKind::TimedOut,
            UartError::Break => embedded_io::ErrorKind::Interrupted,
        }
    }
}

bitflags! {
    /// Notifications produced by one interrupt service pass
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqEvents: u8 {
        /// The outstanding nonblocking send finished
        const TX_COMPLETE = 1 << 0;
        /// The outstanding nonblocking receive filled its buffer
        const RX_COMPLETE = 1 << 1;
        /// A break condition was received
        const BREAK = 1 << 2;
        /// Received bytes were queued in the ring buffer
        const RX_BUFFERED = 1 << 3;
    }
}

/// Per-direction line state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineState {
    Idle,
    Busy,
}

/// Result of starting a nonblocking send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transfer {
    /// Everything fit into the FIFO
    Done,
    /// The rest goes out from the interrupt handler
    Pending,
}

/// Result of starting a nonblocking receive
#[derive(Debug, PartialEq, Eq)]
pub enum Receive<'d> {
    /// The ring buffer already held enough data; the buffer is full
    Done(&'d mut [u8]),
    /// `received` bytes are in place, the rest arrives by interrupt
    Pending { received: usize },
}

/// A receive buffer handed back to the caller
#[derive(Debug, PartialEq, Eq)]
pub struct Received<'d> {
    pub data: &'d mut [u8],
    /// Bytes written into `data`
    pub len: usize,
}

impl<'d> Received<'d> {
    /// The bytes actually received
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// The whole buffer was filled
    pub fn is_complete(&self) -> bool {
        self.len == self.data.len()
    }
}

struct TxChannel<'d> {
    state: LineState,
    data: &'d [u8],
    requested: usize,
    remaining: usize,
}

struct RxChannel<'d> {
    state: LineState,
    pending: Option<&'d mut [u8]>,
    completed: Option<&'d mut [u8]>,
    requested: usize,
    remaining: usize,
}

/// UART transfer engine for one peripheral instance
pub struct UartDriver<'d, R: UartRegs> {
    regs: R,
    config: UartConfig,
    ring: RingBuffer<'d>,
    tx: TxChannel<'d>,
    rx: RxChannel<'d>,
    /// Receive interrupts masked because the ring buffer filled
    rx_throttled: bool,
    stats: UartStats,
}

impl<'d, R: UartRegs> UartDriver<'d, R> {
    /// Configure the peripheral and start background reception into `ring`
    pub fn new(mut regs: R, config: UartConfig, ring: &'d mut [u8]) -> Self {
        regs.disable_interrupts(IrqMask::all());
        regs.configure(&config);
        regs.set_line(Line::Tx, true);
        regs.set_line(Line::Rx, true);
        if config.flow_control == FlowControl::RtsCts {
            regs.set_line(Line::Rts, true);
        }
        regs.enable_interrupts(IrqMask::RX_ANY);

        debug!(
            "UART up: {} baud, ring {} bytes",
            config.baudrate,
            ring.len()
        );

        Self {
            regs,
            config,
            ring: RingBuffer::new(ring),
            tx: TxChannel {
                state: LineState::Idle,
                data: &[],
                requested: 0,
                remaining: 0,
            },
            rx: RxChannel {
                state: LineState::Idle,
                pending: None,
                completed: None,
                requested: 0,
                remaining: 0,
            },
            rx_throttled: false,
            stats: UartStats::default(),
        }
    }

    /// Mask all interrupts, drop the line and hand the register block back
    ///
    /// Outstanding transfers are abandoned.
    pub fn uninitialize(mut self) -> R {
        self.regs.disable_interrupts(IrqMask::all());
        self.regs.set_line(Line::Tx, false);
        self.regs.set_line(Line::Rx, false);
        self.regs.set_line(Line::Rts, false);
        self.regs.set_line(Line::Dtr, false);
        debug!("UART down");
        self.regs
    }

    /// Start sending `data`
    ///
    /// Fills the transmit FIFO as far as it goes. If anything is left the
    /// transmit interrupt is unmasked and the remainder is pushed from
    /// [`Self::on_interrupt`], which reports [`IrqEvents::TX_COMPLETE`].
    pub fn send_nonblock(&mut self, data: &'d [u8]) -> Result<Transfer, UartError> {
        if data.is_empty() {
            return Err(UartError::InvalidParameter);
        }
        if self.tx.state == LineState::Busy {
            return Err(UartError::Busy);
        }
        self.handshake()?;

        self.tx = TxChannel {
            state: LineState::Busy,
            data,
            requested: data.len(),
            remaining: data.len(),
        };
        self.fill_tx_fifo();

        if self.tx.remaining == 0 {
            self.tx.state = LineState::Idle;
            trace!("TX {} bytes done inline", data.len());
            return Ok(Transfer::Done);
        }

        trace!("TX {} bytes, {} pending", data.len(), self.tx.remaining);
        self.regs.enable_interrupts(IrqMask::TX);
        Ok(Transfer::Pending)
    }

    /// Start receiving into `buf`
    ///
    /// Bytes already in the ring buffer are copied first. If they fill
    /// `buf` it comes straight back in [`Receive::Done`]; otherwise the rest
    /// is written by [`Self::on_interrupt`], which reports
    /// [`IrqEvents::RX_COMPLETE`] and leaves the buffer for
    /// [`Self::take_received`]. Until that buffer is taken, further
    /// receives fail with [`UartError::Busy`].
    pub fn receive_nonblock(&mut self, buf: &'d mut [u8]) -> Result<Receive<'d>, UartError> {
        if buf.is_empty() {
            return Err(UartError::InvalidParameter);
        }
        if self.rx.state == LineState::Busy || self.rx.completed.is_some() {
            return Err(UartError::Busy);
        }

        let received = self.ring.pop_into(buf);
        self.resume_rx();

        if received == buf.len() {
            self.rx.requested = received;
            self.rx.remaining = 0;
            trace!("RX {} bytes from ring", received);
            return Ok(Receive::Done(buf));
        }

        self.rx = RxChannel {
            state: LineState::Busy,
            requested: buf.len(),
            remaining: buf.len() - received,
            pending: Some(buf),
            completed: None,
        };
        Ok(Receive::Pending { received })
    }

    /// Service the UART interrupt
    ///
    /// Call from the interrupt handler (or from whatever context the board
    /// routes the UART interrupt to). Never blocks.
    pub fn on_interrupt(&mut self) -> IrqEvents {
        let pending = self.regs.pending_interrupts();
        let mut events = IrqEvents::empty();

        if pending.intersects(IrqMask::RX_ANY) {
            self.service_rx(&mut events);
        }
        if pending.contains(IrqMask::TX) {
            self.service_tx(&mut events);
        }

        self.regs.clear_interrupts(pending);
        events
    }

    /// Cancel the outstanding send
    ///
    /// Returns the number of bytes handed to the FIFO, or `None` if no send
    /// was outstanding.
    pub fn abort_send(&mut self) -> Option<usize> {
        if self.tx.state == LineState::Idle {
            return None;
        }
        self.regs.disable_interrupts(IrqMask::TX);
        self.tx.state = LineState::Idle;

        let sent = self.tx_count();
        debug!("TX aborted after {} bytes", sent);
        Some(sent)
    }

    /// Cancel the outstanding receive and return its buffer
    ///
    /// Receive interrupts stay masked until the next receive call.
    pub fn abort_receive(&mut self) -> Option<Received<'d>> {
        if self.rx.state == LineState::Idle {
            return None;
        }
        self.regs.disable_interrupts(IrqMask::RX_ANY);
        self.rx_throttled = true;
        self.rx.state = LineState::Idle;

        let len = self.rx_count();
        debug!("RX aborted after {} bytes", len);
        self.rx.pending.take().map(|data| Received { data, len })
    }

    /// Copy bytes waiting in the ring buffer into `buf`
    ///
    /// Starts no transfer, so `buf` is only borrowed for the call. This is
    /// the path for consumers that process the byte stream as it arrives.
    /// Resumes receive interrupts paused by a full ring.
    pub fn read_buffered(&mut self, buf: &mut [u8]) -> usize {
        let count = self.ring.pop_into(buf);
        if count > 0 {
            self.resume_rx();
        }
        count
    }

    /// Take the buffer of a receive completed by the interrupt handler
    pub fn take_received(&mut self) -> Option<&'d mut [u8]> {
        self.rx.completed.take()
    }

    /// Bytes of the current (or last) send handed to the FIFO
    pub fn tx_count(&self) -> usize {
        self.tx.requested - self.tx.remaining
    }

    /// Bytes of the current (or last) receive written to its buffer
    pub fn rx_count(&self) -> usize {
        self.rx.requested - self.rx.remaining
    }

    pub fn is_tx_busy(&self) -> bool {
        self.tx.state == LineState::Busy
    }

    pub fn is_rx_busy(&self) -> bool {
        self.rx.state == LineState::Busy
    }

    /// Bytes waiting in the ring buffer
    pub fn buffered(&self) -> usize {
        self.ring.len()
    }

    pub fn stats(&self) -> UartStats {
        self.stats
    }

    pub fn config(&self) -> &UartConfig {
        &self.config
    }

    pub fn set_tx_enabled(&mut self, enabled: bool) {
        self.regs.set_line(Line::Tx, enabled);
    }

    pub fn set_rx_enabled(&mut self, enabled: bool) {
        self.regs.set_line(Line::Rx, enabled);
    }

    pub fn set_rts(&mut self, asserted: bool) {
        self.regs.set_line(Line::Rts, asserted);
    }

    pub fn set_dtr(&mut self, asserted: bool) {
        self.regs.set_line(Line::Dtr, asserted);
    }

    /// Register block access for board bring-up
    pub fn regs(&self) -> &R {
        &self.regs
    }

    /// Mutable register block access for board bring-up
    ///
    /// Touching FIFOs or interrupt masks behind the driver's back breaks
    /// its transfer bookkeeping.
    pub fn regs_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    fn handshake(&mut self) -> Result<(), UartError> {
        if self.config.flow_control != FlowControl::RtsCts {
            return Ok(());
        }
        for _ in 0..self.config.handshake_polls.max(1) {
            if self.regs.clear_to_send() {
                return Ok(());
            }
        }
        warn!("CTS handshake timed out");
        Err(UartError::HandshakeTimeout)
    }

    fn fill_tx_fifo(&mut self) {
        while self.tx.remaining > 0 && !self.regs.tx_fifo_full() {
            let index = self.tx.requested - self.tx.remaining;
            self.regs.write_data(self.tx.data[index]);
            self.tx.remaining -= 1;
            self.stats.tx_bytes = self.stats.tx_bytes.wrapping_add(1);
        }
    }

    fn service_tx(&mut self, events: &mut IrqEvents) {
        if self.tx.state == LineState::Idle {
            self.regs.disable_interrupts(IrqMask::TX);
            return;
        }

        self.fill_tx_fifo();

        if self.tx.remaining == 0 {
            self.regs.disable_interrupts(IrqMask::TX);
            self.tx.state = LineState::Idle;
            *events |= IrqEvents::TX_COMPLETE;
        }
    }

    fn service_rx(&mut self, events: &mut IrqEvents) {
        while !self.regs.rx_fifo_empty() {
            if self.rx.state == LineState::Idle && self.ring.is_full() {
                self.regs.disable_interrupts(IrqMask::RX_ANY);
                self.rx_throttled = true;
                self.stats.rx_throttles = self.stats.rx_throttles.wrapping_add(1);
                warn!("RX ring full, receive interrupts paused");
                break;
            }

            let word = self.regs.read_data();
            if !self.check_word(word, events) {
                continue;
            }
            self.stats.rx_bytes = self.stats.rx_bytes.wrapping_add(1);

            match self.rx.pending.as_deref_mut() {
                Some(buf) if self.rx.state == LineState::Busy => {
                    let index = self.rx.requested - self.rx.remaining;
                    buf[index] = word.byte();
                    self.rx.remaining -= 1;

                    if self.rx.remaining == 0 {
                        self.rx.state = LineState::Idle;
                        self.rx.completed = self.rx.pending.take();
                        *events |= IrqEvents::RX_COMPLETE;
                    }
                }
                _ => {
                    if self.ring.push(word.byte()) {
                        *events |= IrqEvents::RX_BUFFERED;
                    }
                }
            }
        }
    }

    /// Account for the status bits of one received word
    ///
    /// Returns false if the word carries no data (break).
    fn check_word(&mut self, word: DataWord, events: &mut IrqEvents) -> bool {
        let errors = word.errors();
        if errors.is_empty() {
            return true;
        }

        self.stats.record_errors(errors);
        if errors.contains(RxErrors::BREAK) {
            debug!("RX break");
            *events |= IrqEvents::BREAK;
            return false;
        }

        warn!("RX error status {}", errors.bits());
        true
    }

    fn resume_rx(&mut self) {
        if self.rx_throttled {
            self.regs.enable_interrupts(IrqMask::RX_ANY);
            self.rx_throttled = false;
            trace!("RX interrupts resumed");
        }
    }
}
