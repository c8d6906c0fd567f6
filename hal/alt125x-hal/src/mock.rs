//! In-memory UART register block
//!
//! Models the parts of the peripheral the transfer engine observes: a
//! bounded TX FIFO that drains onto a "wire" when the test says so, an RX
//! FIFO the test fills, level-triggered interrupt status and the line
//! controls.

use core::cell::Cell;

use heapless::{Deque, Vec};

use crate::uart::{DataWord, IrqMask, Line, UartConfig, UartRegs};

/// Hardware FIFO capacity
pub const FIFO_CAPACITY: usize = 32;

/// Bytes retained on the simulated wire
pub const WIRE_CAPACITY: usize = 4096;

/// Simulated UART register block
pub struct MockRegs {
    tx_depth: usize,
    tx_fifo: Deque<u8, FIFO_CAPACITY>,
    wire: Vec<u8, WIRE_CAPACITY>,
    rx_fifo: Deque<DataWord, FIFO_CAPACITY>,
    enabled: IrqMask,
    cts: bool,
    cts_delay: Cell<u32>,
    lines: [bool; 4],
    config: Option<UartConfig>,
}

impl Default for MockRegs {
    fn default() -> Self {
        Self::new(16)
    }
}

impl MockRegs {
    /// Create a register block whose TX FIFO holds `tx_depth` bytes
    pub fn new(tx_depth: usize) -> Self {
        Self {
            tx_depth: tx_depth.clamp(1, FIFO_CAPACITY),
            tx_fifo: Deque::new(),
            wire: Vec::new(),
            rx_fifo: Deque::new(),
            enabled: IrqMask::empty(),
            cts: true,
            cts_delay: Cell::new(0),
            lines: [false; 4],
            config: None,
        }
    }

    /// Deliver a clean byte into the RX FIFO; false if the FIFO is full
    pub fn inject(&mut self, byte: u8) -> bool {
        self.inject_word(DataWord::from_byte(byte))
    }

    /// Deliver a raw data word (byte + status) into the RX FIFO
    pub fn inject_word(&mut self, word: DataWord) -> bool {
        self.rx_fifo.push_back(word).is_ok()
    }

    /// Entries still waiting in the RX FIFO
    pub fn rx_fifo_len(&self) -> usize {
        self.rx_fifo.len()
    }

    /// Entries waiting in the TX FIFO
    pub fn tx_fifo_len(&self) -> usize {
        self.tx_fifo.len()
    }

    /// Shift everything in the TX FIFO out onto the wire
    pub fn shift_out(&mut self) -> usize {
        let mut shifted = 0;
        while let Some(byte) = self.tx_fifo.pop_front() {
            let _ = self.wire.push(byte);
            shifted += 1;
        }
        shifted
    }

    /// Bytes transmitted so far
    pub fn wire(&self) -> &[u8] {
        &self.wire
    }

    /// Drive the CTS input
    pub fn set_cts(&mut self, asserted: bool) {
        self.cts = asserted;
    }

    /// Report CTS deasserted for the next `polls` reads, then asserted
    pub fn assert_cts_after(&mut self, polls: u32) {
        self.cts = true;
        self.cts_delay.set(polls);
    }

    /// State of a line control
    pub fn line(&self, line: Line) -> bool {
        self.lines[line_index(line)]
    }

    /// Last configuration programmed
    pub fn config(&self) -> Option<UartConfig> {
        self.config
    }

    fn raw_interrupts(&self) -> IrqMask {
        let mut raw = IrqMask::empty();
        if self.tx_fifo.is_empty() {
            raw |= IrqMask::TX;
        }
        if !self.rx_fifo.is_empty() {
            raw |= IrqMask::RX;
        }
        raw
    }
}

fn line_index(line: Line) -> usize {
    match line {
        Line::Tx => 0,
        Line::Rx => 1,
        Line::Rts => 2,
        Line::Dtr => 3,
    }
}

impl UartRegs for MockRegs {
    fn configure(&mut self, config: &UartConfig) {
        self.config = Some(*config);
    }

    fn set_line(&mut self, line: Line, enabled: bool) {
        self.lines[line_index(line)] = enabled;
    }

    fn clear_to_send(&self) -> bool {
        let delay = self.cts_delay.get();
        if delay > 0 {
            self.cts_delay.set(delay - 1);
            return false;
        }
        self.cts
    }

    fn tx_fifo_full(&self) -> bool {
        self.tx_fifo.len() >= self.tx_depth
    }

    fn tx_busy(&self) -> bool {
        !self.tx_fifo.is_empty()
    }

    fn write_data(&mut self, byte: u8) {
        if !self.tx_fifo_full() {
            let _ = self.tx_fifo.push_back(byte);
        }
    }

    fn rx_fifo_empty(&self) -> bool {
        self.rx_fifo.is_empty()
    }

    fn read_data(&mut self) -> DataWord {
        self.rx_fifo.pop_front().unwrap_or(DataWord(0))
    }

    fn pending_interrupts(&self) -> IrqMask {
        self.raw_interrupts() & self.enabled
    }

    fn clear_interrupts(&mut self, _mask: IrqMask) {
        // Level-triggered: status follows FIFO state
    }

    fn enable_interrupts(&mut self, mask: IrqMask) {
        self.enabled |= mask;
    }

    fn disable_interrupts(&mut self, mask: IrqMask) {
        self.enabled &= !mask;
    }

    fn enabled_interrupts(&self) -> IrqMask {
        self.enabled
    }
}
