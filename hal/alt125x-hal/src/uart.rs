//! UART register-block abstraction
//!
//! The ALT125x UART is a PL011-style peripheral: separate TX and RX FIFOs,
//! a data register that carries per-byte error status, and a masked
//! interrupt status register. [`UartRegs`] is the minimal surface the
//! transfer engine needs from it.

use bitflags::bitflags;

bitflags! {
    /// UART interrupt sources
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqMask: u16 {
        /// Receive FIFO reached its trigger level
        const RX = 1 << 4;
        /// Transmit FIFO drained to its trigger level
        const TX = 1 << 5;
        /// Receive FIFO not empty and line idle for 32 bit periods
        const RX_TIMEOUT = 1 << 6;
        /// Any receive-side source
        const RX_ANY = Self::RX.bits() | Self::RX_TIMEOUT.bits();
    }
}

bitflags! {
    /// Error status carried in the upper bits of a received data word
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RxErrors: u16 {
        const FRAMING = 1 << 8;
        const PARITY = 1 << 9;
        const BREAK = 1 << 10;
        const OVERRUN = 1 << 11;
    }
}

/// One entry read from the receive FIFO: data byte plus error status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataWord(pub u16);

impl DataWord {
    /// A clean data word carrying `byte`
    pub const fn from_byte(byte: u8) -> Self {
        Self(byte as u16)
    }

    /// A data word carrying `byte` with the given error bits set
    pub const fn with_errors(byte: u8, errors: RxErrors) -> Self {
        Self(byte as u16 | errors.bits())
    }

    /// The received byte
    pub const fn byte(self) -> u8 {
        self.0 as u8
    }

    /// Error bits reported by the hardware for this byte
    pub const fn errors(self) -> RxErrors {
        RxErrors::from_bits_truncate(self.0)
    }
}

/// Modem/line control signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Line {
    /// Transmitter enable
    Tx,
    /// Receiver enable
    Rx,
    /// Request-to-send output
    Rts,
    /// Data-terminal-ready output
    Dtr,
}

/// UART register block
///
/// Every method is a single register access or a read-modify-write of one
/// register; no method blocks.
pub trait UartRegs {
    /// Program baud rate, frame format and flow control
    fn configure(&mut self, config: &UartConfig);

    /// Drive one of the line/enable controls
    fn set_line(&mut self, line: Line, enabled: bool);

    /// Clear-to-send input is asserted by the peer
    fn clear_to_send(&self) -> bool;

    /// Transmit FIFO cannot accept another byte
    fn tx_fifo_full(&self) -> bool;

    /// Transmitter is still shifting data out
    fn tx_busy(&self) -> bool;

    /// Push one byte into the transmit FIFO
    fn write_data(&mut self, byte: u8);

    /// Receive FIFO holds no data
    fn rx_fifo_empty(&self) -> bool;

    /// Pop one entry from the receive FIFO
    fn read_data(&mut self) -> DataWord;

    /// Masked interrupt status
    fn pending_interrupts(&self) -> IrqMask;

    /// Acknowledge interrupt sources
    fn clear_interrupts(&mut self, mask: IrqMask);

    /// Unmask interrupt sources
    fn enable_interrupts(&mut self, mask: IrqMask);

    /// Mask interrupt sources
    fn disable_interrupts(&mut self, mask: IrqMask);

    /// Currently unmasked interrupt sources
    fn enabled_interrupts(&self) -> IrqMask;
}

/// UART configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UartConfig {
    /// Baud rate in bits per second
    pub baudrate: u32,
    /// Number of data bits (typically 8)
    pub data_bits: DataBits,
    /// Parity mode
    pub parity: Parity,
    /// Number of stop bits
    pub stop_bits: StopBits,
    /// Hardware handshake
    pub flow_control: FlowControl,
    /// CTS polls before a send gives up with a handshake timeout
    pub handshake_polls: u32,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            baudrate: 115200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            handshake_polls: 1000,
        }
    }
}

/// Number of data bits per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

/// Parity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Number of stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StopBits {
    One,
    Two,
}

/// Hardware flow control mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlowControl {
    None,
    RtsCts,
}
