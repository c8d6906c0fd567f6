//! UART drivers for the ALT1250/ALT1255
//!
//! This crate provides the serial plumbing the multiplexer runs on:
//!
//! - [`ring::RingBuffer`] - fixed-capacity circular byte buffer over
//!   caller-supplied storage
//! - [`uart::UartDriver`] - interrupt-driven nonblocking transfer engine with
//!   a polling variant for bring-up paths
//! - [`serial::Serial`] - async read/write wrapper that shares one driver
//!   between interrupt and task context
//!
//! # Usage
//!
//! ```ignore
//! static RING: StaticCell<[u8; 256]> = StaticCell::new();
//! let uart = UartDriver::new(regs, UartConfig::default(), RING.init([0; 256]));
//! let serial = Serial::<CriticalSectionRawMutex, _>::new(uart);
//!
//! // UART interrupt handler:
//! serial.on_interrupt();
//!
//! // Task:
//! serial.write(b"AT\r\n").await?;
//! ```

#![no_std]
#![deny(unsafe_code)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod ring;
pub mod serial;
pub mod uart;

pub use ring::RingBuffer;
pub use serial::Serial;
pub use uart::{IrqEvents, Receive, Received, Transfer, UartDriver, UartError, UartStats};
