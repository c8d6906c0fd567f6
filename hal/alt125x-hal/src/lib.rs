//! ALT125x Hardware Abstraction Layer
//!
//! This crate defines the hardware surface the ALT1250/ALT1255 drivers are
//! written against. Board crates implement these traits on top of the real
//! memory-mapped peripherals; host tests implement them with
//! [`mock::MockRegs`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  alt125x-emux (virtual serial ports)    │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  alt125x-drivers (UART transfer engine) │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  alt125x-hal (this crate - traits)      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Traits
//!
//! - [`uart::UartRegs`] - UART register block (FIFOs, interrupts, lines)

#![no_std]
#![deny(unsafe_code)]

#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod uart;

// Re-export key types at crate root for convenience
pub use uart::{DataWord, FlowControl, IrqMask, Line, RxErrors, UartConfig, UartRegs};
