//! Virtual serial ports over the ALT125x serial multiplexer
//!
//! Several logical channels share one physical UART by wrapping their data
//! in multiplexer frames (see `alt125x-protocol`). This crate owns the
//! receive parser for each physical link, dispatches payload bytes to the
//! open virtual ports and exposes a per-port handle for sending and
//! receiving.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Emux                        registry of physical muxes       │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │ PhysicalMux             parser + transport + ports     │  │
//! │  │   on_byte_received ──► MuxParser ──► PortSlot[port]    │  │
//! │  │                                      ├ raw callback    │  │
//! │  │                                      ├ pending receive │  │
//! │  │                                      └ ring buffer     │  │
//! │  │   VirtualPort::send ──► FrameEncoder ──► Transport     │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The receive path must be driven from a single context (one receive
//! task or one interrupt chain); bytes of one link are never fed
//! concurrently.
//!
//! # Usage
//!
//! ```ignore
//! type Link = Serial<'static, CriticalSectionRawMutex, Regs>;
//! static SERIAL: StaticCell<Link> = StaticCell::new();
//! static EMUX: StaticCell<Emux<'static, CriticalSectionRawMutex, &'static Link, 1>> =
//!     StaticCell::new();
//!
//! let serial = SERIAL.init(Serial::new(UartDriver::new(regs, UartConfig::default(), RING.init([0; 256]))));
//! let emux = EMUX.init(Emux::new([&*serial], MuxConfig::default()));
//!
//! // UART interrupt handler:
//! serial.on_interrupt();
//!
//! // Receive task:
//! let mut chunk = [0u8; 64];
//! loop {
//!     let n = serial.read_available(&mut chunk).await;
//!     emux.mux(0)?.on_bytes_received(&chunk[..n]);
//! }
//!
//! // Application task:
//! let at = emux.open(0, 1, PORT_RING.init([0; 256]))?;
//! at.send(b"AT+CFUN?\r\n")?;
//! let (status, reply) = at.receive_timeout(BUF.init([0; 16]), Duration::from_millis(500)).await?;
//! ```

#![no_std]
#![deny(unsafe_code)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod emux;
pub mod error;
pub mod mux;
pub mod port;
pub mod transport;

pub use emux::Emux;
pub use error::{EmuxError, TransferStatus};
pub use mux::PhysicalMux;
pub use port::VirtualPort;
pub use transport::Transport;

pub use alt125x_drivers::{Receive, Received};
pub use alt125x_protocol::{MuxConfig, ParserStats};

/// Physical multiplexed links managed by one [`Emux`]
pub const MAX_MUX_COUNT: usize = 2;

/// Virtual ports per physical link
pub const VIRTUAL_SERIAL_COUNT: usize = 4;
