//! One physical multiplexed link
//!
//! A [`PhysicalMux`] owns the receive parser, the transport and a fixed
//! table of port slots. Received bytes go through the parser one at a time;
//! payload bytes of accepted frames are handed to the addressed slot under
//! that slot's mutex. Each slot delivers a byte to the first of these that
//! applies:
//!
//! 1. the raw byte callback, if one is installed
//! 2. the pending receive buffer, if it still has room
//! 3. the background ring buffer, if it is not full
//!
//! Otherwise the byte is dropped.

use core::cell::RefCell;

use alt125x_drivers::{Received, RingBuffer};
use alt125x_protocol::{MuxConfig, MuxParser, ParseEvent, ParserStats};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use embassy_time::Instant;

use crate::error::EmuxError;
use crate::port::VirtualPort;
use crate::transport::Transport;
use crate::VIRTUAL_SERIAL_COUNT;

/// How a pending receive reports completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    /// Hand the buffer over through the completion signal
    Notify,
    /// Wake the task blocked in `receive_timeout`, which takes the buffer
    Wait,
}

pub(crate) struct Pending<'b> {
    pub(crate) buf: &'b mut [u8],
    pub(crate) filled: usize,
    pub(crate) mode: Completion,
}

impl<'b> Pending<'b> {
    fn is_full(&self) -> bool {
        self.filled == self.buf.len()
    }

    pub(crate) fn into_received(self) -> Received<'b> {
        Received {
            data: self.buf,
            len: self.filled,
        }
    }
}

pub(crate) struct PortState<'b> {
    pub(crate) open: bool,
    pub(crate) ring: Option<RingBuffer<'b>>,
    pub(crate) pending: Option<Pending<'b>>,
    pub(crate) raw: Option<&'b (dyn Fn(u8) + Sync)>,
}

impl PortState<'_> {
    const fn closed() -> Self {
        Self {
            open: false,
            ring: None,
            pending: None,
            raw: None,
        }
    }

    /// A receive or the raw callback already owns incoming bytes
    pub(crate) fn is_receiving(&self) -> bool {
        self.pending.is_some() || self.raw.is_some()
    }
}

/// Receive state of one virtual port
pub(crate) struct PortSlot<'b, M: RawMutex> {
    pub(crate) state: Mutex<M, RefCell<PortState<'b>>>,
    /// Raised when a `Wait` receive fills its buffer
    pub(crate) filled: Signal<M, ()>,
    /// Carries the buffer of a finished `Notify` receive
    pub(crate) completed: Signal<M, Received<'b>>,
}

impl<'b, M: RawMutex> PortSlot<'b, M> {
    const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(PortState::closed())),
            filled: Signal::new(),
            completed: Signal::new(),
        }
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut PortState<'b>) -> R) -> R {
        self.state.lock(|state| f(&mut state.borrow_mut()))
    }

    /// Take the pending receive if it was started in `mode`
    pub(crate) fn take_pending(&self, mode: Completion) -> Option<Received<'b>> {
        self.with_state(|state| {
            let matches = state.pending.as_ref().is_some_and(|p| p.mode == mode);
            if matches {
                state.pending.take().map(Pending::into_received)
            } else {
                None
            }
        })
    }

    fn deliver(&self, byte: u8) -> bool {
        // Called with the slot unlocked so the callback may use the port
        let raw = self.with_state(|state| state.raw.filter(|_| state.open));
        if let Some(raw) = raw {
            raw(byte);
            return true;
        }

        self.with_state(|state| {
            if !state.open {
                return false;
            }

            if let Some(pending) = state.pending.as_mut().filter(|p| !p.is_full()) {
                pending.buf[pending.filled] = byte;
                pending.filled += 1;
                if pending.is_full() {
                    let mode = pending.mode;
                    match mode {
                        Completion::Wait => self.filled.signal(()),
                        Completion::Notify => {
                            if let Some(done) = state.pending.take() {
                                self.completed.signal(done.into_received());
                            }
                        }
                    }
                }
                return true;
            }

            match state.ring.as_mut() {
                Some(ring) => ring.push(byte),
                None => false,
            }
        })
    }
}

struct Link<T> {
    transport: T,
    open_ports: usize,
}

/// Parser, transport and port table of one physical link
pub struct PhysicalMux<'b, M: RawMutex, T: Transport, const PORTS: usize = VIRTUAL_SERIAL_COUNT>
{
    id: u8,
    link: Mutex<M, RefCell<Link<T>>>,
    parser: Mutex<M, RefCell<MuxParser>>,
    ports: [PortSlot<'b, M>; PORTS],
}

impl<'b, M: RawMutex, T: Transport, const PORTS: usize> PhysicalMux<'b, M, T, PORTS> {
    pub fn new(id: u8, transport: T, config: MuxConfig) -> Self {
        Self {
            id,
            link: Mutex::new(RefCell::new(Link {
                transport,
                open_ports: 0,
            })),
            parser: Mutex::new(RefCell::new(MuxParser::new(config))),
            ports: core::array::from_fn(|_| PortSlot::new()),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    /// Open virtual port `port_id`
    ///
    /// `ring` backs the port's background buffer; one slot stays unused, so
    /// it must be at least two bytes. The transport is bound when the first
    /// port of this link opens.
    pub fn open(
        &self,
        port_id: u8,
        ring: &'b mut [u8],
    ) -> Result<VirtualPort<'_, 'b, M, T, PORTS>, EmuxError<T::Error>> {
        let slot = self
            .ports
            .get(usize::from(port_id))
            .ok_or(EmuxError::InvalidPort)?;
        if ring.len() < 2 {
            return Err(EmuxError::BufferTooSmall);
        }

        let claimed = slot.with_state(|state| !core::mem::replace(&mut state.open, true));
        if !claimed {
            return Err(EmuxError::PortInUse);
        }

        let bound: Result<(), T::Error> = self.link.lock(|link| {
            let mut link = link.borrow_mut();
            if link.open_ports == 0 {
                link.transport.bind()?;
                debug!("mux {}: transport bound", self.id);
            }
            link.open_ports += 1;
            Ok(())
        });
        if let Err(e) = bound {
            warn!("mux {}: transport bind failed, port {} not opened", self.id, port_id);
            slot.with_state(|state| state.open = false);
            return Err(EmuxError::Transport(e));
        }

        slot.with_state(|state| {
            state.ring = Some(RingBuffer::new(ring));
            state.pending = None;
            state.raw = None;
        });
        slot.filled.reset();
        slot.completed.reset();

        info!("mux {}: port {} open", self.id, port_id);
        Ok(VirtualPort::new(self, port_id))
    }

    /// Feed one byte received on the physical link
    pub fn on_byte_received(&self, byte: u8) {
        self.on_byte_received_at(byte, Instant::now().as_millis());
    }

    /// Feed a chunk of bytes received on the physical link
    pub fn on_bytes_received(&self, bytes: &[u8]) {
        let now_ms = Instant::now().as_millis();
        for &byte in bytes {
            self.on_byte_received_at(byte, now_ms);
        }
    }

    /// Feed one byte with an explicit arrival time in milliseconds
    pub fn on_byte_received_at(&self, byte: u8, now_ms: u64) {
        self.parser.lock(|parser| {
            let mut parser = parser.borrow_mut();
            let boot_port = parser.config().boot_port;
            match parser.feed(byte, now_ms) {
                Some(ParseEvent::Frame { port, payload }) => {
                    let dropped = payload
                        .iter()
                        .filter(|&&b| !self.deliver(port, b))
                        .count();
                    if dropped > 0 {
                        debug!(
                            "mux {}: port {} dropped {} of {} bytes",
                            self.id,
                            port,
                            dropped,
                            payload.len()
                        );
                    }
                }
                Some(ParseEvent::BootText(b)) => {
                    self.deliver(boot_port, b);
                }
                Some(ParseEvent::EscapeReset) => {
                    info!("mux {}: escape sequence received", self.id);
                }
                None => {}
            }
        });
    }

    fn deliver(&self, port: u8, byte: u8) -> bool {
        match self.ports.get(usize::from(port)) {
            Some(slot) => slot.deliver(byte),
            None => {
                warn!("mux {}: frame for unknown port {}", self.id, port);
                false
            }
        }
    }

    /// Receive parser counters
    pub fn parser_stats(&self) -> ParserStats {
        self.parser.lock(|parser| parser.borrow().stats())
    }

    /// Ports currently open on this link
    pub fn open_ports(&self) -> usize {
        self.link.lock(|link| link.borrow().open_ports)
    }

    /// Run `f` with exclusive access to the transport
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.link.lock(|link| f(&mut link.borrow_mut().transport))
    }

    pub(crate) fn transmit(&self, frame: &[u8]) -> Result<usize, EmuxError<T::Error>> {
        self.with_transport(|transport| transport.transmit(frame))
            .map_err(EmuxError::Transport)
    }

    pub(crate) fn slot(&self, port: u8) -> Option<&PortSlot<'b, M>> {
        self.ports.get(usize::from(port))
    }

    pub(crate) fn release(&self, port: u8) {
        let Some(slot) = self.slot(port) else {
            return;
        };
        slot.with_state(|state| *state = PortState::closed());
        slot.filled.reset();
        slot.completed.reset();

        self.link.lock(|link| {
            let mut link = link.borrow_mut();
            link.open_ports = link.open_ports.saturating_sub(1);
            if link.open_ports == 0 {
                link.transport.unbind();
                debug!("mux {}: transport unbound", self.id);
            }
        });
        info!("mux {}: port {} closed", self.id, port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU8, Ordering};
    use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};

    type Slot<'b> = PortSlot<'b, NoopRawMutex>;

    fn open_slot<'b>(ring: &'b mut [u8]) -> Slot<'b> {
        let slot = Slot::new();
        slot.with_state(|state| {
            state.open = true;
            state.ring = Some(RingBuffer::new(ring));
        });
        slot
    }

    #[test]
    fn test_closed_slot_drops_bytes() {
        let slot = Slot::new();
        assert!(!slot.deliver(b'x'));
    }

    #[test]
    fn test_pending_buffer_before_ring() {
        let mut ring = [0u8; 8];
        let mut buf = [0u8; 2];
        let slot = open_slot(&mut ring);
        slot.with_state(|state| {
            state.pending = Some(Pending {
                buf: &mut buf,
                filled: 0,
                mode: Completion::Wait,
            });
        });

        for byte in *b"abc" {
            assert!(slot.deliver(byte));
        }

        assert!(slot.filled.signaled());
        let received = slot.take_pending(Completion::Wait).unwrap();
        assert_eq!(received.bytes(), b"ab");
        assert_eq!(slot.with_state(|state| state.ring.as_ref().map(|r| r.len())), Some(1));
    }

    #[test]
    fn test_notify_hands_buffer_over() {
        let mut ring = [0u8; 8];
        let mut buf = [0u8; 1];
        let slot = open_slot(&mut ring);
        slot.with_state(|state| {
            state.pending = Some(Pending {
                buf: &mut buf,
                filled: 0,
                mode: Completion::Notify,
            });
        });

        slot.deliver(b'!');
        assert!(slot.take_pending(Completion::Notify).is_none());
        assert_eq!(slot.completed.try_take().unwrap().bytes(), b"!");
    }

    #[test]
    fn test_take_pending_checks_mode() {
        let mut ring = [0u8; 8];
        let mut buf = [0u8; 4];
        let slot = open_slot(&mut ring);
        slot.with_state(|state| {
            state.pending = Some(Pending {
                buf: &mut buf,
                filled: 0,
                mode: Completion::Notify,
            });
        });

        assert!(slot.take_pending(Completion::Wait).is_none());
        assert!(slot.take_pending(Completion::Notify).is_some());
    }

    static SHARED: PortSlot<'static, CriticalSectionRawMutex> = PortSlot::new();
    static LAST: AtomicU8 = AtomicU8::new(0);

    fn stop_after_first(byte: u8) {
        LAST.store(byte, Ordering::Relaxed);
        SHARED.with_state(|state| state.raw = None);
    }

    #[test]
    fn test_raw_callback_may_stop_itself() {
        let callback: &'static (dyn Fn(u8) + Sync) = &stop_after_first;
        SHARED.with_state(|state| {
            state.open = true;
            state.raw = Some(callback);
        });

        assert!(SHARED.deliver(b'a'));
        assert_eq!(LAST.load(Ordering::Relaxed), b'a');
        assert!(SHARED.with_state(|state| state.raw.is_none()));

        // No ring installed, so the next byte has nowhere to go
        assert!(!SHARED.deliver(b'b'));
    }

    #[test]
    fn test_full_ring_rejects() {
        let mut ring = [0u8; 3];
        let slot = open_slot(&mut ring);
        assert!(slot.deliver(1));
        assert!(slot.deliver(2));
        assert!(!slot.deliver(3));
    }
}
