//! Virtual port handle
//!
//! A [`VirtualPort`] is the only way to use an open port. Dropping it (or
//! calling [`VirtualPort::close`]) frees the slot for the next `open`.
//!
//! Receiving works in one of three mutually exclusive modes:
//!
//! - [`VirtualPort::receive_nonblock`]: fill a buffer from the background
//!   ring, and if more is needed leave it pending. A pending buffer is
//!   collected with [`VirtualPort::wait_receive`] or
//!   [`VirtualPort::try_take_receive`].
//! - [`VirtualPort::receive_timeout`]: same, but wait for completion up to
//!   a timeout and always hand the buffer back.
//! - [`VirtualPort::start_rx_event_callback`]: every byte goes straight to
//!   a callback and nothing is buffered.

use alt125x_drivers::{Receive, Received};
use alt125x_protocol::FrameEncoder;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{with_timeout, Duration};

use crate::error::{EmuxError, TransferStatus};
use crate::mux::{Completion, Pending, PhysicalMux, PortSlot};
use crate::transport::Transport;
use crate::VIRTUAL_SERIAL_COUNT;

/// Handle to an open virtual port
pub struct VirtualPort<
    'm,
    'b,
    M: RawMutex,
    T: Transport,
    const PORTS: usize = VIRTUAL_SERIAL_COUNT,
> {
    mux: &'m PhysicalMux<'b, M, T, PORTS>,
    port: u8,
}

impl<'m, 'b, M: RawMutex, T: Transport, const PORTS: usize> VirtualPort<'m, 'b, M, T, PORTS> {
    pub(crate) fn new(mux: &'m PhysicalMux<'b, M, T, PORTS>, port: u8) -> Self {
        Self { mux, port }
    }

    pub fn port_id(&self) -> u8 {
        self.port
    }

    pub fn mux_id(&self) -> u8 {
        self.mux.id()
    }

    /// Send `data` on this port
    ///
    /// Data longer than one frame is split into several frames. Returns
    /// `data.len()` once every frame was accepted by the transport.
    pub fn send(&self, data: &[u8]) -> Result<usize, EmuxError<T::Error>> {
        let mut encoder = FrameEncoder::new(self.port, data)?;
        while let Some(frame) = encoder.next_frame() {
            let sent = self.mux.transmit(frame)?;
            if sent != frame.len() {
                warn!(
                    "mux {} port {}: transport took {} of {} bytes",
                    self.mux.id(),
                    self.port,
                    sent,
                    frame.len()
                );
                return Err(EmuxError::ShortWrite);
            }
        }
        trace!("mux {} port {}: sent {} bytes", self.mux.id(), self.port, data.len());
        Ok(data.len())
    }

    /// Start filling `buf`
    ///
    /// Bytes already in the background ring are copied first. If that fills
    /// `buf` it comes straight back in [`Receive::Done`]; otherwise the
    /// rest arrives as frames are received, and the filled buffer is
    /// collected with [`Self::wait_receive`] or [`Self::try_take_receive`].
    ///
    /// Fails with [`EmuxError::Busy`] while another receive is pending, its
    /// result has not been collected, or the raw byte callback is active.
    pub fn receive_nonblock(&self, buf: &'b mut [u8]) -> Result<Receive<'b>, EmuxError<T::Error>> {
        if buf.is_empty() {
            return Err(EmuxError::InvalidParameter);
        }
        let slot = self.slot()?;
        if slot.completed.signaled() {
            return Err(EmuxError::Busy);
        }

        slot.with_state(|state| {
            if state.is_receiving() {
                return Err(EmuxError::Busy);
            }
            let filled = match state.ring.as_mut() {
                Some(ring) => ring.pop_into(buf),
                None => 0,
            };
            if filled == buf.len() {
                return Ok(Receive::Done(buf));
            }
            state.pending = Some(Pending {
                buf,
                filled,
                mode: Completion::Notify,
            });
            Ok(Receive::Pending { received: filled })
        })
    }

    /// Wait for the pending nonblocking receive to fill its buffer
    pub async fn wait_receive(&self) -> Result<Received<'b>, EmuxError<T::Error>> {
        Ok(self.slot()?.completed.wait().await)
    }

    /// Collect a completed nonblocking receive, if there is one
    pub fn try_take_receive(&self) -> Option<Received<'b>> {
        self.slot().ok()?.completed.try_take()
    }

    /// Abandon the pending receive, returning its buffer as filled so far
    ///
    /// A task blocked in [`Self::receive_timeout`] wakes with
    /// [`EmuxError::Cancelled`].
    pub fn cancel_receive(&self) -> Option<Received<'b>> {
        let slot = self.slot().ok()?;
        let pending = slot.with_state(|state| state.pending.take())?;
        if pending.mode == Completion::Wait {
            slot.filled.signal(());
        }
        debug!(
            "mux {} port {}: receive cancelled after {} bytes",
            self.mux.id(),
            self.port,
            pending.filled
        );
        Some(pending.into_received())
    }

    /// Fill `buf`, waiting at most `timeout` for the rest to arrive
    ///
    /// The buffer is always handed back: complete with
    /// [`TransferStatus::Success`], or with whatever arrived and
    /// [`TransferStatus::Timeout`]. The pending state is cleared on return,
    /// and also if the future is dropped while waiting.
    pub async fn receive_timeout(
        &self,
        buf: &'b mut [u8],
        timeout: Duration,
    ) -> Result<(TransferStatus, Received<'b>), EmuxError<T::Error>> {
        if buf.is_empty() {
            return Err(EmuxError::InvalidParameter);
        }
        let slot = self.slot()?;
        if slot.completed.signaled() {
            return Err(EmuxError::Busy);
        }

        let ready = slot.with_state(|state| {
            if state.is_receiving() {
                return Err(EmuxError::Busy);
            }
            let filled = match state.ring.as_mut() {
                Some(ring) => ring.pop_into(buf),
                None => 0,
            };
            if filled == buf.len() {
                return Ok(Some(Received { data: buf, len: filled }));
            }
            // Stale wakeup from an earlier wait
            slot.filled.reset();
            state.pending = Some(Pending {
                buf,
                filled,
                mode: Completion::Wait,
            });
            Ok(None)
        })?;
        if let Some(received) = ready {
            return Ok((TransferStatus::Success, received));
        }

        let guard = WaitGuard { slot };
        let waited = with_timeout(timeout, slot.filled.wait()).await;
        let received = guard.take().ok_or(EmuxError::Cancelled)?;

        let status = if received.is_complete() {
            TransferStatus::Success
        } else {
            if waited.is_err() {
                debug!(
                    "mux {} port {}: receive timed out with {} of {} bytes",
                    self.mux.id(),
                    self.port,
                    received.len,
                    received.data.len()
                );
            }
            TransferStatus::Timeout
        };
        Ok((status, received))
    }

    /// Hand every received byte to `callback` instead of buffering it
    ///
    /// Bytes already in the background ring stay there. The callback runs
    /// in the receive context while the link's parser is locked: it may use
    /// this or any other port, but must not feed bytes into the same mux.
    pub fn start_rx_event_callback(
        &self,
        callback: &'b (dyn Fn(u8) + Sync),
    ) -> Result<(), EmuxError<T::Error>> {
        self.slot()?.with_state(|state| {
            if state.is_receiving() {
                return Err(EmuxError::Busy);
            }
            state.raw = Some(callback);
            Ok(())
        })
    }

    /// Go back to buffering received bytes
    pub fn stop_rx_event_callback(&self) {
        if let Ok(slot) = self.slot() {
            slot.with_state(|state| state.raw = None);
        }
    }

    /// Bytes waiting in the background ring
    pub fn buffered(&self) -> usize {
        self.slot().map_or(0, |slot| {
            slot.with_state(|state| state.ring.as_ref().map_or(0, |ring| ring.len()))
        })
    }

    /// Close the port
    pub fn close(self) {}

    fn slot(&self) -> Result<&'m PortSlot<'b, M>, EmuxError<T::Error>> {
        self.mux.slot(self.port).ok_or(EmuxError::InvalidPort)
    }
}

impl<M: RawMutex, T: Transport, const PORTS: usize> Drop for VirtualPort<'_, '_, M, T, PORTS> {
    fn drop(&mut self) {
        self.mux.release(self.port);
    }
}

/// Clears a waiting receive if `receive_timeout` is dropped mid-wait
struct WaitGuard<'s, 'b, M: RawMutex> {
    slot: &'s PortSlot<'b, M>,
}

impl<'b, M: RawMutex> WaitGuard<'_, 'b, M> {
    fn take(&self) -> Option<Received<'b>> {
        self.slot.take_pending(Completion::Wait)
    }
}

impl<M: RawMutex> Drop for WaitGuard<'_, '_, M> {
    fn drop(&mut self) {
        self.take();
    }
}
