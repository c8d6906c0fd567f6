//! Registry of physical multiplexed links

use alt125x_protocol::MuxConfig;
use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::error::EmuxError;
use crate::mux::PhysicalMux;
use crate::port::VirtualPort;
use crate::transport::Transport;
use crate::{MAX_MUX_COUNT, VIRTUAL_SERIAL_COUNT};

/// Fixed table of `MUXES` physical links with `PORTS` virtual ports each
///
/// At most one [`VirtualPort`] exists per (mux, port) pair.
pub struct Emux<
    'b,
    M: RawMutex,
    T: Transport,
    const MUXES: usize = MAX_MUX_COUNT,
    const PORTS: usize = VIRTUAL_SERIAL_COUNT,
> {
    muxes: [PhysicalMux<'b, M, T, PORTS>; MUXES],
}

impl<'b, M: RawMutex, T: Transport, const MUXES: usize, const PORTS: usize>
    Emux<'b, M, T, MUXES, PORTS>
{
    /// One transport per link; mux ids follow array order
    pub fn new(transports: [T; MUXES], config: MuxConfig) -> Self {
        let mut id = 0u8;
        Self {
            muxes: transports.map(|transport| {
                let mux = PhysicalMux::new(id, transport, config.clone());
                id = id.wrapping_add(1);
                mux
            }),
        }
    }

    pub fn mux(&self, mux_id: u8) -> Result<&PhysicalMux<'b, M, T, PORTS>, EmuxError<T::Error>> {
        self.muxes
            .get(usize::from(mux_id))
            .ok_or(EmuxError::InvalidMux)
    }

    /// Open virtual port `port_id` of link `mux_id`
    ///
    /// See [`PhysicalMux::open`].
    pub fn open(
        &self,
        mux_id: u8,
        port_id: u8,
        ring: &'b mut [u8],
    ) -> Result<VirtualPort<'_, 'b, M, T, PORTS>, EmuxError<T::Error>> {
        self.mux(mux_id)?.open(port_id, ring)
    }

    /// Feed one byte received on link `mux_id`
    pub fn on_byte_received(&self, mux_id: u8, byte: u8) -> Result<(), EmuxError<T::Error>> {
        self.mux(mux_id)?.on_byte_received(byte);
        Ok(())
    }

    pub fn muxes(&self) -> impl Iterator<Item = &PhysicalMux<'b, M, T, PORTS>> {
        self.muxes.iter()
    }
}
