//! Virtual-port errors and status

use alt125x_protocol::FrameError;

/// Errors returned by the virtual-port API
///
/// `E` is the error type of the underlying [`crate::Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EmuxError<E> {
    /// Empty buffer or data
    InvalidParameter,
    /// Port id outside the port table
    InvalidPort,
    /// Mux id outside the registry
    InvalidMux,
    /// The port already has an open handle
    PortInUse,
    /// A receive or the raw byte callback is already active
    Busy,
    /// Ring buffer storage cannot hold a single byte
    BufferTooSmall,
    /// The transport accepted only part of a frame
    ShortWrite,
    /// The pending receive was taken away while waiting
    Cancelled,
    /// The transport failed
    Transport(E),
}

impl<E> From<FrameError> for EmuxError<E> {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::InvalidPort => EmuxError::InvalidPort,
            FrameError::EmptyPayload | FrameError::PayloadTooLarge | FrameError::BufferTooSmall => {
                EmuxError::InvalidParameter
            }
        }
    }
}

/// How a receive with timeout ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferStatus {
    /// The whole buffer was filled
    Success,
    /// The timeout expired first; the buffer holds what arrived
    Timeout,
}
