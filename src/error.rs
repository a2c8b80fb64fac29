//! Error types returned by the driver.
//!
//! Nothing that arrives from the radio is treated as an error: bad checksums,
//! unknown messages and radio-reported failures are routed to the diagnostic
//! sink instead (see [`crate::dispatch`]). What remains are failures of the
//! outbound transport and, when the timeout option is enabled, a radio that
//! stopped answering during configuration.

use crate::driver::Stage;
use thiserror::Error;

/// Errors raised while talking to the radio.
///
/// `E` is the error type of the [`embedded_io::Write`] transport.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AntError<E> {
    /// Writing or flushing the serial transport failed.
    #[error("transport error: {0:?}")]
    Transport(E),

    /// The radio did not acknowledge the command sent for `stage` within the
    /// configured acknowledgment timeout.
    #[error("no acknowledgement for {stage:?} after {waited_ms} ms")]
    AckTimeout {
        /// The handshake stage that was waiting.
        stage: Stage,
        /// How long the driver waited before giving up.
        waited_ms: u32,
    },
}

/// Reasons a frame could not be built or accepted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum FrameError {
    /// The checksum byte did not match the XOR of the frame contents.
    #[error("checksum mismatch on message {message_id:#04x}: expected {expected:#04x}, found {found:#04x}")]
    ChecksumMismatch {
        /// Message id of the rejected frame.
        message_id: u8,
        /// Checksum computed over the received bytes.
        expected: u8,
        /// Checksum byte actually received.
        found: u8,
    },

    /// A payload longer than a frame can carry was supplied.
    #[error("payload of {0} bytes exceeds the 17 byte frame limit")]
    PayloadTooLong(usize),
}
