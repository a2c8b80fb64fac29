//! Serial frames and the byte-at-a-time frame assembler.
//!
//! A [`Frame`] is one complete, checksum-valid message:
//!
//! ```text
//! SYNC | LENGTH | MESSAGE_ID | PAYLOAD (LENGTH bytes) | CHECKSUM
//! ```
//!
//! [`FrameAssembler`] rebuilds frames from the raw receive stream. It throws
//! away everything outside a frame until it sees the sync byte, and a sync byte
//! seen anywhere restarts framing, so the assembler always falls back into step
//! after line noise or a truncated message.

use crate::checksum::checksum;
use crate::consts::{
    MESG_DATA_OFFSET, MESG_HEADER_SIZE, MESG_ID_OFFSET, MESG_MAX_DATA_SIZE, MESG_MAX_SIZE,
    MESG_SIZE_OFFSET, MESG_TX_SYNC,
};
use crate::error::FrameError;

/// One complete protocol frame, sync byte through checksum.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Frame {
    buf: [u8; MESG_MAX_SIZE],
    len: u8,
}

impl Frame {
    /// Builds a frame with a freshly computed checksum.
    ///
    /// # Errors
    /// [`FrameError::PayloadTooLong`] if `payload` holds more than 17 bytes.
    pub fn new(message_id: u8, payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > MESG_MAX_DATA_SIZE as usize {
            return Err(FrameError::PayloadTooLong(payload.len()));
        }
        let end = MESG_HEADER_SIZE + payload.len();
        let mut buf = [0; MESG_MAX_SIZE];
        buf[0] = MESG_TX_SYNC;
        buf[MESG_SIZE_OFFSET] = payload.len() as u8;
        buf[MESG_ID_OFFSET] = message_id;
        buf[MESG_DATA_OFFSET..end].copy_from_slice(payload);
        buf[end] = checksum(&buf[..end]);
        Ok(Self {
            buf,
            len: (end + 1) as u8,
        })
    }

    /// Builds a frame from a payload whose size is known to fit.
    pub(crate) fn with_payload<const P: usize>(message_id: u8, payload: [u8; P]) -> Self {
        const { assert!(P <= MESG_MAX_DATA_SIZE as usize) };
        let end = MESG_HEADER_SIZE + P;
        let mut buf = [0; MESG_MAX_SIZE];
        buf[0] = MESG_TX_SYNC;
        buf[MESG_SIZE_OFFSET] = P as u8;
        buf[MESG_ID_OFFSET] = message_id;
        buf[MESG_DATA_OFFSET..end].copy_from_slice(&payload);
        buf[end] = checksum(&buf[..end]);
        Self {
            buf,
            len: (end + 1) as u8,
        }
    }

    /// Message id byte.
    pub fn message_id(&self) -> u8 {
        self.buf[MESG_ID_OFFSET]
    }

    /// Payload bytes, excluding header and checksum.
    pub fn payload(&self) -> &[u8] {
        &self.buf[MESG_DATA_OFFSET..self.len as usize - 1]
    }

    /// Checksum byte.
    pub fn checksum(&self) -> u8 {
        self.buf[self.len as usize - 1]
    }

    /// The raw frame as it appears on the wire, sync byte through checksum.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    /// Total frame length on the wire.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Always `false`; a frame holds at least its header and checksum.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Incremental frame reconstruction from a byte stream.
///
/// Feed bytes in arrival order with [`feed()`](FrameAssembler::feed). The
/// assembler tracks its position within the current frame:
///
/// - position 0: sync byte (any sync byte restarts framing here)
/// - position 1: length, at most 17
/// - position 2: message id
/// - positions 3 .. length + 3: payload
/// - position length + 3: checksum, which completes the frame
///
/// The sync byte is never treated as data. A frame whose length, id, payload
/// or checksum contains it is cut short at that byte and cannot be received.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    buf: [u8; MESG_MAX_SIZE],
    pos: usize,
    in_frame: bool,
}

impl FrameAssembler {
    /// Creates an assembler waiting for a sync byte.
    pub const fn new() -> Self {
        Self {
            buf: [0; MESG_MAX_SIZE],
            pos: 0,
            in_frame: false,
        }
    }

    /// Whether a frame has started but not yet completed.
    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// Drops any partial frame and waits for the next sync byte.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.in_frame = false;
    }

    /// Advances the state machine by one received byte.
    ///
    /// # Returns
    /// - `None` while no frame has completed (including discarded noise)
    /// - `Some(Ok(frame))` once the checksum byte of a valid frame arrives
    /// - `Some(Err(FrameError::ChecksumMismatch { .. }))` when a complete frame
    ///   fails its checksum; the frame is dropped and scanning resumes
    pub fn feed(&mut self, byte: u8) -> Option<Result<Frame, FrameError>> {
        if byte == MESG_TX_SYNC {
            self.buf[0] = byte;
            self.pos = 1;
            self.in_frame = true;
            return None;
        }
        if !self.in_frame {
            return None;
        }

        match self.pos {
            MESG_SIZE_OFFSET => {
                if byte > MESG_MAX_DATA_SIZE {
                    trace!("frame length {} out of range, resyncing", byte);
                    self.reset();
                    return None;
                }
                self.buf[MESG_SIZE_OFFSET] = byte;
                self.pos += 1;
                None
            }
            MESG_ID_OFFSET => {
                self.buf[MESG_ID_OFFSET] = byte;
                self.pos += 1;
                None
            }
            pos if pos < self.buf[MESG_SIZE_OFFSET] as usize + MESG_HEADER_SIZE => {
                self.buf[pos] = byte;
                self.pos += 1;
                None
            }
            pos => {
                self.buf[pos] = byte;
                self.reset();
                let expected = checksum(&self.buf[..pos]);
                if expected == byte {
                    Some(Ok(Frame {
                        buf: self.buf,
                        len: (pos + 1) as u8,
                    }))
                } else {
                    Some(Err(FrameError::ChecksumMismatch {
                        message_id: self.buf[MESG_ID_OFFSET],
                        expected,
                        found: byte,
                    }))
                }
            }
        }
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}
