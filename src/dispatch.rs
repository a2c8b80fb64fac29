//! Routing of validated inbound frames.
//!
//! [`route()`] looks at a frame's message id (and, for response/event messages,
//! the event code) and decides what should happen to it. It does not act on the
//! decision; the driver does. Nothing here can fail: every frame ends in an
//! acknowledgment, a recovery request, a callback, a log line, or a report to
//! the [`DiagnosticSink`].
//!
//! | Message | Payload | Route |
//! |---|---|---|
//! | `0x40` | `ch, 0x01, 0x00` | [`Route::Acknowledged`] |
//! | `0x40` | `ch, 0x01, 0x01` | [`Route::SearchTimeout`] |
//! | `0x40` | `ch, 0x01, 0x02` | [`Route::ReceiveFailed`] |
//! | `0x40` | `ch, 0x01, 0x03` | [`Route::TransmitComplete`] |
//! | `0x40` | anything else | [`Route::Report`] |
//! | `0x4e` | broadcast data | [`Route::Broadcast`] |
//! | other | | [`Route::Report`] |

use core::fmt::{self, Write};

use crate::consts::{
    DIAGNOSTIC_LINE_LEN, EVENT_RX_FAIL, EVENT_RX_SEARCH_TIMEOUT, EVENT_TX,
    MESG_BROADCAST_DATA_ID, MESG_EVENT_ID, MESG_RESPONSE_EVENT_ID, RESPONSE_NO_ERROR,
};
use crate::error::FrameError;
use crate::frame::Frame;
use heapless::{Deque, String};

/// What the driver should do with a frame.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Route<'f> {
    /// Channel event "no error": the pending command was accepted.
    Acknowledged,
    /// The radio stopped searching for its peer; reconfigure the channel.
    SearchTimeout,
    /// A receive slot passed without data. Transient, nothing to do.
    ReceiveFailed,
    /// A transmission went out; notify the application.
    TransmitComplete,
    /// Broadcast data for the application: the raw frame, sync through checksum.
    Broadcast(&'f [u8]),
    /// Not acted upon; hand to the diagnostic sink.
    Report(Diagnostic<'f>),
}

/// Decides how `frame` is handled.
pub fn route(frame: &Frame) -> Route<'_> {
    let payload = frame.payload();
    let unrecognized = Route::Report(Diagnostic::Unrecognized {
        message_id: frame.message_id(),
        payload,
    });

    match frame.message_id() {
        MESG_RESPONSE_EVENT_ID => match payload {
            [_, MESG_EVENT_ID, code, ..] => match *code {
                RESPONSE_NO_ERROR => Route::Acknowledged,
                EVENT_RX_SEARCH_TIMEOUT => Route::SearchTimeout,
                EVENT_RX_FAIL => Route::ReceiveFailed,
                EVENT_TX => Route::TransmitComplete,
                _ => unrecognized,
            },
            // function responses
            _ => unrecognized,
        },
        MESG_BROADCAST_DATA_ID => Route::Broadcast(frame.as_bytes()),
        _ => unrecognized,
    }
}

/// Something worth telling a human about that the driver does not act on.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Diagnostic<'a> {
    /// A valid frame the driver does not handle.
    Unrecognized {
        /// Message id of the frame.
        message_id: u8,
        /// Payload bytes of the frame.
        payload: &'a [u8],
    },
    /// A complete frame that failed its checksum and was dropped.
    ChecksumMismatch {
        /// Message id of the dropped frame.
        message_id: u8,
        /// Checksum computed over the received bytes.
        expected: u8,
        /// Checksum byte received.
        found: u8,
    },
    /// The radio reported a search timeout; the channel is being reconfigured.
    SearchTimeout,
}

impl TryFrom<FrameError> for Diagnostic<'_> {
    type Error = FrameError;

    fn try_from(err: FrameError) -> Result<Self, Self::Error> {
        match err {
            FrameError::ChecksumMismatch {
                message_id,
                expected,
                found,
            } => Ok(Diagnostic::ChecksumMismatch {
                message_id,
                expected,
                found,
            }),
            // only raised when building outbound frames
            FrameError::PayloadTooLong(_) => Err(err),
        }
    }
}

impl fmt::Display for Diagnostic<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Unrecognized {
                message_id,
                payload,
            } => {
                write!(f, "m: {message_id:02x} -")?;
                for b in payload.iter() {
                    write!(f, " {b:02x}")?;
                }
                Ok(())
            }
            Diagnostic::ChecksumMismatch {
                message_id,
                expected,
                found,
            } => write!(
                f,
                "checksum failed: m: {message_id:02x} (expected {expected:02x}, found {found:02x})"
            ),
            Diagnostic::SearchTimeout => f.write_str("search timeout, re-opening channel"),
        }
    }
}

#[cfg(feature = "defmt-0-3")]
impl defmt::Format for Diagnostic<'_> {
    fn format(&self, f: defmt::Formatter<'_>) {
        match self {
            Diagnostic::Unrecognized {
                message_id,
                payload,
            } => defmt::write!(f, "m: {=u8:x} - {=[u8]:x}", message_id, payload),
            Diagnostic::ChecksumMismatch {
                message_id,
                expected,
                found,
            } => defmt::write!(
                f,
                "checksum failed: m: {=u8:x} (expected {=u8:x}, found {=u8:x})",
                message_id,
                expected,
                found
            ),
            Diagnostic::SearchTimeout => defmt::write!(f, "search timeout, re-opening channel"),
        }
    }
}

/// Receiver of [`Diagnostic`]s.
pub trait DiagnosticSink {
    /// Records one diagnostic.
    fn report(&mut self, diagnostic: &Diagnostic<'_>);
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &mut S {
    fn report(&mut self, diagnostic: &Diagnostic<'_>) {
        (**self).report(diagnostic);
    }
}

/// Writes each diagnostic as one warning line through the enabled logger.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&mut self, diagnostic: &Diagnostic<'_>) {
        warn!("{}", diagnostic);
    }
}

/// Keeps the `N` most recent diagnostics as text, for targets without a logger.
///
/// Lines longer than [`DIAGNOSTIC_LINE_LEN`] are truncated.
#[derive(Debug, Default)]
pub struct HistorySink<const N: usize> {
    lines: Deque<String<DIAGNOSTIC_LINE_LEN>, N>,
    evicted: u16,
}

impl<const N: usize> HistorySink<N> {
    /// An empty history.
    pub const fn new() -> Self {
        Self {
            lines: Deque::new(),
            evicted: 0,
        }
    }

    /// Stored lines, oldest first.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Number of stored lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines pushed out by newer ones so far (saturating).
    pub fn evicted(&self) -> u16 {
        self.evicted
    }

    /// Forgets every stored line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

impl<const N: usize> DiagnosticSink for HistorySink<N> {
    fn report(&mut self, diagnostic: &Diagnostic<'_>) {
        if N == 0 {
            return;
        }
        let mut line = String::new();
        // overflow leaves the truncated prefix in place
        let _ = write!(line, "{diagnostic}");
        if self.lines.is_full() {
            let _ = self.lines.pop_front();
            self.evicted = self.evicted.saturating_add(1);
        }
        let _ = self.lines.push_back(line);
    }
}
