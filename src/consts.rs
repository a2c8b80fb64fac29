//! Constants used across the ANT serial protocol implementation.
//!
//! This module defines the wire-level layout of a serial frame, the message
//! identifiers and channel event codes the driver understands, and the default
//! channel parameters applied during configuration.
//!
//! ## Frame layout
//!
//! ```text
//! SYNC(1) | LENGTH(1) | MESSAGE_ID(1) | PAYLOAD(0..17) | CHECKSUM(1)
//! ```
//!
//! `LENGTH` counts payload bytes only. `CHECKSUM` is the XOR of every byte from
//! `SYNC` through the last payload byte.
//!
//! These values should be used wherever framing or buffer logic is implemented to ensure
//! consistent message boundaries.

/// Sync byte that starts every frame sent to, and received from, the radio.
pub const MESG_TX_SYNC: u8 = 0xa4;

/// Offset of the length byte within a frame.
pub const MESG_SIZE_OFFSET: usize = 1;

/// Offset of the message id byte within a frame.
pub const MESG_ID_OFFSET: usize = 2;

/// Offset of the first payload byte within a frame.
pub const MESG_DATA_OFFSET: usize = 3;

/// Largest payload a single frame may carry.
pub const MESG_MAX_DATA_SIZE: u8 = 17;

/// Sync, length and message id bytes.
pub const MESG_HEADER_SIZE: usize = 3;

/// Header plus checksum; the framing overhead of every message.
pub const MESG_FRAME_SIZE: usize = MESG_HEADER_SIZE + 1;

/// Size of the largest possible frame, in bytes.
pub const MESG_MAX_SIZE: usize = MESG_MAX_DATA_SIZE as usize + MESG_FRAME_SIZE;

/// Length of the application data carried by broadcast and acknowledged messages.
pub const MESG_DATA_LEN: usize = 6;

// Message ids

/// Marks a channel event inside a response/event payload.
pub const MESG_EVENT_ID: u8 = 0x01;
/// Channel response or channel event.
pub const MESG_RESPONSE_EVENT_ID: u8 = 0x40;
/// Assign channel.
pub const MESG_ASSIGN_CHANNEL_ID: u8 = 0x42;
/// Set channel message period.
pub const MESG_CHANNEL_MESG_PERIOD_ID: u8 = 0x43;
/// Set channel search timeout.
pub const MESG_CHANNEL_SEARCH_TIMEOUT_ID: u8 = 0x44;
/// Set channel radio frequency.
pub const MESG_CHANNEL_RADIO_FREQ_ID: u8 = 0x45;
/// System reset.
pub const MESG_SYSTEM_RESET_ID: u8 = 0x4a;
/// Open channel.
pub const MESG_OPEN_CHANNEL_ID: u8 = 0x4b;
/// Request a message from the radio.
pub const MESG_REQUEST_ID: u8 = 0x4d;
/// Broadcast data.
pub const MESG_BROADCAST_DATA_ID: u8 = 0x4e;
/// Acknowledged data.
pub const MESG_ACKNOWLEDGED_DATA_ID: u8 = 0x4f;
/// Set channel id.
pub const MESG_CHANNEL_ID_ID: u8 = 0x51;
/// Capabilities, requested through [`MESG_REQUEST_ID`].
pub const MESG_CAPABILITIES_ID: u8 = 0x54;

// Channel event codes

/// Command accepted.
pub const RESPONSE_NO_ERROR: u8 = 0x00;
/// The radio gave up searching for its peer.
pub const EVENT_RX_SEARCH_TIMEOUT: u8 = 0x01;
/// A receive slot passed without a message.
pub const EVENT_RX_FAIL: u8 = 0x02;
/// A broadcast message went out on the air.
pub const EVENT_TX: u8 = 0x03;

// Channel parameters

/// The single logical channel this driver operates.
pub const CHAN0: u8 = 0;
/// Default (public) network number.
pub const NET0: u8 = 0;
/// Channel type for a shared bidirectional transmit channel (master).
pub const CHANNEL_TYPE_SHARED_TX: u8 = 0x30;
/// Channel type for a shared bidirectional receive channel (slave).
pub const CHANNEL_TYPE_SHARED_RX: u8 = 0x20;
/// Device number written by the channel id command.
pub const DEFAULT_DEVICE_ID: u16 = 0x0001;
/// Device type written by the channel id command.
pub const DEFAULT_DEVICE_TYPE: u8 = 0x03;
/// Transmission type written by the channel id command.
pub const DEFAULT_TRANSMISSION_TYPE: u8 = 0x03;
/// Data a slave broadcasts to announce its address after opening the channel.
pub const ADDRESS_ANNOUNCE_DATA: [u8; MESG_DATA_LEN] = [0x01; MESG_DATA_LEN];
/// Time the radio needs after a system reset before it accepts commands.
pub const RESET_SETTLE_MS: u32 = 600;

/// Capacity of the receive ring buffer; the largest count a `u8` can hold.
pub const RX_RING_CAPACITY: usize = 255;
/// Longest diagnostic line kept by a [`HistorySink`](crate::dispatch::HistorySink).
///
/// Fits an unrecognized frame with a full 17 byte payload.
pub const DIAGNOSTIC_LINE_LEN: usize = 64;
