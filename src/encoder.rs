//! Outbound command encoding.
//!
//! Every message the driver sends is a [`Command`]. [`Command::frame()`] lays
//! out its payload (multi-byte fields little-endian), and [`Encoder`] writes the
//! resulting frame to the serial transport and waits for it to drain.
//!
//! All command fields are fixed width, so encoding cannot fail; the only error
//! path is the transport itself.

use crate::consts::{
    CHAN0, MESG_ACKNOWLEDGED_DATA_ID, MESG_ASSIGN_CHANNEL_ID, MESG_BROADCAST_DATA_ID,
    MESG_CAPABILITIES_ID, MESG_CHANNEL_ID_ID, MESG_CHANNEL_MESG_PERIOD_ID,
    MESG_CHANNEL_RADIO_FREQ_ID, MESG_CHANNEL_SEARCH_TIMEOUT_ID, MESG_DATA_LEN,
    MESG_OPEN_CHANNEL_ID, MESG_REQUEST_ID, MESG_SYSTEM_RESET_ID,
};
use crate::frame::Frame;
use embedded_io::Write;

/// A message to the radio.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Command {
    /// Reset the radio; it needs time to settle before the next command.
    SystemReset,
    /// Ask the radio to send the message identified by `message_id`.
    Request {
        /// Channel the request refers to.
        channel: u8,
        /// Message id the radio should answer with.
        message_id: u8,
    },
    /// Assign a channel type and network to a channel.
    AssignChannel {
        /// Channel number.
        channel: u8,
        /// Channel type (see [`crate::config::Role::channel_type`]).
        channel_type: u8,
        /// Network number.
        network: u8,
    },
    /// Set the channel id used to pair with a peer.
    SetChannelId {
        /// Channel number.
        channel: u8,
        /// Device number.
        device_id: u16,
        /// Device type.
        device_type: u8,
        /// Transmission type.
        transmission_type: u8,
    },
    /// Set the channel message period.
    SetPeriod {
        /// Channel number.
        channel: u8,
        /// Period in units of 1/32768 s.
        period: u16,
    },
    /// Set the radio frequency offset.
    SetFrequency {
        /// Channel number.
        channel: u8,
        /// Offset from 2400 MHz, in MHz.
        frequency: u8,
    },
    /// Set how long the radio searches for its peer before timing out.
    SetSearchTimeout {
        /// Channel number.
        channel: u8,
        /// Timeout in units of 2.5 s.
        timeout: u8,
    },
    /// Open a configured channel.
    OpenChannel {
        /// Channel number.
        channel: u8,
    },
    /// Broadcast six bytes of data.
    Broadcast {
        /// Channel number.
        channel: u8,
        /// Destination address.
        address: u16,
        /// Application data.
        data: [u8; MESG_DATA_LEN],
    },
    /// Send six bytes of data that the peer acknowledges.
    Acknowledged {
        /// Channel number.
        channel: u8,
        /// Destination address.
        address: u16,
        /// Application data.
        data: [u8; MESG_DATA_LEN],
    },
}

impl Command {
    /// Message id this command is sent with.
    pub fn message_id(&self) -> u8 {
        match self {
            Command::SystemReset => MESG_SYSTEM_RESET_ID,
            Command::Request { .. } => MESG_REQUEST_ID,
            Command::AssignChannel { .. } => MESG_ASSIGN_CHANNEL_ID,
            Command::SetChannelId { .. } => MESG_CHANNEL_ID_ID,
            Command::SetPeriod { .. } => MESG_CHANNEL_MESG_PERIOD_ID,
            Command::SetFrequency { .. } => MESG_CHANNEL_RADIO_FREQ_ID,
            Command::SetSearchTimeout { .. } => MESG_CHANNEL_SEARCH_TIMEOUT_ID,
            Command::OpenChannel { .. } => MESG_OPEN_CHANNEL_ID,
            Command::Broadcast { .. } => MESG_BROADCAST_DATA_ID,
            Command::Acknowledged { .. } => MESG_ACKNOWLEDGED_DATA_ID,
        }
    }

    /// Encodes the command as a complete frame.
    pub fn frame(&self) -> Frame {
        let id = self.message_id();
        match *self {
            Command::SystemReset => Frame::with_payload(id, [0x00]),
            Command::Request {
                channel,
                message_id,
            } => Frame::with_payload(id, [channel, message_id]),
            Command::AssignChannel {
                channel,
                channel_type,
                network,
            } => Frame::with_payload(id, [channel, channel_type, network]),
            Command::SetChannelId {
                channel,
                device_id,
                device_type,
                transmission_type,
            } => {
                let [lo, hi] = device_id.to_le_bytes();
                Frame::with_payload(id, [channel, lo, hi, device_type, transmission_type])
            }
            Command::SetPeriod { channel, period } => {
                let [lo, hi] = period.to_le_bytes();
                Frame::with_payload(id, [channel, lo, hi])
            }
            Command::SetFrequency { channel, frequency } => {
                Frame::with_payload(id, [channel, frequency])
            }
            Command::SetSearchTimeout { channel, timeout } => {
                Frame::with_payload(id, [channel, timeout])
            }
            Command::OpenChannel { channel } => Frame::with_payload(id, [channel]),
            Command::Broadcast {
                channel,
                address,
                data,
            }
            | Command::Acknowledged {
                channel,
                address,
                data,
            } => {
                let [lo, hi] = address.to_le_bytes();
                Frame::with_payload(
                    id,
                    [
                        channel, lo, hi, data[0], data[1], data[2], data[3], data[4], data[5],
                    ],
                )
            }
        }
    }
}

/// Writes commands to the radio's serial port.
///
/// ## Example
///
/// ```rust
/// use ant_uart::encoder::Encoder;
///
/// // `&mut [u8]` implements `embedded_io::Write`
/// let mut out = [0u8; 16];
/// let mut encoder = Encoder::new(&mut out[..]);
/// encoder.open_channel().unwrap();
/// drop(encoder);
/// assert_eq!(&out[..5], &[0xa4, 0x01, 0x4b, 0x00, 0xa4 ^ 0x01 ^ 0x4b]);
/// ```
#[derive(Debug)]
pub struct Encoder<W> {
    port: W,
}

impl<W: Write> Encoder<W> {
    /// Wraps a serial transport.
    pub fn new(port: W) -> Self {
        Self { port }
    }

    /// Shared access to the transport.
    pub fn port(&self) -> &W {
        &self.port
    }

    /// Exclusive access to the transport.
    pub fn port_mut(&mut self) -> &mut W {
        &mut self.port
    }

    /// Returns the transport.
    pub fn release(self) -> W {
        self.port
    }

    /// Encodes `command` and writes it out, blocking until the transport has
    /// accepted and flushed every byte.
    pub fn send(&mut self, command: &Command) -> Result<(), W::Error> {
        let frame = command.frame();
        self.port.write_all(frame.as_bytes())?;
        self.port.flush()?;
        debug!("sent message {:x}", frame.message_id());
        Ok(())
    }

    /// Sends a system reset.
    pub fn reset(&mut self) -> Result<(), W::Error> {
        self.send(&Command::SystemReset)
    }

    /// Requests the radio's capabilities message.
    pub fn request_capabilities(&mut self) -> Result<(), W::Error> {
        self.send(&Command::Request {
            channel: CHAN0,
            message_id: MESG_CAPABILITIES_ID,
        })
    }

    /// Assigns channel 0 with the given channel type and network.
    pub fn assign_channel(&mut self, channel_type: u8, network: u8) -> Result<(), W::Error> {
        self.send(&Command::AssignChannel {
            channel: CHAN0,
            channel_type,
            network,
        })
    }

    /// Sets the channel id of channel 0.
    pub fn set_channel_id(
        &mut self,
        device_id: u16,
        device_type: u8,
        transmission_type: u8,
    ) -> Result<(), W::Error> {
        self.send(&Command::SetChannelId {
            channel: CHAN0,
            device_id,
            device_type,
            transmission_type,
        })
    }

    /// Sets the message period of channel 0.
    pub fn set_period(&mut self, period: u16) -> Result<(), W::Error> {
        self.send(&Command::SetPeriod {
            channel: CHAN0,
            period,
        })
    }

    /// Sets the radio frequency of channel 0.
    pub fn set_frequency(&mut self, frequency: u8) -> Result<(), W::Error> {
        self.send(&Command::SetFrequency {
            channel: CHAN0,
            frequency,
        })
    }

    /// Sets the search timeout of channel 0.
    pub fn set_search_timeout(&mut self, timeout: u8) -> Result<(), W::Error> {
        self.send(&Command::SetSearchTimeout {
            channel: CHAN0,
            timeout,
        })
    }

    /// Opens channel 0.
    pub fn open_channel(&mut self) -> Result<(), W::Error> {
        self.send(&Command::OpenChannel { channel: CHAN0 })
    }

    /// Broadcasts six bytes to `address` on channel 0.
    pub fn send_broadcast(
        &mut self,
        address: u16,
        data: &[u8; MESG_DATA_LEN],
    ) -> Result<(), W::Error> {
        self.send(&Command::Broadcast {
            channel: CHAN0,
            address,
            data: *data,
        })
    }

    /// Sends six acknowledged bytes to `address` on channel 0.
    pub fn send_acknowledged(
        &mut self,
        address: u16,
        data: &[u8; MESG_DATA_LEN],
    ) -> Result<(), W::Error> {
        self.send(&Command::Acknowledged {
            channel: CHAN0,
            address,
            data: *data,
        })
    }
}
