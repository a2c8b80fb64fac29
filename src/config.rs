//! Channel configuration supplied by the application.
//!
//! A [`ChannelConfig`] is handed to [`AntDriver::init`](crate::driver::AntDriver::init)
//! and is read-only from then on. Only the role, address, period and frequency
//! have to be chosen; everything else defaults to the values the radio's
//! reference firmware uses.
//!
//! ```rust
//! use ant_uart::config::{ChannelConfig, Role};
//!
//! let config = ChannelConfig::new(Role::Slave, 1, 2370, 0x41).with_ack_timeout_ms(500);
//! assert_eq!(config.ack_timeout_ms, Some(500));
//! assert_eq!(config.role.channel_type(), 0x20);
//! ```

use crate::consts::{
    CHANNEL_TYPE_SHARED_RX, CHANNEL_TYPE_SHARED_TX, DEFAULT_DEVICE_ID, DEFAULT_DEVICE_TYPE,
    DEFAULT_TRANSMISSION_TYPE, NET0, RESET_SETTLE_MS,
};

/// Which end of the channel this radio is.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Role {
    /// Network master; opens a shared transmit channel.
    Master,
    /// Slave/listener; opens a shared receive channel and announces its
    /// address once the channel is open.
    Slave,
}

impl Role {
    /// Channel type byte sent with the assign channel command.
    pub const fn channel_type(self) -> u8 {
        match self {
            Role::Master => CHANNEL_TYPE_SHARED_TX,
            Role::Slave => CHANNEL_TYPE_SHARED_RX,
        }
    }
}

/// Radio settings for the single logical channel.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct ChannelConfig {
    /// Master or slave.
    pub role: Role,
    /// Address used for data messages, including the slave address announcement.
    pub address: u16,
    /// Channel message period, in units of 1/32768 s.
    pub period: u16,
    /// Radio frequency offset from 2400 MHz.
    pub frequency: u8,
    /// Network number for the assign channel command.
    pub network: u8,
    /// Device number for the channel id command.
    pub device_id: u16,
    /// Device type for the channel id command.
    pub device_type: u8,
    /// Transmission type for the channel id command.
    pub transmission_type: u8,
    /// Delay after the system reset before configuration starts.
    pub reset_delay_ms: u32,
    /// Upper bound on each handshake wait. `None` waits forever.
    pub ack_timeout_ms: Option<u32>,
}

impl ChannelConfig {
    /// Creates a configuration with default channel id, network and timing.
    pub const fn new(role: Role, address: u16, period: u16, frequency: u8) -> Self {
        Self {
            role,
            address,
            period,
            frequency,
            network: NET0,
            device_id: DEFAULT_DEVICE_ID,
            device_type: DEFAULT_DEVICE_TYPE,
            transmission_type: DEFAULT_TRANSMISSION_TYPE,
            reset_delay_ms: RESET_SETTLE_MS,
            ack_timeout_ms: None,
        }
    }

    /// Replaces the channel id triple.
    pub const fn with_channel_id(
        mut self,
        device_id: u16,
        device_type: u8,
        transmission_type: u8,
    ) -> Self {
        self.device_id = device_id;
        self.device_type = device_type;
        self.transmission_type = transmission_type;
        self
    }

    /// Replaces the network number.
    pub const fn with_network(mut self, network: u8) -> Self {
        self.network = network;
        self
    }

    /// Replaces the post-reset delay.
    pub const fn with_reset_delay_ms(mut self, ms: u32) -> Self {
        self.reset_delay_ms = ms;
        self
    }

    /// Bounds every handshake wait to `ms` milliseconds.
    pub const fn with_ack_timeout_ms(mut self, ms: u32) -> Self {
        self.ack_timeout_ms = Some(ms);
        self
    }
}
