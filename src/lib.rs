//! # ant-uart
//!
//! A portable, no_std Rust driver for ANT serial radio transceivers, such as the
//! nRF24AP2 and similar modules wired to a microcontroller UART.
//!
//! The driver covers one logical channel (channel 0) acting either as a shared
//! channel master or as a slave that announces its address once connected. It
//! provides:
//! - an interrupt-safe receive [ring buffer](ring) split into a producer for the
//!   UART interrupt and a consumer for the driver
//! - a byte-at-a-time [frame assembler](frame) with XOR checksum validation and
//!   resynchronization on the sync byte
//! - a [command encoder](encoder) over any `embedded_io::Write` transport
//! - the [dispatcher](dispatch) that routes channel events and broadcast data
//! - the [channel configuration handshake](driver) with automatic recovery
//!   from search timeouts
//!
//! ## Crate features
//! | Feature     | Description |
//! |-------------|-------------|
//! | `std`       | Links `std`; enables `std` support in `thiserror`, `critical-section` and `log` |
//! | `log`       | Uses `log` logging |
//! | `defmt-0-3` | Uses `defmt` logging and derives `defmt::Format` on public types |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ant_uart::config::{ChannelConfig, Role};
//! use ant_uart::driver::{AntDriver, Callbacks};
//!
//! ant_uart::init_ant_rx!(255);
//!
//! #[interrupt]
//! fn USART1() {
//!     ant_uart::ant_rx_isr!(uart_rx.read_byte());
//! }
//!
//! fn main() -> ! {
//!     let consumer = ant_uart::setup_ant_rx!().unwrap();
//!     let config = ChannelConfig::new(Role::Master, 1, 8192, 57);
//!     let mut radio =
//!         AntDriver::init(uart_tx, consumer, delay, config, Callbacks::new()).unwrap();
//!     loop {
//!         radio.poll().unwrap();
//!     }
//! }
//! ```
//!
//! ## Integration Notes
//!
//! - `AntDriver::init` blocks until the radio acknowledges every configuration
//!   command, unless `ChannelConfig::ack_timeout_ms` is set
//! - Broadcast and transmit-complete callbacks run inside `poll()`, never in
//!   interrupt context
//! - Only one driver should consume a given receive queue; `RxQueue::split`
//!   enforces this
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(any(feature = "std", test)), no_std)]

pub use critical_section;
pub use heapless;

#[macro_use]
mod fmt;

pub(crate) mod checksum;
pub mod config;
pub mod consts;
pub mod dispatch;
pub mod driver;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod isr;
pub mod ring;
