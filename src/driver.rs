//! ANT serial radio session.
//!
//! This module provides [`AntDriver`], which owns everything one radio link
//! needs: the consumer half of the receive queue, the frame assembler, the
//! command encoder, the channel configuration and the handshake [`Stage`].
//!
//! ## Lifecycle
//!
//! 1. [`AntDriver::init`] resets the radio, waits for it to settle and runs the
//!    channel handshake. It only returns once the channel is open, so
//!    [`poll()`](AntDriver::poll) can never run against an unconfigured radio.
//! 2. The application calls [`poll()`](AntDriver::poll) from its main loop. Each
//!    call drains the receive queue and dispatches every complete frame.
//! 3. Data goes out through [`send_broadcast()`](AntDriver::send_broadcast) and
//!    [`send_acknowledged()`](AntDriver::send_acknowledged), or from inside the
//!    broadcast callback through the [`Encoder`] it is handed.
//!
//! ## Handshake
//!
//! ```text
//! Idle -> AssignChannel -> SetChannelId -> SetPeriod -> SetFrequency -> OpenChannel
//!      -> AddressAnnounce (slave only) -> Configured
//! ```
//!
//! Every stage up to `OpenChannel` sends its command and then waits for a
//! "no error" channel event. A search timeout, whether it arrives during the
//! handshake or long after it, starts the sequence again from `AssignChannel`.
//!
//! By default a wait never gives up, like the radio's reference firmware. Set
//! [`ChannelConfig::ack_timeout_ms`] to bound it.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ant_uart::config::{ChannelConfig, Role};
//! use ant_uart::driver::{AntDriver, Callbacks};
//! use ant_uart::encoder::Encoder;
//! use ant_uart::ring::{OverflowPolicy, RxQueue};
//!
//! static RX: RxQueue<255> = RxQueue::new(OverflowPolicy::DropOldest);
//!
//! let (producer, consumer) = RX.split().unwrap();
//! // hand `producer` to the UART receive interrupt, see `ant_uart::isr`
//!
//! let mut on_data = |frame: &[u8], encoder: &mut Encoder<_>| {
//!     encoder.send_broadcast(1, &[0x2a, 0x00, 0x2b, 0x00, 0x2c, 0x00])
//! };
//! let callbacks = Callbacks::new().on_broadcast(&mut on_data);
//! let config = ChannelConfig::new(Role::Slave, 1, 2370, 0x41);
//!
//! let mut radio = AntDriver::init(uart_tx, consumer, delay, config, callbacks)?;
//! loop {
//!     radio.poll()?;
//! }
//! ```

use core::fmt;

use crate::config::{ChannelConfig, Role};
use crate::consts::{ADDRESS_ANNOUNCE_DATA, CHAN0, MESG_DATA_LEN};
use crate::dispatch::{Diagnostic, DiagnosticSink, LogSink, Route, route};
use crate::encoder::{Command, Encoder};
use crate::error::AntError;
use crate::frame::{Frame, FrameAssembler};
use crate::ring::Consumer;
use embedded_hal::delay::DelayNs;
use embedded_io::{ErrorType, Write};

/// Position in the channel configuration handshake.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Stage {
    /// Nothing sent yet.
    #[default]
    Idle,
    /// Assigning the channel type and network.
    AssignChannel,
    /// Setting the channel id.
    SetChannelId,
    /// Setting the message period.
    SetPeriod,
    /// Setting the radio frequency.
    SetFrequency,
    /// Opening the channel.
    OpenChannel,
    /// Slave only: broadcasting the slave's address.
    AddressAnnounce,
    /// The channel is open. Only a search timeout leaves this stage.
    Configured,
}

impl Stage {
    /// The stage that follows `self` for a radio playing `role`.
    pub fn next(self, role: Role) -> Stage {
        match self {
            Stage::Idle => Stage::AssignChannel,
            Stage::AssignChannel => Stage::SetChannelId,
            Stage::SetChannelId => Stage::SetPeriod,
            Stage::SetPeriod => Stage::SetFrequency,
            Stage::SetFrequency => Stage::OpenChannel,
            Stage::OpenChannel if role == Role::Slave => Stage::AddressAnnounce,
            Stage::OpenChannel | Stage::AddressAnnounce | Stage::Configured => Stage::Configured,
        }
    }

    /// The command sent on entering this stage, if any.
    pub fn command(self, config: &ChannelConfig) -> Option<Command> {
        let command = match self {
            Stage::Idle | Stage::Configured => return None,
            Stage::AssignChannel => Command::AssignChannel {
                channel: CHAN0,
                channel_type: config.role.channel_type(),
                network: config.network,
            },
            Stage::SetChannelId => Command::SetChannelId {
                channel: CHAN0,
                device_id: config.device_id,
                device_type: config.device_type,
                transmission_type: config.transmission_type,
            },
            Stage::SetPeriod => Command::SetPeriod {
                channel: CHAN0,
                period: config.period,
            },
            Stage::SetFrequency => Command::SetFrequency {
                channel: CHAN0,
                frequency: config.frequency,
            },
            Stage::OpenChannel => Command::OpenChannel { channel: CHAN0 },
            Stage::AddressAnnounce => Command::Broadcast {
                channel: CHAN0,
                address: config.address,
                data: ADDRESS_ANNOUNCE_DATA,
            },
        };
        Some(command)
    }

    /// Whether the stage's command is answered with a "no error" event.
    ///
    /// The address announcement is ordinary broadcast data, which the radio
    /// confirms with transmit events rather than a response.
    pub fn awaits_ack(self) -> bool {
        !matches!(
            self,
            Stage::Idle | Stage::AddressAnnounce | Stage::Configured
        )
    }
}

/// Broadcast-data callback: the raw frame (sync through checksum) and an
/// encoder for replying.
pub type BroadcastCallback<'a, W> =
    &'a mut dyn FnMut(&[u8], &mut Encoder<W>) -> Result<(), <W as ErrorType>::Error>;

/// Transmit-complete callback.
pub type TxCompleteCallback<'a> = &'a mut dyn FnMut();

/// The application's optional hooks. A `None` hook is simply skipped.
pub struct Callbacks<'a, W: Write> {
    /// Called for every broadcast data message received.
    pub on_broadcast: Option<BroadcastCallback<'a, W>>,
    /// Called for every transmit-complete channel event.
    pub on_tx_complete: Option<TxCompleteCallback<'a>>,
}

impl<'a, W: Write> Callbacks<'a, W> {
    /// No callbacks.
    pub fn new() -> Self {
        Self {
            on_broadcast: None,
            on_tx_complete: None,
        }
    }

    /// Sets the broadcast-data callback.
    pub fn on_broadcast(mut self, callback: BroadcastCallback<'a, W>) -> Self {
        self.on_broadcast = Some(callback);
        self
    }

    /// Sets the transmit-complete callback.
    pub fn on_tx_complete(mut self, callback: TxCompleteCallback<'a>) -> Self {
        self.on_tx_complete = Some(callback);
        self
    }
}

impl<W: Write> Default for Callbacks<'_, W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> fmt::Debug for Callbacks<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_broadcast", &self.on_broadcast.is_some())
            .field("on_tx_complete", &self.on_tx_complete.is_some())
            .finish()
    }
}

/// Link counters. All counters saturate.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct LinkStats {
    /// Frames received with a valid checksum.
    pub rx_good: u16,
    /// Frames dropped for a checksum mismatch.
    pub rx_bad: u16,
    /// Search timeouts reported by the radio.
    pub search_timeouts: u16,
    /// Handshakes started, including the initial one.
    pub configurations: u16,
}

/// What a dispatched frame meant to whoever is waiting on the radio.
enum Event {
    Handled,
    Acknowledged,
    SearchTimeout,
}

/// Result of waiting for a handshake acknowledgment.
enum Ack {
    Accepted,
    Restart,
}

/// One radio session on a single logical channel.
///
/// ## Type Parameters
///
/// - `W`: the serial transmit side, any [`embedded_io::Write`]
/// - `D`: a [`DelayNs`] used for the post-reset settle time and timed waits
/// - `N`: capacity of the receive queue the consumer belongs to
/// - `S`: where diagnostics go, [`LogSink`] unless chosen otherwise
pub struct AntDriver<'a, W, D, const N: usize, S = LogSink>
where
    W: Write,
    D: DelayNs,
    S: DiagnosticSink,
{
    encoder: Encoder<W>,
    rx: Consumer<'a, N>,
    assembler: FrameAssembler,
    delay: D,
    config: ChannelConfig,
    callbacks: Callbacks<'a, W>,
    sink: S,
    stage: Stage,
    stats: LinkStats,
}

impl<'a, W, D, const N: usize> AntDriver<'a, W, D, N, LogSink>
where
    W: Write,
    D: DelayNs,
{
    /// Resets the radio, configures its channel and returns the session.
    ///
    /// Diagnostics are written to the log through [`LogSink`].
    ///
    /// # Errors
    /// - [`AntError::Transport`] if a command could not be written
    /// - [`AntError::AckTimeout`] if a wait exceeded
    ///   [`ChannelConfig::ack_timeout_ms`]
    pub fn init(
        port: W,
        rx: Consumer<'a, N>,
        delay: D,
        config: ChannelConfig,
        callbacks: Callbacks<'a, W>,
    ) -> Result<Self, AntError<W::Error>> {
        Self::init_with_sink(port, rx, delay, config, callbacks, LogSink)
    }
}

impl<'a, W, D, const N: usize, S> AntDriver<'a, W, D, N, S>
where
    W: Write,
    D: DelayNs,
    S: DiagnosticSink,
{
    /// Like [`init()`](AntDriver::init) with a custom diagnostic sink.
    pub fn init_with_sink(
        port: W,
        rx: Consumer<'a, N>,
        delay: D,
        config: ChannelConfig,
        callbacks: Callbacks<'a, W>,
        sink: S,
    ) -> Result<Self, AntError<W::Error>> {
        let mut driver = Self {
            encoder: Encoder::new(port),
            rx,
            assembler: FrameAssembler::new(),
            delay,
            config,
            callbacks,
            sink,
            stage: Stage::Idle,
            stats: LinkStats::default(),
        };
        driver.reset()?;
        driver.configure()?;
        Ok(driver)
    }

    /// Current handshake stage.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The configuration the session was created with.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Link counters.
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// The diagnostic sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Shared access to the transport.
    pub fn transport(&self) -> &W {
        self.encoder.port()
    }

    /// Exclusive access to the transport.
    pub fn transport_mut(&mut self) -> &mut W {
        self.encoder.port_mut()
    }

    /// Ends the session, returning the transport, the queue consumer and the delay.
    pub fn release(self) -> (W, Consumer<'a, N>, D) {
        (self.encoder.release(), self.rx, self.delay)
    }

    /// Drains the receive queue and dispatches every complete frame.
    ///
    /// Returns once the queue is empty and no frame is half received. With an
    /// empty queue this does nothing. A search timeout reported by the radio
    /// reruns the channel handshake before this returns.
    ///
    /// With [`ChannelConfig::ack_timeout_ms`] set, a half-received frame is
    /// dropped once no byte has arrived for that long.
    pub fn poll(&mut self) -> Result<(), AntError<W::Error>> {
        // time since the last byte arrived, not since the frame started
        let mut silent_ms = 0;
        loop {
            while let Some(byte) = self.rx.pop() {
                silent_ms = 0;
                if let Some(frame) = self.accept(byte) {
                    if let Event::SearchTimeout = self.handle(&frame)? {
                        self.configure()?;
                    }
                }
            }
            if !self.assembler.in_frame() {
                return Ok(());
            }
            // the rest of the frame is still on the wire
            match self.config.ack_timeout_ms {
                None => core::hint::spin_loop(),
                Some(limit) if silent_ms >= limit => {
                    warn!("dropping partial frame after {} ms of silence", silent_ms);
                    self.assembler.reset();
                    silent_ms = 0;
                }
                Some(_) => {
                    self.delay.delay_ms(1);
                    silent_ms += 1;
                }
            }
        }
    }

    /// Broadcasts six bytes to `address`.
    pub fn send_broadcast(
        &mut self,
        address: u16,
        data: &[u8; MESG_DATA_LEN],
    ) -> Result<(), AntError<W::Error>> {
        self.encoder
            .send_broadcast(address, data)
            .map_err(AntError::Transport)
    }

    /// Sends six bytes to `address` as acknowledged data.
    pub fn send_acknowledged(
        &mut self,
        address: u16,
        data: &[u8; MESG_DATA_LEN],
    ) -> Result<(), AntError<W::Error>> {
        self.encoder
            .send_acknowledged(address, data)
            .map_err(AntError::Transport)
    }

    /// Asks the radio for its capabilities. The answer is not interpreted; it
    /// reaches the diagnostic sink on a later [`poll()`](AntDriver::poll).
    pub fn request_capabilities(&mut self) -> Result<(), AntError<W::Error>> {
        self.encoder
            .request_capabilities()
            .map_err(AntError::Transport)
    }

    /// Sets the channel search timeout and waits for the radio to accept it.
    ///
    /// If the radio reports a search timeout instead, the channel is
    /// reconfigured and the new timeout is not applied.
    pub fn set_search_timeout(&mut self, timeout: u8) -> Result<(), AntError<W::Error>> {
        self.encoder
            .set_search_timeout(timeout)
            .map_err(AntError::Transport)?;
        match self.await_ack()? {
            Ack::Accepted => Ok(()),
            Ack::Restart => self.configure(),
        }
    }

    /// Runs the channel handshake from [`Stage::AssignChannel`] to
    /// [`Stage::Configured`].
    ///
    /// Each stage's command is sent and acknowledged before the next one starts.
    /// A search timeout received while waiting starts over from the first stage.
    pub fn configure(&mut self) -> Result<(), AntError<W::Error>> {
        'handshake: loop {
            self.stats.configurations = self.stats.configurations.saturating_add(1);
            info!("configuring channel as {:?}", self.config.role);
            self.stage = Stage::Idle.next(self.config.role);

            while self.stage != Stage::Configured {
                if let Some(command) = self.stage.command(&self.config) {
                    self.encoder.send(&command).map_err(AntError::Transport)?;
                }
                if self.stage.awaits_ack() {
                    if let Ack::Restart = self.await_ack()? {
                        warn!("search timeout during {:?}, restarting", self.stage);
                        continue 'handshake;
                    }
                }
                trace!("{:?} done", self.stage);
                self.stage = self.stage.next(self.config.role);
            }

            info!("channel open");
            return Ok(());
        }
    }

    fn reset(&mut self) -> Result<(), AntError<W::Error>> {
        self.stage = Stage::Idle;
        self.assembler.reset();
        self.encoder.reset().map_err(AntError::Transport)?;
        self.delay.delay_ms(self.config.reset_delay_ms);
        Ok(())
    }

    fn await_ack(&mut self) -> Result<Ack, AntError<W::Error>> {
        let Some(limit) = self.config.ack_timeout_ms else {
            return nb::block!(self.poll_ack());
        };
        let mut waited_ms = 0;
        loop {
            match self.poll_ack() {
                Ok(ack) => return Ok(ack),
                Err(nb::Error::Other(err)) => return Err(err),
                Err(nb::Error::WouldBlock) if waited_ms >= limit => {
                    error!("no acknowledgement for {:?}", self.stage);
                    return Err(AntError::AckTimeout {
                        stage: self.stage,
                        waited_ms,
                    });
                }
                Err(nb::Error::WouldBlock) => {
                    self.delay.delay_ms(1);
                    waited_ms += 1;
                }
            }
        }
    }

    fn poll_ack(&mut self) -> nb::Result<Ack, AntError<W::Error>> {
        while let Some(frame) = self.next_frame() {
            match self.handle(&frame).map_err(nb::Error::Other)? {
                Event::Acknowledged => return Ok(Ack::Accepted),
                Event::SearchTimeout => return Ok(Ack::Restart),
                Event::Handled => {}
            }
        }
        Err(nb::Error::WouldBlock)
    }

    /// Feeds queued bytes to the assembler until a valid frame completes or the
    /// queue runs dry.
    fn next_frame(&mut self) -> Option<Frame> {
        while let Some(byte) = self.rx.pop() {
            if let Some(frame) = self.accept(byte) {
                return Some(frame);
            }
        }
        None
    }

    /// Feeds one byte to the assembler, counting and reporting rejected frames.
    fn accept(&mut self, byte: u8) -> Option<Frame> {
        match self.assembler.feed(byte)? {
            Ok(frame) => {
                self.stats.rx_good = self.stats.rx_good.saturating_add(1);
                Some(frame)
            }
            Err(err) => {
                self.stats.rx_bad = self.stats.rx_bad.saturating_add(1);
                if let Ok(diagnostic) = Diagnostic::try_from(err) {
                    self.sink.report(&diagnostic);
                }
                None
            }
        }
    }

    fn handle(&mut self, frame: &Frame) -> Result<Event, AntError<W::Error>> {
        match route(frame) {
            Route::Acknowledged => Ok(Event::Acknowledged),
            Route::SearchTimeout => {
                self.stats.search_timeouts = self.stats.search_timeouts.saturating_add(1);
                self.sink.report(&Diagnostic::SearchTimeout);
                Ok(Event::SearchTimeout)
            }
            Route::ReceiveFailed => {
                debug!("rx fail");
                Ok(Event::Handled)
            }
            Route::TransmitComplete => {
                if let Some(callback) = self.callbacks.on_tx_complete.as_mut() {
                    callback();
                }
                Ok(Event::Handled)
            }
            Route::Broadcast(bytes) => {
                if let Some(callback) = self.callbacks.on_broadcast.as_mut() {
                    callback(bytes, &mut self.encoder).map_err(AntError::Transport)?;
                }
                Ok(Event::Handled)
            }
            Route::Report(diagnostic) => {
                self.sink.report(&diagnostic);
                Ok(Event::Handled)
            }
        }
    }
}

impl<W, D, const N: usize, S> fmt::Debug for AntDriver<'_, W, D, N, S>
where
    W: Write,
    D: DelayNs,
    S: DiagnosticSink,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AntDriver")
            .field("stage", &self.stage)
            .field("config", &self.config)
            .field("stats", &self.stats)
            .field("in_frame", &self.assembler.in_frame())
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::RX_RING_CAPACITY;
    use crate::ring::{OverflowPolicy, Producer, RxQueue};
    use core::convert::Infallible;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<Vec<u8>>>>;
    type Feed<'q> = Rc<RefCell<Producer<'q, RX_RING_CAPACITY>>>;

    /// Loopback radio: records every flushed frame and answers each flush with
    /// the next scripted reply.
    struct Radio<'q> {
        rx: Feed<'q>,
        pending: Vec<u8>,
        sent: Log,
        replies: VecDeque<Vec<u8>>,
    }

    impl<'q> Radio<'q> {
        fn new(rx: Producer<'q, RX_RING_CAPACITY>, replies: Vec<Vec<u8>>) -> (Self, Log) {
            let sent = Log::default();
            let radio = Self {
                rx: Rc::new(RefCell::new(rx)),
                pending: Vec::new(),
                sent: sent.clone(),
                replies: replies.into(),
            };
            (radio, sent)
        }

        fn inject(&mut self, bytes: &[u8]) {
            push_all(&self.rx, bytes);
        }

        /// A second handle on the receive side, for bytes that arrive on their own.
        fn feed(&self) -> Feed<'q> {
            self.rx.clone()
        }
    }

    fn push_all(feed: &Feed<'_>, bytes: &[u8]) {
        let mut producer = feed.borrow_mut();
        for &b in bytes {
            producer.push(b);
        }
    }

    /// Delivers the next scripted burst of bytes on every 1 ms wait.
    struct TrickleDelay<'q> {
        feed: Feed<'q>,
        arrivals: VecDeque<Vec<u8>>,
        waits: usize,
    }

    impl<'q> TrickleDelay<'q> {
        fn new(feed: Feed<'q>, arrivals: Vec<Vec<u8>>) -> Self {
            Self {
                feed,
                arrivals: arrivals.into(),
                waits: 0,
            }
        }
    }

    impl DelayNs for TrickleDelay<'_> {
        fn delay_ns(&mut self, _: u32) {}

        fn delay_ms(&mut self, ms: u32) {
            if ms != 1 {
                return;
            }
            self.waits += 1;
            if let Some(bytes) = self.arrivals.pop_front() {
                push_all(&self.feed, &bytes);
            }
        }
    }

    impl ErrorType for Radio<'_> {
        type Error = Infallible;
    }

    impl Write for Radio<'_> {
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.pending.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), Self::Error> {
            self.sent.borrow_mut().push(std::mem::take(&mut self.pending));
            if let Some(reply) = self.replies.pop_front() {
                self.inject(&reply);
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct Record(Vec<String>);

    impl DiagnosticSink for Record {
        fn report(&mut self, diagnostic: &Diagnostic<'_>) {
            self.0.push(diagnostic.to_string());
        }
    }

    #[derive(Default)]
    struct CountingDelay {
        ns: u64,
    }

    impl DelayNs for CountingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.ns += u64::from(ns);
        }
    }

    fn event(code: u8) -> Vec<u8> {
        Frame::new(0x40, &[0x00, 0x01, code])
            .unwrap()
            .as_bytes()
            .to_vec()
    }

    fn ack() -> Vec<u8> {
        event(0x00)
    }

    /// No reply to the reset, then one acknowledgment per handshake command.
    fn handshake_replies() -> Vec<Vec<u8>> {
        let mut replies = vec![Vec::new()];
        replies.extend((0..5).map(|_| ack()));
        replies
    }

    fn ids(log: &Log) -> Vec<u8> {
        log.borrow().iter().map(|frame| frame[2]).collect()
    }

    const MASTER_SEQUENCE: [u8; 5] = [0x42, 0x51, 0x43, 0x45, 0x4b];

    #[test]
    fn test_master_handshake() {
        let queue: RxQueue<RX_RING_CAPACITY> = RxQueue::new(OverflowPolicy::DropOldest);
        let (producer, consumer) = queue.split().unwrap();
        let (radio, sent) = Radio::new(producer, handshake_replies());
        let config = ChannelConfig::new(Role::Master, 1, 8192, 57);

        let driver =
            AntDriver::init(radio, consumer, NoopDelay, config, Callbacks::new()).unwrap();

        assert_eq!(driver.stage(), Stage::Configured);
        assert_eq!(ids(&sent), vec![0x4a, 0x42, 0x51, 0x43, 0x45, 0x4b]);
        let log = sent.borrow();
        assert_eq!(log[0], vec![0xa4, 0x01, 0x4a, 0x00, 0xa4 ^ 0x01 ^ 0x4a]);
        assert_eq!(&log[1][3..6], &[0x00, 0x30, 0x00]);
        assert_eq!(&log[2][3..8], &[0x00, 0x01, 0x00, 0x03, 0x03]);
        assert_eq!(&log[3][3..6], &[0x00, 0x00, 0x20]);
        assert_eq!(&log[4][3..5], &[0x00, 57]);
        assert_eq!(driver.stats().rx_good, 5);
        assert_eq!(driver.stats().configurations, 1);
    }

    #[test]
    fn test_slave_handshake_announces_address() {
        let queue: RxQueue<RX_RING_CAPACITY> = RxQueue::new(OverflowPolicy::DropOldest);
        let (producer, consumer) = queue.split().unwrap();
        let (radio, sent) = Radio::new(producer, handshake_replies());
        let config = ChannelConfig::new(Role::Slave, 0x0102, 2370, 0x41);

        let driver =
            AntDriver::init(radio, consumer, NoopDelay, config, Callbacks::new()).unwrap();

        assert_eq!(driver.stage(), Stage::Configured);
        assert_eq!(ids(&sent), vec![0x4a, 0x42, 0x51, 0x43, 0x45, 0x4b, 0x4e]);
        let log = sent.borrow();
        assert_eq!(log[1][4], 0x20);
        assert_eq!(
            &log[6][3..12],
            &[0x00, 0x02, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01]
        );
    }

    #[test]
    fn test_reset_waits_for_radio() {
        let queue: RxQueue<RX_RING_CAPACITY> = RxQueue::new(OverflowPolicy::DropOldest);
        let (producer, consumer) = queue.split().unwrap();
        let (radio, _sent) = Radio::new(producer, handshake_replies());
        let config = ChannelConfig::new(Role::Master, 1, 8192, 57);

        let driver = AntDriver::init(
            radio,
            consumer,
            CountingDelay::default(),
            config,
            Callbacks::new(),
        )
        .unwrap();

        let (_, _, delay) = driver.release();
        assert_eq!(delay.ns, 600_000_000);
    }

    #[test]
    fn test_ack_advances_to_channel_id() {
        let queue: RxQueue<RX_RING_CAPACITY> = RxQueue::new(OverflowPolicy::DropOldest);
        let (producer, consumer) = queue.split().unwrap();
        // reset, then only the assign channel command is acknowledged
        let (radio, sent) = Radio::new(producer, vec![Vec::new(), ack()]);
        let config = ChannelConfig::new(Role::Master, 1, 8192, 57).with_ack_timeout_ms(5);

        let result = AntDriver::init(radio, consumer, NoopDelay, config, Callbacks::new());

        assert_eq!(
            result.err(),
            Some(AntError::AckTimeout {
                stage: Stage::SetChannelId,
                waited_ms: 5,
            })
        );
        assert_eq!(ids(&sent), vec![0x4a, 0x42, 0x51]);
    }

    #[test]
    fn test_search_timeout_reconfigures_master() {
        let queue: RxQueue<RX_RING_CAPACITY> = RxQueue::new(OverflowPolicy::DropOldest);
        let (producer, consumer) = queue.split().unwrap();
        let (radio, sent) = Radio::new(producer, handshake_replies());
        let config = ChannelConfig::new(Role::Master, 1, 8192, 57);
        let mut driver = AntDriver::init_with_sink(
            radio,
            consumer,
            NoopDelay,
            config,
            Callbacks::new(),
            Record::default(),
        )
        .unwrap();

        driver.transport_mut().replies.extend((0..5).map(|_| ack()));
        driver.transport_mut().inject(&event(0x01));
        driver.poll().unwrap();

        assert_eq!(driver.stage(), Stage::Configured);
        assert_eq!(&ids(&sent)[6..], &MASTER_SEQUENCE);
        assert_eq!(driver.stats().search_timeouts, 1);
        assert_eq!(driver.stats().configurations, 2);
        assert_eq!(driver.sink().0, vec!["search timeout, re-opening channel"]);
    }

    #[test]
    fn test_search_timeout_reconfigures_slave() {
        let queue: RxQueue<RX_RING_CAPACITY> = RxQueue::new(OverflowPolicy::DropOldest);
        let (producer, consumer) = queue.split().unwrap();
        let (radio, sent) = Radio::new(producer, handshake_replies());
        let config = ChannelConfig::new(Role::Slave, 1, 2370, 0x41);
        let mut driver =
            AntDriver::init(radio, consumer, NoopDelay, config, Callbacks::new()).unwrap();

        driver.transport_mut().replies.extend((0..5).map(|_| ack()));
        driver.transport_mut().inject(&event(0x01));
        driver.poll().unwrap();

        assert_eq!(driver.stage(), Stage::Configured);
        assert_eq!(&ids(&sent)[7..], &[0x42, 0x51, 0x43, 0x45, 0x4b, 0x4e]);
        assert_eq!(sent.borrow()[7][4], 0x20);
    }

    #[test]
    fn test_search_timeout_mid_handshake_restarts() {
        let queue: RxQueue<RX_RING_CAPACITY> = RxQueue::new(OverflowPolicy::DropOldest);
        let (producer, consumer) = queue.split().unwrap();
        let mut replies = vec![Vec::new(), ack(), event(0x01)];
        replies.extend((0..5).map(|_| ack()));
        let (radio, sent) = Radio::new(producer, replies);
        let config = ChannelConfig::new(Role::Master, 1, 8192, 57);

        let driver =
            AntDriver::init(radio, consumer, NoopDelay, config, Callbacks::new()).unwrap();

        assert_eq!(driver.stage(), Stage::Configured);
        assert_eq!(
            ids(&sent),
            vec![0x4a, 0x42, 0x51, 0x42, 0x51, 0x43, 0x45, 0x4b]
        );
        assert_eq!(driver.stats().configurations, 2);
    }

    #[test]
    fn test_broadcast_callback_gets_whole_frame() {
        let queue: RxQueue<RX_RING_CAPACITY> = RxQueue::new(OverflowPolicy::DropOldest);
        let (producer, consumer) = queue.split().unwrap();
        let (radio, sent) = Radio::new(producer, handshake_replies());
        let config = ChannelConfig::new(Role::Master, 1, 8192, 57);

        let mut seen: Vec<(Vec<u8>, usize)> = Vec::new();
        let mut on_broadcast =
            |frame: &[u8], encoder: &mut Encoder<Radio>| -> Result<(), Infallible> {
                seen.push((frame.to_vec(), frame.len()));
                encoder.send_broadcast(1, &[0xbb; 6])
            };
        let callbacks: Callbacks<'_, Radio> = Callbacks::new().on_broadcast(&mut on_broadcast);
        let mut driver = AntDriver::init(radio, consumer, NoopDelay, config, callbacks).unwrap();

        let frame = [
            0xa4, 0x09, 0x4e, 0x00, 0x01, 0x00, 0x2a, 0x00, 0x2b, 0x00, 0x2c, 0x00, 0xcf,
        ];
        driver.transport_mut().inject(&frame);
        driver.poll().unwrap();
        drop(driver);

        assert_eq!(seen, vec![(frame.to_vec(), 13)]);
        let log = sent.borrow();
        let reply = log.last().unwrap();
        assert_eq!(reply[2], 0x4e);
        assert_eq!(&reply[6..12], &[0xbb; 6]);
    }

    #[test]
    fn test_tx_complete_callback() {
        let queue: RxQueue<RX_RING_CAPACITY> = RxQueue::new(OverflowPolicy::DropOldest);
        let (producer, consumer) = queue.split().unwrap();
        let (radio, _sent) = Radio::new(producer, handshake_replies());
        let config = ChannelConfig::new(Role::Master, 1, 8192, 57);

        let mut completed = 0;
        let mut on_tx = || completed += 1;
        let callbacks = Callbacks::new().on_tx_complete(&mut on_tx);
        let mut driver = AntDriver::init(radio, consumer, NoopDelay, config, callbacks).unwrap();

        driver.transport_mut().inject(&event(0x03));
        driver.transport_mut().inject(&event(0x03));
        driver.poll().unwrap();
        drop(driver);

        assert_eq!(completed, 2);
    }

    #[test]
    fn test_missing_callbacks_are_skipped() {
        let queue: RxQueue<RX_RING_CAPACITY> = RxQueue::new(OverflowPolicy::DropOldest);
        let (producer, consumer) = queue.split().unwrap();
        let (radio, sent) = Radio::new(producer, handshake_replies());
        let config = ChannelConfig::new(Role::Master, 1, 8192, 57);
        let mut driver = AntDriver::init_with_sink(
            radio,
            consumer,
            NoopDelay,
            config,
            Callbacks::default(),
            Record::default(),
        )
        .unwrap();

        let broadcast = Frame::new(0x4e, &[0, 1, 0, 1, 2, 3, 4, 5, 6]).unwrap();
        driver.transport_mut().inject(broadcast.as_bytes());
        driver.transport_mut().inject(&event(0x03));
        driver.poll().unwrap();

        assert!(driver.sink().0.is_empty());
        assert_eq!(sent.borrow().len(), 6);
    }

    #[test]
    fn test_rx_fail_and_unknown_events_keep_stage() {
        let queue: RxQueue<RX_RING_CAPACITY> = RxQueue::new(OverflowPolicy::DropOldest);
        let (producer, consumer) = queue.split().unwrap();
        let (radio, sent) = Radio::new(producer, handshake_replies());
        let config = ChannelConfig::new(Role::Master, 1, 8192, 57);
        let mut driver = AntDriver::init_with_sink(
            radio,
            consumer,
            NoopDelay,
            config,
            Callbacks::new(),
            Record::default(),
        )
        .unwrap();

        driver.transport_mut().inject(&event(0x02));
        driver.transport_mut().inject(&event(0x07));
        driver.transport_mut().inject(&ack());
        driver.poll().unwrap();

        assert_eq!(driver.stage(), Stage::Configured);
        assert_eq!(driver.sink().0, vec!["m: 40 - 00 01 07"]);
        assert_eq!(sent.borrow().len(), 6);
    }

    #[test]
    fn test_poll_empty_is_noop() {
        let queue: RxQueue<RX_RING_CAPACITY> = RxQueue::new(OverflowPolicy::DropOldest);
        let (producer, consumer) = queue.split().unwrap();
        let (radio, sent) = Radio::new(producer, handshake_replies());
        let config = ChannelConfig::new(Role::Slave, 1, 2370, 0x41);
        let mut driver = AntDriver::init_with_sink(
            radio,
            consumer,
            NoopDelay,
            config,
            Callbacks::new(),
            Record::default(),
        )
        .unwrap();
        let stats = driver.stats();

        driver.poll().unwrap();
        driver.poll().unwrap();

        assert_eq!(driver.stage(), Stage::Configured);
        assert_eq!(driver.stats(), stats);
        assert!(driver.sink().0.is_empty());
        assert_eq!(sent.borrow().len(), 7);
    }

    #[test]
    fn test_checksum_failure_reported_and_skipped() {
        let queue: RxQueue<RX_RING_CAPACITY> = RxQueue::new(OverflowPolicy::DropOldest);
        let (producer, consumer) = queue.split().unwrap();
        let (radio, _sent) = Radio::new(producer, handshake_replies());
        let config = ChannelConfig::new(Role::Master, 1, 8192, 57);

        let mut completed = 0;
        let mut on_tx = || completed += 1;
        let callbacks = Callbacks::new().on_tx_complete(&mut on_tx);
        let mut driver = AntDriver::init_with_sink(
            radio,
            consumer,
            NoopDelay,
            config,
            callbacks,
            Record::default(),
        )
        .unwrap();

        let mut corrupted = event(0x03);
        corrupted[6] ^= 0x10;
        driver.transport_mut().inject(&[0x00, 0x55]);
        driver.transport_mut().inject(&corrupted);
        driver.transport_mut().inject(&event(0x03));
        driver.poll().unwrap();

        assert_eq!(driver.stats().rx_bad, 1);
        assert_eq!(
            driver.sink().0,
            vec!["checksum failed: m: 40 (expected e5, found f5)"]
        );
        drop(driver);
        assert_eq!(completed, 1);
    }

    #[test]
    fn test_send_primitives() {
        let queue: RxQueue<RX_RING_CAPACITY> = RxQueue::new(OverflowPolicy::DropOldest);
        let (producer, consumer) = queue.split().unwrap();
        let (radio, sent) = Radio::new(producer, handshake_replies());
        let config = ChannelConfig::new(Role::Master, 1, 8192, 57);
        let mut driver =
            AntDriver::init(radio, consumer, NoopDelay, config, Callbacks::new()).unwrap();

        driver.send_broadcast(0x0001, &[1, 2, 3, 4, 5, 6]).unwrap();
        driver.send_acknowledged(0x0002, &[6, 5, 4, 3, 2, 1]).unwrap();
        driver.request_capabilities().unwrap();
        driver.transport_mut().replies.push_back(ack());
        driver.set_search_timeout(12).unwrap();

        assert_eq!(&ids(&sent)[6..], &[0x4e, 0x4f, 0x4d, 0x44]);
        let log = sent.borrow();
        assert_eq!(&log[7][3..12], &[0x00, 0x02, 0x00, 6, 5, 4, 3, 2, 1]);
        assert_eq!(&log[9][3..5], &[0x00, 12]);
        assert_eq!(driver.stage(), Stage::Configured);
    }

    #[test]
    fn test_transport_error_propagates() {
        struct Broken;

        impl ErrorType for Broken {
            type Error = embedded_io::ErrorKind;
        }

        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> Result<usize, Self::Error> {
                Err(embedded_io::ErrorKind::BrokenPipe)
            }

            fn flush(&mut self) -> Result<(), Self::Error> {
                Ok(())
            }
        }

        let queue: RxQueue<16> = RxQueue::new(OverflowPolicy::DropOldest);
        let (_producer, consumer) = queue.split().unwrap();
        let config = ChannelConfig::new(Role::Master, 1, 8192, 57);

        let result = AntDriver::init(Broken, consumer, NoopDelay, config, Callbacks::new());
        assert_eq!(
            result.err(),
            Some(AntError::Transport(embedded_io::ErrorKind::BrokenPipe))
        );
    }

    #[test]
    fn test_partial_frame_wait_measures_silence() {
        let queue: RxQueue<RX_RING_CAPACITY> = RxQueue::new(OverflowPolicy::DropOldest);
        let (producer, consumer) = queue.split().unwrap();
        let (radio, _sent) = Radio::new(producer, handshake_replies());
        let feed = radio.feed();

        // a fresh frame starts on the third wait and finishes on the fourth
        let mut head = event(0x03);
        let tail = head.split_off(3);
        let delay = TrickleDelay::new(feed.clone(), vec![Vec::new(), Vec::new(), head, tail]);
        let config = ChannelConfig::new(Role::Master, 1, 8192, 57).with_ack_timeout_ms(3);

        let mut completed = 0;
        let mut on_tx = || completed += 1;
        let callbacks = Callbacks::new().on_tx_complete(&mut on_tx);
        let mut driver = AntDriver::init(radio, consumer, delay, config, callbacks).unwrap();

        // stale header of a frame that never finishes
        push_all(&feed, &[0xa4, 0x03]);
        driver.poll().unwrap();
        driver.poll().unwrap();

        let (_, _, delay) = driver.release();
        assert_eq!(delay.waits, 4);
        assert_eq!(completed, 1);
    }

    #[test]
    fn test_stale_partial_frame_dropped_after_silence() {
        let queue: RxQueue<RX_RING_CAPACITY> = RxQueue::new(OverflowPolicy::DropOldest);
        let (producer, consumer) = queue.split().unwrap();
        let (radio, _sent) = Radio::new(producer, handshake_replies());
        let feed = radio.feed();
        let delay = TrickleDelay::new(feed.clone(), Vec::new());
        let config = ChannelConfig::new(Role::Master, 1, 8192, 57).with_ack_timeout_ms(3);

        let mut completed = 0;
        let mut on_tx = || completed += 1;
        let callbacks = Callbacks::new().on_tx_complete(&mut on_tx);
        let mut driver = AntDriver::init(radio, consumer, delay, config, callbacks).unwrap();

        push_all(&feed, &[0xa4, 0x03, 0x40]);
        driver.poll().unwrap();
        // the dropped header does not swallow the next frame
        push_all(&feed, &event(0x03));
        driver.poll().unwrap();

        let (_, _, delay) = driver.release();
        assert_eq!(delay.waits, 3);
        assert_eq!(completed, 1);
    }

    #[test]
    fn test_stage_sequence() {
        let mut stage = Stage::Idle;
        let mut master = Vec::new();
        while stage != Stage::Configured {
            stage = stage.next(Role::Master);
            master.push(stage);
        }
        assert_eq!(
            master,
            vec![
                Stage::AssignChannel,
                Stage::SetChannelId,
                Stage::SetPeriod,
                Stage::SetFrequency,
                Stage::OpenChannel,
                Stage::Configured,
            ]
        );
        assert_eq!(Stage::OpenChannel.next(Role::Slave), Stage::AddressAnnounce);
        assert_eq!(Stage::AddressAnnounce.next(Role::Slave), Stage::Configured);
        assert_eq!(Stage::Configured.next(Role::Slave), Stage::Configured);
        assert!(!Stage::AddressAnnounce.awaits_ack());
        assert!(Stage::OpenChannel.awaits_ack());
        let config = ChannelConfig::new(Role::Master, 1, 8192, 57);
        assert_eq!(Stage::Idle.command(&config), None);
        assert_eq!(Stage::Configured.command(&config), None);
    }
}
