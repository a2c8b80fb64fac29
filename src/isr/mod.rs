//! Interrupt-side plumbing for the receive queue.
//!
//! The UART receive interrupt and the main loop share the radio's receive
//! queue. The queue itself is a `static` [`RxQueue`]; its [`Producer`] half is
//! parked in a `critical_section` mutex so the interrupt handler can reach it,
//! while the [`Consumer`] half goes to [`AntDriver`](crate::driver::AntDriver).
//!
//! Two equivalent ways to wire this up:
//! - the `global_rx_*` functions, when the statics are declared by hand
//! - the `init_ant_rx!`, `setup_ant_rx!` and `ant_rx_isr!` macros, which
//!   declare `ANT_RX` and `ANT_RX_PRODUCER` for you
//!
//! A push from the interrupt never blocks. When the queue is full the
//! queue's [`OverflowPolicy`](crate::ring::OverflowPolicy) decides which byte
//! is lost.

use crate::ring::{Consumer, Producer, RxQueue};
use core::cell::RefCell;
use critical_section::Mutex;

mod macros;

/// Slot holding the producer half of a static [`RxQueue`].
pub type GlobalRxProducer<const N: usize> = Mutex<RefCell<Option<Producer<'static, N>>>>;

/// Used to initialize the global producer slot for use with
/// `critical_section`.
///
/// # Returns
/// * An empty slot
///
/// # Example
/// ```rust
/// use ant_uart::isr::{GlobalRxProducer, global_rx_producer_init};
/// use ant_uart::ring::{OverflowPolicy, RxQueue};
///
/// static RX: RxQueue<255> = RxQueue::new(OverflowPolicy::DropOldest);
/// static RX_PRODUCER: GlobalRxProducer<255> = global_rx_producer_init();
/// ```
pub const fn global_rx_producer_init<const N: usize>() -> GlobalRxProducer<N> {
    Mutex::new(RefCell::new(None))
}

/// Splits `queue`, parks the producer in `global` and returns the consumer.
///
/// # Returns
/// * The consumer to hand to the driver, or `None` if `queue` was already split
pub fn global_rx_producer_setup<const N: usize>(
    queue: &'static RxQueue<N>,
    global: &'static GlobalRxProducer<N>,
) -> Option<Consumer<'static, N>> {
    let (producer, consumer) = queue.split()?;
    critical_section::with(|cs| {
        let _ = global.borrow(cs).replace(Some(producer));
    });
    Some(consumer)
}

/// Pushes one received byte. Call from the UART receive interrupt.
///
/// Does nothing until [`global_rx_producer_setup`] has run.
///
///# Example
/// ```rust,ignore
/// #[interrupt]
/// fn USART1() {
///     let byte = uart_rx.read();
///     global_rx_push(&RX_PRODUCER, byte);
/// }
/// ```
pub fn global_rx_push<const N: usize>(global: &'static GlobalRxProducer<N>, byte: u8) {
    critical_section::with(|cs| {
        if let Some(producer) = global.borrow(cs).borrow_mut().as_mut() {
            producer.push(byte);
        }
    });
}

/// Pushes every byte of `bytes`, for peripherals that hand over a FIFO's worth
/// at a time.
pub fn global_rx_push_all<const N: usize>(global: &'static GlobalRxProducer<N>, bytes: &[u8]) {
    critical_section::with(|cs| {
        if let Some(producer) = global.borrow(cs).borrow_mut().as_mut() {
            for &byte in bytes {
                producer.push(byte);
            }
        }
    });
}
