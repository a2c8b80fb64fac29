/// Declares the static receive queue `ANT_RX` and its producer slot
/// `ANT_RX_PRODUCER`.
///
/// # Arguments
/// - `$n`: queue capacity in bytes
/// - `$policy`: optional [`OverflowPolicy`](crate::ring::OverflowPolicy),
///   `DropOldest` when omitted
///
/// # Example
/// ```rust
/// ant_uart::init_ant_rx!(255);
/// ```
#[macro_export]
macro_rules! init_ant_rx {
    ( $n:expr ) => {
        $crate::init_ant_rx!($n, $crate::ring::OverflowPolicy::DropOldest);
    };
    ( $n:expr, $policy:expr ) => {
        /// Bytes received from the radio, filled by `ant_rx_isr!`.
        pub static ANT_RX: $crate::ring::RxQueue<{ $n }> = $crate::ring::RxQueue::new($policy);

        /// Producer half of `ANT_RX`, set by `setup_ant_rx!`.
        pub static ANT_RX_PRODUCER: $crate::isr::GlobalRxProducer<{ $n }> =
            $crate::isr::global_rx_producer_init();
    };
}

/// Splits `ANT_RX`, parks the producer for the interrupt and evaluates to the
/// consumer (`Option`, `None` if already split).
///
/// # Example
/// ```rust
/// ant_uart::init_ant_rx!(64);
///
/// let consumer = ant_uart::setup_ant_rx!().unwrap();
/// assert!(consumer.is_empty());
/// ```
///
/// # Notes
/// - Requires `init_ant_rx!` to have been used earlier.
#[macro_export]
macro_rules! setup_ant_rx {
    () => {
        $crate::isr::global_rx_producer_setup(&ANT_RX, &ANT_RX_PRODUCER)
    };
}

/// Pushes received bytes into `ANT_RX` from the UART receive interrupt.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn USART1() {
///     ant_rx_isr!(uart.read_byte());
/// }
/// ```
///
/// # Notes
/// - Silently drops bytes until `setup_ant_rx!` has run.
#[macro_export]
macro_rules! ant_rx_isr {
    ( $byte:expr ) => {
        $crate::isr::global_rx_push(&ANT_RX_PRODUCER, $byte)
    };
    ( $($byte:expr),+ $(,)? ) => {
        $crate::isr::global_rx_push_all(&ANT_RX_PRODUCER, &[$($byte),+])
    };
}
