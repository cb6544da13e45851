//! Simulated CAN Controller
//!
//! In-memory stand-in for the hardware driver. Frames arriving from the bus
//! are injected with [`SimulatedController::inject`]; transmitted frames are
//! recorded and, in loopback mode, fed back into the receive FIFO. Clones
//! share one controller, so the interrupt thread and the main loop can each
//! hold their own handle.

use crate::error::PeripheralError;
use crate::peripheral::{CanControl, CanReceive, CanTransmit, InterruptHandler};
use crate::types::{
    BufferSelector, FilterConfig, Interrupts, MaskConfig, OperatingMode, RxHeader, TxHeader,
    MAX_PAYLOAD,
};
use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// Default depth of the hardware receive FIFO
pub const DEFAULT_FIFO_DEPTH: usize = 16;

/// Buffers 0..TX_BUFFER_COUNT are transmit buffers
pub const TX_BUFFER_COUNT: u8 = 8;

/// Highest bit rate the controller accepts
pub const MAX_BITRATE: u32 = 1_000_000;

/// Frame as it crossed the simulated bus
pub type RawFrame<H> = (H, [u8; MAX_PAYLOAD]);

#[derive(Debug)]
struct SimState {
    mode: OperatingMode,
    bitrate: Option<u32>,
    fifo_depth: usize,
    rx_fifo: VecDeque<RawFrame<RxHeader>>,
    rx_overflowed: bool,
    transmitted: Vec<RawFrame<TxHeader>>,
    tx_busy: bool,
    fail_next_tx: Option<PeripheralError>,
    fail_next_rx: Option<PeripheralError>,
    filters: Vec<FilterConfig>,
    masks: Vec<MaskConfig>,
    enabled: Interrupts,
    active: Interrupts,
    line: Option<mpsc::Sender<Interrupts>>,
}

impl SimState {
    fn new(fifo_depth: usize) -> Self {
        Self {
            mode: OperatingMode::Configuration,
            bitrate: None,
            fifo_depth,
            rx_fifo: VecDeque::with_capacity(fifo_depth),
            rx_overflowed: false,
            transmitted: Vec::new(),
            tx_busy: false,
            fail_next_tx: None,
            fail_next_rx: None,
            filters: Vec::new(),
            masks: Vec::new(),
            enabled: Interrupts::empty(),
            active: Interrupts::empty(),
            line: None,
        }
    }

    fn receives(&self) -> bool {
        !matches!(
            self.mode,
            OperatingMode::Disable | OperatingMode::Configuration
        )
    }

    fn transmits(&self) -> bool {
        matches!(self.mode, OperatingMode::Normal | OperatingMode::Loopback)
    }

    fn enqueue_rx(&mut self, header: RxHeader, payload: [u8; MAX_PAYLOAD]) -> bool {
        if self.rx_fifo.len() >= self.fifo_depth {
            self.rx_overflowed = true;
            self.raise(Interrupts::RX_OVERFLOW);
            return false;
        }
        self.rx_fifo.push_back((header, payload));
        self.raise(Interrupts::RX);
        true
    }

    fn raise(&mut self, kind: Interrupts) {
        self.active |= kind;
        if !self.enabled.intersects(kind) {
            return;
        }
        let signal = self.active & self.enabled;
        let delivered = self.line.as_ref().map(|line| line.send(signal).is_ok());
        if delivered == Some(false) {
            self.line = None;
        }
    }
}

/// In-memory CAN controller
#[derive(Debug, Clone)]
pub struct SimulatedController {
    shared: Arc<Mutex<SimState>>,
}

impl SimulatedController {
    /// Create a controller with the default receive FIFO depth
    pub fn new() -> Self {
        Self::with_fifo_depth(DEFAULT_FIFO_DEPTH)
    }

    pub fn with_fifo_depth(fifo_depth: usize) -> Self {
        Self {
            shared: Arc::new(Mutex::new(SimState::new(fifo_depth.max(1)))),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver a frame from the bus into the receive FIFO
    ///
    /// Returns `false` if the controller is not receiving or the FIFO is full.
    pub fn inject(&self, header: RxHeader, payload: [u8; MAX_PAYLOAD]) -> bool {
        let mut state = self.state();
        if !state.receives() {
            return false;
        }
        state.enqueue_rx(header, payload)
    }

    /// Deliver a standard-identifier data frame from the bus
    pub fn inject_data(&self, id: u32, data: &[u8]) -> bool {
        let length = data.len().min(MAX_PAYLOAD);
        let mut payload = [0u8; MAX_PAYLOAD];
        payload[..length].copy_from_slice(&data[..length]);

        let header = RxHeader {
            id,
            length: length as u8,
            ..Default::default()
        };
        self.inject(header, payload)
    }

    /// Make the next `receive` fail with `err`
    pub fn fail_next_receive(&self, err: PeripheralError) {
        self.state().fail_next_rx = Some(err);
    }

    /// Make the next `transmit` fail with `err`
    pub fn fail_next_transmit(&self, err: PeripheralError) {
        self.state().fail_next_tx = Some(err);
    }

    /// Mark every transmit buffer occupied until `abort` or `set_tx_busy(false)`
    pub fn set_tx_busy(&self, busy: bool) {
        self.state().tx_busy = busy;
    }

    /// Frames sent so far, oldest first
    pub fn transmitted(&self) -> Vec<RawFrame<TxHeader>> {
        self.state().transmitted.clone()
    }

    /// Take and clear the record of sent frames
    pub fn take_transmitted(&self) -> Vec<RawFrame<TxHeader>> {
        std::mem::take(&mut self.state().transmitted)
    }

    /// Messages waiting in the hardware receive FIFO
    pub fn rx_fifo_len(&self) -> usize {
        self.state().rx_fifo.len()
    }

    pub fn mode(&self) -> OperatingMode {
        self.state().mode
    }

    pub fn bitrate(&self) -> Option<u32> {
        self.state().bitrate
    }

    pub fn enabled_interrupts(&self) -> Interrupts {
        self.state().enabled
    }

    pub fn filters(&self) -> Vec<FilterConfig> {
        self.state().filters.clone()
    }

    pub fn masks(&self) -> Vec<MaskConfig> {
        self.state().masks.clone()
    }

    /// Whether an interrupt thread is still attached
    pub fn interrupts_attached(&self) -> bool {
        self.state().line.is_some()
    }

    /// Acknowledge interrupt flags
    pub fn clear_interrupt(&self, kind: Interrupts) {
        self.state().active.remove(kind);
    }

    /// Run `handler` on a dedicated thread for every enabled interrupt
    ///
    /// The thread stands in for the interrupt vector: each raised interrupt
    /// runs the handler to completion before the next one is delivered.
    pub fn spawn_interrupt_thread<H>(&self, mut handler: H) -> std::io::Result<InterruptThread<H>>
    where
        H: InterruptHandler + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Interrupts>();
        self.state().line = Some(tx);

        let handle = thread::Builder::new()
            .name("can-rx-isr".to_string())
            .spawn(move || {
                for active in rx {
                    handler.on_interrupt(active);
                }
                handler
            })?;

        info!("Interrupt thread attached to simulated CAN controller");
        Ok(InterruptThread { handle })
    }

    /// Disconnect the interrupt line, letting the interrupt thread finish
    pub fn detach_interrupts(&self) {
        if self.state().line.take().is_some() {
            debug!("Interrupt line detached");
        }
    }
}

impl Default for SimulatedController {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the thread running an [`InterruptHandler`]
pub struct InterruptThread<H> {
    handle: JoinHandle<H>,
}

impl<H> InterruptThread<H> {
    /// Wait for the thread to finish and get the handler back
    ///
    /// Call [`SimulatedController::detach_interrupts`] first, or this waits
    /// forever.
    pub fn join(self) -> thread::Result<H> {
        self.handle.join()
    }
}

impl CanControl for SimulatedController {
    fn init(&mut self, mode: OperatingMode) {
        let mut state = self.state();
        state.mode = mode;
        state.rx_fifo.clear();
        state.rx_overflowed = false;
        state.tx_busy = false;
        state.active = Interrupts::empty();
        debug!("Simulated controller initialized in {:?} mode", mode);
    }

    fn set_baud(&mut self, clock_hz: u32, rate: u32) -> Result<(), PeripheralError> {
        if rate == 0 || rate > MAX_BITRATE || clock_hz < rate {
            return Err(PeripheralError::BaudInvalid);
        }
        if clock_hz % rate != 0 {
            return Err(PeripheralError::BaudNotDivisible);
        }
        self.state().bitrate = Some(rate);
        Ok(())
    }

    fn configure_filter(&mut self, filter: FilterConfig) {
        self.state().filters.push(filter);
    }

    fn configure_mask(&mut self, mask: MaskConfig) {
        self.state().masks.push(mask);
    }

    fn enable_interrupt(&mut self, kind: Interrupts) {
        self.state().enabled |= kind;
    }

    fn disable_interrupt(&mut self, kind: Interrupts) {
        self.state().enabled.remove(kind);
    }

    fn active_interrupts(&self) -> Interrupts {
        self.state().active
    }
}

impl CanTransmit for SimulatedController {
    fn transmit(
        &mut self,
        header: &TxHeader,
        payload: &[u8; MAX_PAYLOAD],
        buffer: BufferSelector,
    ) -> Result<(), PeripheralError> {
        let mut state = self.state();

        if let Some(err) = state.fail_next_tx.take() {
            return Err(err);
        }
        match buffer {
            BufferSelector::AnyTx => {}
            BufferSelector::Buffer(n) if n < TX_BUFFER_COUNT => {}
            _ => return Err(PeripheralError::NotTx),
        }
        // Listen-only and inactive modes have no transmit buffers
        if !state.transmits() {
            return Err(PeripheralError::NotTx);
        }
        if state.tx_busy {
            return Err(PeripheralError::TxFull);
        }

        let mut header = *header;
        header.length = header.length.min(MAX_PAYLOAD as u8);
        state.transmitted.push((header, *payload));
        state.raise(Interrupts::TX);

        if state.mode == OperatingMode::Loopback {
            state.enqueue_rx(RxHeader::from(header), *payload);
        }
        Ok(())
    }

    fn tx_buffer_free(&self, buffer: BufferSelector) -> bool {
        let state = self.state();
        let is_tx = match buffer {
            BufferSelector::AnyTx => true,
            BufferSelector::Buffer(n) => n < TX_BUFFER_COUNT,
            _ => false,
        };
        is_tx && state.transmits() && !state.tx_busy
    }

    fn abort(&mut self, _buffer: BufferSelector) {
        self.state().tx_busy = false;
    }
}

impl CanReceive for SimulatedController {
    fn has_pending(&self, buffer: BufferSelector) -> bool {
        match buffer {
            BufferSelector::Fifo | BufferSelector::AnyRx => !self.state().rx_fifo.is_empty(),
            _ => false,
        }
    }

    fn receive(
        &mut self,
        buffer: BufferSelector,
    ) -> Result<(RxHeader, [u8; MAX_PAYLOAD]), PeripheralError> {
        let mut state = self.state();

        if let Some(err) = state.fail_next_rx.take() {
            return Err(err);
        }
        if !matches!(buffer, BufferSelector::Fifo | BufferSelector::AnyRx) {
            return Err(PeripheralError::RxEmpty);
        }

        let (mut header, payload) = state.rx_fifo.pop_front().ok_or(PeripheralError::RxEmpty)?;
        if state.rx_overflowed {
            header.overflow = true;
            state.rx_overflowed = false;
            state.active.remove(Interrupts::RX_OVERFLOW);
        }
        if state.rx_fifo.is_empty() {
            state.active.remove(Interrupts::RX);
        }
        Ok((header, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(mode: OperatingMode) -> SimulatedController {
        let mut ctrl = SimulatedController::new();
        ctrl.init(mode);
        ctrl
    }

    #[test]
    fn test_inject_and_receive() {
        let mut ctrl = running(OperatingMode::Normal);
        assert!(!ctrl.has_pending(BufferSelector::Fifo));

        assert!(ctrl.inject_data(0x321, &[0xDE, 0xAD]));
        assert!(ctrl.has_pending(BufferSelector::Fifo));
        assert!(ctrl.active_interrupts().contains(Interrupts::RX));

        let (header, payload) = ctrl.receive(BufferSelector::Fifo).unwrap();
        assert_eq!(header.id, 0x321);
        assert_eq!(header.length, 2);
        assert_eq!(&payload[..2], &[0xDE, 0xAD]);
        assert!(!ctrl.active_interrupts().contains(Interrupts::RX));
        assert_eq!(
            ctrl.receive(BufferSelector::Fifo),
            Err(PeripheralError::RxEmpty)
        );
    }

    #[test]
    fn test_configuration_mode_ignores_bus() {
        let ctrl = SimulatedController::new();
        assert_eq!(ctrl.mode(), OperatingMode::Configuration);
        assert!(!ctrl.inject_data(0x10, &[1]));
        assert_eq!(ctrl.rx_fifo_len(), 0);
    }

    #[test]
    fn test_fifo_overflow_flags_next_read() {
        let mut ctrl = SimulatedController::with_fifo_depth(2);
        ctrl.init(OperatingMode::Normal);

        assert!(ctrl.inject_data(1, &[1]));
        assert!(ctrl.inject_data(2, &[2]));
        assert!(!ctrl.inject_data(3, &[3]));
        assert!(ctrl.active_interrupts().contains(Interrupts::RX_OVERFLOW));

        let (first, _) = ctrl.receive(BufferSelector::Fifo).unwrap();
        assert!(first.overflow);
        let (second, _) = ctrl.receive(BufferSelector::Fifo).unwrap();
        assert!(!second.overflow);
        assert_eq!(second.id, 2);
    }

    #[test]
    fn test_loopback_echoes_transmit() {
        let mut ctrl = running(OperatingMode::Loopback);
        let header = TxHeader {
            id: 0x55,
            length: 1,
            ..Default::default()
        };
        ctrl.transmit(&header, &[7, 0, 0, 0, 0, 0, 0, 0], BufferSelector::AnyTx)
            .unwrap();

        assert_eq!(ctrl.transmitted().len(), 1);
        let (rx, payload) = ctrl.receive(BufferSelector::Fifo).unwrap();
        assert_eq!(rx.id, 0x55);
        assert_eq!(payload[0], 7);
    }

    #[test]
    fn test_transmit_errors() {
        let mut ctrl = running(OperatingMode::Normal);
        let header = TxHeader::default();
        let payload = [0u8; MAX_PAYLOAD];

        assert_eq!(
            ctrl.transmit(&header, &payload, BufferSelector::Fifo),
            Err(PeripheralError::NotTx)
        );
        assert_eq!(
            ctrl.transmit(&header, &payload, BufferSelector::Buffer(TX_BUFFER_COUNT)),
            Err(PeripheralError::NotTx)
        );

        ctrl.set_tx_busy(true);
        assert!(!ctrl.tx_buffer_free(BufferSelector::AnyTx));
        assert_eq!(
            ctrl.transmit(&header, &payload, BufferSelector::AnyTx),
            Err(PeripheralError::TxFull)
        );
        ctrl.abort(BufferSelector::AnyTx);
        assert!(ctrl.tx_buffer_free(BufferSelector::AnyTx));

        ctrl.fail_next_transmit(PeripheralError::IsRtr);
        assert_eq!(
            ctrl.transmit(&header, &payload, BufferSelector::AnyTx),
            Err(PeripheralError::IsRtr)
        );
        assert!(ctrl.transmit(&header, &payload, BufferSelector::AnyTx).is_ok());
        assert_eq!(ctrl.take_transmitted().len(), 1);
        assert!(ctrl.transmitted().is_empty());
    }

    #[test]
    fn test_listen_only_cannot_transmit() {
        let mut ctrl = running(OperatingMode::ListenOnly);
        assert_eq!(
            ctrl.transmit(&TxHeader::default(), &[0; 8], BufferSelector::AnyTx),
            Err(PeripheralError::NotTx)
        );
    }

    #[test]
    fn test_set_baud() {
        let mut ctrl = SimulatedController::new();
        assert_eq!(ctrl.set_baud(40_000_000, 0), Err(PeripheralError::BaudInvalid));
        assert_eq!(
            ctrl.set_baud(40_000_000, 2_000_000),
            Err(PeripheralError::BaudInvalid)
        );
        assert_eq!(
            ctrl.set_baud(40_000_000, 300_000),
            Err(PeripheralError::BaudNotDivisible)
        );
        assert!(ctrl.set_baud(40_000_000, 500_000).is_ok());
        assert_eq!(ctrl.bitrate(), Some(500_000));
    }

    #[test]
    fn test_interrupt_thread_runs_handler() {
        let mut ctrl = running(OperatingMode::Normal);
        ctrl.enable_interrupt(Interrupts::RX);

        let mut isr_ctrl = ctrl.clone();
        let thread = ctrl
            .spawn_interrupt_thread(move |active: Interrupts| {
                if active.contains(Interrupts::RX) {
                    isr_ctrl.receive(BufferSelector::Fifo).ok();
                }
            })
            .unwrap();

        for i in 0..5u8 {
            ctrl.inject_data(i as u32, &[i]);
        }
        ctrl.detach_interrupts();
        thread.join().unwrap();

        assert_eq!(ctrl.rx_fifo_len(), 0);
    }

    #[test]
    fn test_disabled_interrupt_not_delivered() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let mut ctrl = running(OperatingMode::Normal);
        ctrl.enable_interrupt(Interrupts::RX | Interrupts::TX);
        ctrl.disable_interrupt(Interrupts::RX);

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let thread = ctrl
            .spawn_interrupt_thread(move |_active: Interrupts| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        ctrl.inject_data(1, &[1]);
        ctrl.detach_interrupts();
        thread.join().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctrl.rx_fifo_len(), 1);
        assert_eq!(ctrl.enabled_interrupts(), Interrupts::TX);
    }

    #[test]
    fn test_filters_and_masks_are_recorded() {
        let mut ctrl = SimulatedController::new();
        let mask = MaskConfig {
            index: 0,
            id: 0x7F0,
            extended: false,
        };
        let filter = FilterConfig {
            index: 1,
            id: 0x120,
            target: BufferSelector::Fifo,
            ..Default::default()
        };

        ctrl.configure_mask(mask);
        ctrl.configure_filter(filter);

        assert_eq!(ctrl.masks(), vec![mask]);
        assert_eq!(ctrl.filters(), vec![filter]);
    }

    #[test]
    fn test_clear_interrupt_acknowledges_flag() {
        let ctrl = running(OperatingMode::Normal);
        ctrl.inject_data(0x55, &[1]);
        assert!(ctrl.active_interrupts().contains(Interrupts::RX));

        ctrl.clear_interrupt(Interrupts::RX);
        assert!(!ctrl.active_interrupts().contains(Interrupts::RX));
        assert_eq!(ctrl.rx_fifo_len(), 1);
    }

    #[test]
    fn test_detach_reports_no_thread() {
        let mut ctrl = running(OperatingMode::Normal);
        ctrl.enable_interrupt(Interrupts::RX);
        assert!(!ctrl.interrupts_attached());

        let thread = ctrl
            .spawn_interrupt_thread(|_active: Interrupts| {})
            .unwrap();
        assert!(ctrl.interrupts_attached());

        ctrl.detach_interrupts();
        assert!(!ctrl.interrupts_attached());
        thread.join().unwrap();
    }
}
