//! CAN Monitor
//!
//! Hosted main loop for the CAN frame queues. A simulated controller stands
//! in for the hardware, a dedicated thread plays the receive interrupt, and
//! a tokio interval plays the cooperative scheduler that ticks the loop.

mod config;

pub use config::{LogFormat, MonitorConfig, ENV_PREFIX};

use anyhow::{anyhow, Context};
use can_driver::{InterruptThread, SimulatedController};
use can_queue::{
    setup, CanContext, CanError, CanStats, Diagnostics, DrainOutcome, MonotonicClock, RxFrame,
    RxIngest, RxRing, TxQueue, TxRing, RX_CAPACITY,
};
use ring_buffer::{Consumer, RingBuffer};
use serde::Serialize;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

type RxIsr = RxIngest<'static, SimulatedController, RX_CAPACITY>;

/// Initialize the global `tracing` subscriber
///
/// Logs go to stderr so the diagnostics stream on stdout stays clean.
pub fn init_logging(config: &MonitorConfig) -> anyhow::Result<()> {
    let level: Level = config
        .log_level
        .parse()
        .map_err(|_| anyhow!("invalid log level '{}'", config.log_level))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    match config.log_format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    }
    .context("failed to set tracing subscriber")
}

/// Traffic handled by one main-loop tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub sent: usize,
    pub failed: usize,
    pub received: usize,
    pub dropped: u32,
}

/// Receive interrupt thread, detached when dropped
struct IsrGuard {
    controller: SimulatedController,
    thread: Option<InterruptThread<RxIsr>>,
}

impl IsrGuard {
    /// Detach the interrupt line and wait for the thread to finish
    fn stop(&mut self) -> anyhow::Result<()> {
        self.controller.detach_interrupts();
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| anyhow!("receive interrupt thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for IsrGuard {
    fn drop(&mut self) {
        self.controller.detach_interrupts();
    }
}

/// Main-loop side of a running CAN node
///
/// Dropping a monitor without [`Monitor::shutdown`] still detaches the
/// receive interrupt, so the interrupt thread exits.
pub struct Monitor<W: Write> {
    config: MonitorConfig,
    context: &'static CanContext,
    controller: SimulatedController,
    tx_queue: TxRing,
    rx: Consumer<'static, RxFrame, RX_CAPACITY>,
    diagnostics: Diagnostics<W, MonotonicClock>,
    isr: IsrGuard,
    ticks: u64,
}

impl<W: Write> std::fmt::Debug for Monitor<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("config", &self.config)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

impl<W: Write> Monitor<W> {
    /// Bring the bus up and attach the receive interrupt
    ///
    /// The RX ring and the counters live for the rest of the process.
    pub fn start(config: MonitorConfig, out: W) -> anyhow::Result<Self> {
        let context: &'static CanContext = Box::leak(Box::new(CanContext::default()));
        let rx_ring: &'static mut RxRing = Box::leak(Box::new(RingBuffer::new()));
        let mut tx_queue: TxRing = TxQueue::new();
        let mut controller = SimulatedController::with_fifo_depth(config.fifo_depth);

        setup(&mut controller, &config.bus, context, rx_ring, &mut tx_queue)
            .context("CAN bus setup failed")?;

        let (producer, rx) = rx_ring.split();
        let ingest = RxIngest::new(controller.clone(), producer, context)
            .with_source(config.bus.rx_buffer);
        let isr = IsrGuard {
            controller: controller.clone(),
            thread: Some(
                controller
                    .spawn_interrupt_thread(ingest)
                    .context("failed to start interrupt thread")?,
            ),
        };

        info!(
            "CAN monitor started: tick={}ms, heartbeat={}",
            config.tick_ms, config.heartbeat
        );

        Ok(Self {
            config,
            context,
            controller,
            tx_queue,
            rx,
            diagnostics: Diagnostics::new(out, MonotonicClock::new()),
            isr,
            ticks: 0,
        })
    }

    /// Controller handle, for injecting bus traffic
    pub fn controller(&self) -> &SimulatedController {
        &self.controller
    }

    pub fn context(&self) -> &CanContext {
        self.context
    }

    /// Ticks run so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Queue a frame for the next drain
    pub fn send(&mut self, destination_id: u32, payload: &[u8]) -> Result<u32, CanError> {
        self.tx_queue.send(destination_id, payload, self.context)
    }

    /// One pass of the main loop: heartbeat, TX drain, RX report
    pub fn tick(&mut self) -> anyhow::Result<TickReport> {
        self.ticks += 1;
        let mut report = TickReport::default();

        if self.config.heartbeat {
            let counter = (self.ticks as u32).to_be_bytes();
            match self.send(self.context.node_address(), &counter) {
                Ok(_) => {}
                Err(err @ CanError::TxBufferFull { .. }) => {
                    self.diagnostics.report_tx_rejected(&err)?;
                }
                Err(err) => return Err(err).context("failed to queue heartbeat"),
            }
        }

        let outcome = self.tx_queue.drain(&mut self.controller, self.context);
        if let DrainOutcome::Drained(drained) = &outcome {
            report.sent = drained.transmitted.len();
            report.failed = drained.failed.len();
        }
        self.diagnostics.report_drain(&outcome)?;

        report.dropped = self.diagnostics.report_rx_drops(self.context)?;
        report.received = self.diagnostics.dump_rx(&mut self.rx)?;
        self.diagnostics.flush()?;

        if report.failed > 0 || report.dropped > 0 {
            warn!(
                "Tick {}: {} TX failures, {} RX drops",
                self.ticks, report.failed, report.dropped
            );
        }
        debug!("Tick {}: {:?}", self.ticks, report);
        Ok(report)
    }

    /// Detach the interrupt, report what is left and return the counters
    pub fn shutdown(mut self) -> anyhow::Result<(CanStats, W)> {
        self.isr.stop()?;

        self.diagnostics.report_rx_drops(self.context)?;
        if !self.rx.is_empty() {
            self.diagnostics.dump_rx(&mut self.rx)?;
        }
        self.diagnostics.flush()?;

        let stats = self.context.stats();
        info!("Final CAN stats: {}", serde_json::to_string(&stats)?);
        Ok((stats, self.diagnostics.into_inner()))
    }
}

/// Run the main loop until the tick limit or Ctrl-C
pub async fn run<W: Write>(config: MonitorConfig, out: W) -> anyhow::Result<(CanStats, W)> {
    let period = Duration::from_millis(config.tick_ms.max(1));
    let limit = config.ticks;
    let mut monitor = Monitor::start(config, out)?;

    let mut interval = tokio::time::interval(period);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                monitor.tick()?;
                if limit.is_some_and(|limit| monitor.ticks() >= limit) {
                    break;
                }
            }
            _ = &mut shutdown => {
                info!("Interrupted, stopping CAN monitor");
                break;
            }
        }
    }

    monitor.shutdown()
}
