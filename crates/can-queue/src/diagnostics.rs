//! CAN Diagnostics Reporter
//!
//! Line-oriented text output for the main loop. Every line has the form
//! `[<ms>]:CAN:<message>` with the timestamp right-aligned in 8 columns.

use crate::context::CanContext;
use crate::error::CanError;
use crate::frame::{RxFrame, TxFrame};
use crate::tx::DrainOutcome;
use ring_buffer::Consumer;
use std::fmt;
use std::io::{self, Write};
use std::time::Instant;
use tracing::debug;

/// Millisecond time source for line prefixes
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<F: Fn() -> u64> Clock for F {
    fn now_ms(&self) -> u64 {
        self()
    }
}

/// Milliseconds since creation
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Payload bytes as ` 0A FF 10`
#[derive(Debug, Clone, Copy)]
pub struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, " {:02X}", byte)?;
        }
        Ok(())
    }
}

/// Writes CAN traffic reports to a text stream
pub struct Diagnostics<W, C> {
    out: W,
    clock: C,
    /// RX drops already reported
    reported_drops: u32,
}

impl<W: Write, C: Clock> Diagnostics<W, C> {
    pub fn new(out: W, clock: C) -> Self {
        Self {
            out,
            clock,
            reported_drops: 0,
        }
    }

    fn line(&mut self, message: fmt::Arguments<'_>) -> io::Result<()> {
        write!(self.out, "[{:>8}]:CAN:", self.clock.now_ms())?;
        self.out.write_fmt(message)?;
        self.out.write_all(b"\n")
    }

    /// Pop and print every frame in the RX ring
    ///
    /// Returns the number of frames printed. An empty ring is normal and
    /// only produces a notice.
    pub fn dump_rx<const N: usize>(
        &mut self,
        rx: &mut Consumer<'_, RxFrame, N>,
    ) -> Result<usize, CanError> {
        let mut printed = 0;
        while let Ok(frame) = rx.pop() {
            self.report_rx_frame(&frame)?;
            printed += 1;
        }

        if printed == 0 {
            self.line(format_args!("RX Buffer is empty"))?;
        } else {
            metrics::counter!("can_rx_frames_total").increment(printed as u64);
            debug!("Printed {} RX frames", printed);
        }
        metrics::gauge!("can_rx_pending").set(rx.pending() as f64);
        Ok(printed)
    }

    /// Print one received frame, preceded by its error if it carries one
    pub fn report_rx_frame(&mut self, frame: &RxFrame) -> io::Result<()> {
        if !frame.error.is_ok() {
            self.line(format_args!(
                "Received message level ERROR [{}]: {:?}",
                frame.error.as_u8(),
                frame.error
            ))?;
        }
        self.line(format_args!(
            "Received msg num[{}] from [{:X}]:{}",
            frame.sequence,
            frame.id,
            HexBytes(frame.data())
        ))
    }

    /// Report RX frames dropped since the last call
    pub fn report_rx_drops(&mut self, context: &CanContext) -> io::Result<u32> {
        let total = context.rx_dropped();
        let new_drops = total.wrapping_sub(self.reported_drops);
        if new_drops == 0 {
            return Ok(0);
        }

        self.reported_drops = total;
        self.line(format_args!(
            "ERROR: Out of space in RX Ring Buffer! {} frame(s) dropped",
            new_drops
        ))?;
        Ok(new_drops)
    }

    /// Confirm sent frames and report failed ones
    pub fn report_drain(&mut self, outcome: &DrainOutcome) -> io::Result<()> {
        let DrainOutcome::Drained(report) = outcome else {
            return Ok(());
        };

        for frame in &report.transmitted {
            self.report_tx_sent(frame)?;
        }
        for frame in &report.failed {
            self.line(format_args!(
                "CAN Message Sending Error [{}] on msg num[{}] to [{:X}]: {:?}",
                frame.error.as_u8(),
                frame.sequence,
                frame.id,
                frame.error
            ))?;
        }
        Ok(())
    }

    pub fn report_tx_sent(&mut self, frame: &TxFrame) -> io::Result<()> {
        self.line(format_args!(
            "Sent msg num[{}] to [{:X}] Data:{}",
            frame.sequence,
            frame.id,
            HexBytes(frame.data())
        ))
    }

    /// Report a frame that could not be queued
    pub fn report_tx_rejected(&mut self, err: &CanError) -> io::Result<()> {
        match err {
            CanError::TxBufferFull { sequence } => {
                self.line(format_args!("TX Buffer is Full, msg num[{}] dropped", sequence))
            }
            other => self.line(format_args!("ERROR: {}", other)),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
