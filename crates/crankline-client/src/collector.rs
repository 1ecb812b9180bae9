//! Background sample collector.
//!
//! The collector owns the accumulating time-series buffer and the worker
//! that feeds it from a device. Whole blocks are appended under a single
//! critical section, so a consumer taking a snapshot never observes half a
//! block, and within-block timestamp monotonicity survives the crossing
//! into the visualizer.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use crankline_proto::SampleBlock;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::{debug, warn};

use crate::device::Device;

/// Pause between checks while the producer loop is disabled.
const IDLE_TICK: Duration = Duration::from_millis(10);

/// Pause between device reads that returned nothing.
const POLL_TICK: Duration = Duration::from_millis(1);

/// A block's width did not match the buffer's fixed column count.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("block width {got} does not match buffer width {want}")]
pub struct WidthMismatch {
    /// Column count fixed at the first append.
    pub want: usize,
    /// Column count of the offending block.
    pub got: usize,
}

/// Append-only matrix of `(timestamp, c_0 .. c_{C-1})` rows.
///
/// The column count is fixed by the first appended block and holds until
/// [`clear`](TimeSeries::clear); appending a block of any other width
/// fails.
#[derive(Debug, Clone, Default)]
pub struct TimeSeries {
    width: Option<usize>,
    values: Vec<f64>,
}

impl TimeSeries {
    /// An empty series with no width fixed yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Column count, once the first block fixed it.
    pub fn width(&self) -> Option<usize> {
        self.width
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.width.map_or(0, |width| self.values.len() / width)
    }

    /// True when no row has been appended.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append all rows of a block atomically.
    pub fn append_block(&mut self, block: &SampleBlock) -> Result<(), WidthMismatch> {
        let width = *self.width.get_or_insert(block.width());
        if block.width() != width {
            return Err(WidthMismatch { want: width, got: block.width() });
        }
        self.values.extend_from_slice(block.values());
        Ok(())
    }

    /// Drop all rows and unfix the width.
    pub fn clear(&mut self) {
        self.width = None;
        self.values.clear();
    }

    /// One row, time column first.
    pub fn row(&self, index: usize) -> &[f64] {
        let width = self.width.unwrap_or(1);
        &self.values[index * width..(index + 1) * width]
    }

    /// The time column.
    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        let width = self.width.unwrap_or(1);
        self.values.chunks_exact(width).map(|row| row[0])
    }

    /// Copy of the last `window_len` rows (all rows if fewer exist).
    pub fn window(&self, window_len: usize) -> Self {
        let Some(width) = self.width else {
            return Self::new();
        };
        let rows = self.len();
        let keep = rows.min(window_len);
        Self { width: Some(width), values: self.values[(rows - keep) * width..].to_vec() }
    }

    /// Raw row-major values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// State shared between the collector handle and its worker.
struct Shared {
    series: Mutex<TimeSeries>,
    appended: Condvar,
    running: AtomicBool,
    shutdown: AtomicBool,
}

/// Background consumer that drains a device into a [`TimeSeries`].
///
/// The worker thread is spawned at construction but stays idle until
/// [`start`](Collector::start); [`stop`](Collector::stop) pauses it without
/// touching the buffer. The device moves into the worker and is
/// disconnected when the collector shuts down.
pub struct Collector {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Collector {
    /// Take ownership of a device and spawn the (idle) appender worker.
    pub fn new<D: Device + Send + 'static>(device: D) -> Self {
        let shared = Arc::new(Shared {
            series: Mutex::new(TimeSeries::new()),
            appended: Condvar::new(),
            running: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("crankline-collector".into())
            .spawn(move || run_appender(device, &worker_shared))
            .ok();
        if worker.is_none() {
            warn!("collector worker failed to spawn");
        }

        Self { shared, worker }
    }

    /// Clear the buffer and enable the producer loop.
    pub fn start(&self) {
        self.shared.series.lock().clear();
        self.shared.running.store(true, Ordering::Relaxed);
    }

    /// Disable the producer loop, leaving the buffer intact.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Relaxed);
    }

    /// Whether the producer loop is currently enabled.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    /// Current row count.
    pub fn len(&self) -> usize {
        self.shared.series.lock().len()
    }

    /// True when nothing has been collected.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the last `window_len` rows, for the live-view consumer.
    pub fn snapshot(&self, window_len: usize) -> TimeSeries {
        self.shared.series.lock().window(window_len)
    }

    /// Block until a new row lands or `timeout` elapses.
    ///
    /// Returns `true` when the buffer grew while waiting. This is the
    /// live-view wake-up: consumers redraw on `true` and idle on `false`.
    pub fn wait_for_append(&self, timeout: Duration) -> bool {
        let mut series = self.shared.series.lock();
        let before = series.len();
        let _ = self.shared.appended.wait_for(&mut series, timeout);
        series.len() > before
    }

    /// Stop the worker, join it, and disconnect the device.
    pub fn shutdown(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Appender worker: pull the device's latest block, append it whole.
fn run_appender<D: Device>(mut device: D, shared: &Shared) {
    while !shared.shutdown.load(Ordering::Relaxed) {
        if !shared.running.load(Ordering::Relaxed) {
            std::thread::sleep(IDLE_TICK);
            continue;
        }

        match device.latest() {
            Some(block) => {
                let mut series = shared.series.lock();
                match series.append_block(&block) {
                    Ok(()) => {
                        drop(series);
                        shared.appended.notify_all();
                    }
                    Err(error) => {
                        drop(series);
                        warn!(%error, "block dropped");
                    }
                }
            }
            None => std::thread::sleep(POLL_TICK),
        }
    }

    if device.is_connected() {
        debug!("collector shutting down, disconnecting device");
        device.disconnect();
    }
}
