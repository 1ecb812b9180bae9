//! Synthetic sample producer.
//!
//! The sampler stands in for the device's acquisition hardware: it ticks
//! at the configured block cadence (`samples_per_block / frequency`
//! seconds) and publishes each freshly generated block into the shared
//! latest-block cell. Its lifetime spans the whole emulator, not one
//! client session, so the device clock keeps running between clients.

use std::{
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crankline_proto::{CHANNEL_COUNT, SampleBlock};
use rand::Rng;
use tracing::{debug, warn};

use crate::state::Shared;

/// Granularity of the in-tick shutdown check.
const SLEEP_QUANTUM: Duration = Duration::from_millis(1);

/// Spawn the sampler worker.
pub(crate) fn spawn(shared: Arc<Shared>) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new().name("crankline-sampler".into()).spawn(move || run(&shared))
}

fn run(shared: &Shared) {
    let epoch = Instant::now();
    let mut rng = rand::thread_rng();
    debug!("sampler started");

    while !shared.is_shutdown() {
        let (frequency, samples_per_block) = {
            let state = shared.state.lock();
            (state.frequency, state.samples_per_block)
        };

        let period = f64::from(samples_per_block) / f64::from(frequency);
        let elapsed = epoch.elapsed().as_secs_f64();
        let index = (elapsed / period).floor();
        let base = index * period;

        // Device time anchored to the wall clock, so the stream stays
        // continuous across cadence changes and client sessions.
        let width = 1 + CHANNEL_COUNT;
        let mut values = Vec::with_capacity(usize::from(samples_per_block) * width);
        for sample in 0..samples_per_block {
            values.push(base + f64::from(sample) / f64::from(frequency));
            for _ in 0..CHANNEL_COUNT {
                values.push(rng.r#gen::<f64>());
            }
        }

        match SampleBlock::from_raw(width, values) {
            Ok(block) => shared.latest_block.publish(block),
            Err(error) => warn!(%error, "sampler produced a malformed block"),
        }

        // Sleep to the next block boundary, observing shutdown each quantum.
        let next = (index + 1.0) * period;
        loop {
            if shared.is_shutdown() {
                return;
            }
            let elapsed = epoch.elapsed().as_secs_f64();
            if elapsed >= next {
                break;
            }
            let remaining = Duration::from_secs_f64(next - elapsed);
            std::thread::sleep(remaining.min(SLEEP_QUANTUM));
        }
    }

    debug!("sampler stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use crate::state::EmulatorConfig;

    use super::*;

    #[test]
    fn blocks_have_the_configured_shape_and_spacing() {
        let config =
            EmulatorConfig { frequency: 100, samples_per_block: 5, ..EmulatorConfig::default() };
        let shared = Arc::new(Shared::new(config));
        let worker = spawn(Arc::clone(&shared)).unwrap();

        let (block, _generation) = shared
            .latest_block
            .wait_newer(0, Duration::from_secs(2))
            .expect("sampler should publish");

        assert_eq!(block.width(), 1 + CHANNEL_COUNT);
        assert_eq!(block.samples(), 5);
        for pair in block.values().chunks_exact(1 + CHANNEL_COUNT).collect::<Vec<_>>().windows(2) {
            let delta = pair[1][0] - pair[0][0];
            assert!((delta - 0.01).abs() < 1e-9, "unexpected spacing {delta}");
        }

        shared.shutdown.store(true, Ordering::Relaxed);
        worker.join().unwrap();
    }

    #[test]
    fn successive_blocks_advance_the_clock() {
        let config =
            EmulatorConfig { frequency: 200, samples_per_block: 2, ..EmulatorConfig::default() };
        let shared = Arc::new(Shared::new(config));
        let worker = spawn(Arc::clone(&shared)).unwrap();

        let (first, generation) =
            shared.latest_block.wait_newer(0, Duration::from_secs(2)).expect("first block");
        let (second, _generation) = shared
            .latest_block
            .wait_newer(generation, Duration::from_secs(2))
            .expect("second block");

        assert!(second.first_time() > first.first_time());

        shared.shutdown.store(true, Ordering::Relaxed);
        worker.join().unwrap();
    }
}
