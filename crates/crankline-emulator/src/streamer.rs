//! Data-plane streamer.
//!
//! Spawned on `START`, joined on `STOP`. The streamer waits on the shared
//! latest-block cell for a block whose last timestamp moved past the
//! session watermark, projects it onto the configured channel set (time
//! column always first), stamps it with the next wrapping sequence id, and
//! sends it as one datagram.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use crankline_core::{DatagramLink, MAX_DATAGRAM};
use crankline_proto::DataFrame;
use tracing::{debug, trace, warn};

use crate::state::Shared;

/// Bounded wait on the latest-block cell; doubles as the stop-flag tick.
const SLOT_WAIT: Duration = Duration::from_millis(100);

/// Handle used by the dispatcher to stop and join the streamer.
pub(crate) struct StreamerHandle {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl StreamerHandle {
    /// Signal the worker and wait for it to exit.
    pub fn stop(self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.handle.join();
    }
}

/// Spawn the streamer worker.
pub(crate) fn spawn(
    shared: Arc<Shared>,
    data: Arc<DatagramLink>,
) -> std::io::Result<StreamerHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = Arc::clone(&stop);
    let handle = std::thread::Builder::new()
        .name("crankline-streamer".into())
        .spawn(move || run(&shared, &data, &worker_stop))?;
    Ok(StreamerHandle { stop, handle })
}

fn run(shared: &Shared, data: &DatagramLink, stop: &AtomicBool) {
    let mut cursor = 0_u64;
    debug!("streamer started");

    while !stop.load(Ordering::Relaxed) && !shared.is_shutdown() {
        let Some((block, generation)) = shared.latest_block.wait_newer(cursor, SLOT_WAIT) else {
            continue;
        };
        cursor = generation;

        // One lock: snapshot target/channels, advance the watermark and the
        // sequence id together, or skip the block entirely.
        let emit = {
            let mut state = shared.state.lock();
            match state.target {
                Some(target) if state.streaming && block.last_time() > state.last_streamed_time => {
                    state.last_streamed_time = block.last_time();
                    state.sequence_id = state.sequence_id.wrapping_add(1);
                    Some((target, state.channels.clone(), state.sequence_id))
                }
                _ => None,
            }
        };
        let Some((target, channels, sequence_id)) = emit else {
            continue;
        };

        let projected = match block.project(&channels) {
            Ok(projected) => projected,
            Err(error) => {
                warn!(%error, "channel projection failed, block dropped");
                continue;
            }
        };

        let frame = DataFrame { sequence_id, block: projected };
        let mut wire = Vec::with_capacity(frame.wire_size());
        if let Err(error) = frame.encode(&mut wire) {
            warn!(%error, "data frame failed to encode, block dropped");
            continue;
        }
        if wire.len() > MAX_DATAGRAM {
            warn!(bytes = wire.len(), "block exceeds the datagram limit, dropped");
            continue;
        }

        if let Err(error) = data.send_to(&wire, target) {
            warn!(%error, peer = %target, "data send failed, streamer exiting");
            break;
        }
        trace!(sequence_id, bytes = wire.len(), "frame sent");
    }

    debug!("streamer stopped");
}
