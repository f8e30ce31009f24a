//! Background serial reader
//!
//! One worker thread per read cycle: a single blocking delimiter read
//! against the port, framed and published back to the engine through a
//! mutex-guarded result plus a one-shot completion notification.

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::codec::extract_frame;
use super::serial::SerialLink;
use super::{MAX_REPLY_LEN, READ_TIMEOUT_MS, REPLY_TERMINATOR};

/// Outcome of one read cycle, shared between the worker and the engine.
#[derive(Debug, Default)]
pub struct ReaderResult {
    /// Framed reply, empty when nothing parseable arrived
    pub message: String,
    /// Flips false to true exactly once per cycle, when the worker finishes
    pub done: bool,
}

/// Launch one read cycle on a dedicated thread.
///
/// The worker performs a single `read_until` bounded by the port timeout,
/// applies the framing rule, stores the outcome and flips `done` before
/// sending the completion notification. It never retries; a timeout
/// publishes whatever partial data arrived, which the decoder classifies
/// as invalid upstream.
pub(crate) fn spawn_read_cycle(
    port: Arc<Mutex<Box<dyn SerialLink>>>,
    result: Arc<Mutex<ReaderResult>>,
    completion: Sender<()>,
) -> JoinHandle<()> {
    {
        let mut slot = result.lock().expect("reader result poisoned");
        slot.message.clear();
        slot.done = false;
    }

    thread::spawn(move || {
        let raw = {
            let mut port = port.lock().expect("port poisoned");
            port.read_until(
                REPLY_TERMINATOR,
                MAX_REPLY_LEN,
                Duration::from_millis(READ_TIMEOUT_MS),
            )
            .unwrap_or_default()
        };
        tracing::debug!("received buffer from serial: {:?}", raw);

        let framed = extract_frame(&raw).unwrap_or_default();
        {
            let mut slot = result.lock().expect("reader result poisoned");
            slot.message = framed;
            slot.done = true;
        }
        let _ = completion.send(());
    })
}
