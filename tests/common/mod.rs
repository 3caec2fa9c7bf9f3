#![allow(dead_code)]

use std::{
    sync::{Mutex, Once},
    thread,
    time::{Duration, Instant},
};

use log::{LevelFilter, Log, Metadata, Record};
use ros2_reentrant_node::{Context, MultiThreadedExecutor, SpinOptions};

/// Records every log line so tests can assert on node output.
pub struct CaptureLogger {
    records: Mutex<Vec<(String, String)>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        self.records
            .lock()
            .unwrap()
            .push((record.target().to_owned(), record.args().to_string()));
    }

    fn flush(&self) {}
}

impl CaptureLogger {
    /// Messages logged under `target`, oldest first.
    pub fn messages(&self, target: &str) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == target)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn count(&self, target: &str, needle: &str) -> usize {
        self.messages(target)
            .iter()
            .filter(|message| message.contains(needle))
            .count()
    }
}

static LOGGER: CaptureLogger = CaptureLogger {
    records: Mutex::new(Vec::new()),
};
static INIT: Once = Once::new();

pub fn capture() -> &'static CaptureLogger {
    INIT.call_once(|| {
        log::set_logger(&LOGGER).expect("another logger is installed");
        log::set_max_level(LevelFilter::Info);
    });
    &LOGGER
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

struct ShutdownOnDrop<'a>(&'a Context);

impl Drop for ShutdownOnDrop<'_> {
    fn drop(&mut self) {
        self.0.shutdown();
    }
}

/// Runs `body` while `executor` spins on another thread, then shuts the
/// context down and waits for the spin to return.
pub fn spinning<R>(executor: &MultiThreadedExecutor, body: impl FnOnce() -> R) -> R {
    thread::scope(|scope| {
        let spinner = scope.spawn(|| executor.spin(SpinOptions::default()));
        let guard = ShutdownOnDrop(executor.context());
        let result = body();
        drop(guard);
        spinner
            .join()
            .expect("executor thread panicked")
            .expect("spin failed");
        result
    })
}
