use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, Ordering},
};

use log::info;
use parking_lot::Mutex;

use crate::{
    executor::{ExecutorOptions, MultiThreadedExecutor, WaitSet},
    topic::TopicGraph,
};

/// One runtime instance: the topic graph every node of it shares, and the
/// shutdown flag every executor of it watches.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    shut_down: AtomicBool,
    graph: Arc<TopicGraph>,
    wait_sets: Mutex<Vec<Weak<WaitSet>>>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                shut_down: AtomicBool::new(false),
                graph: Arc::new(TopicGraph::default()),
                wait_sets: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn ok(&self) -> bool {
        !self.is_shutdown()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Stops all executors of this context. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("context shutting down");

        let wait_sets: Vec<_> = {
            let mut wait_sets = self.inner.wait_sets.lock();
            wait_sets.retain(|wait_set| wait_set.strong_count() > 0);
            wait_sets.iter().filter_map(Weak::upgrade).collect()
        };
        for wait_set in wait_sets {
            wait_set.wake_all();
        }
    }

    pub fn create_executor(&self, options: ExecutorOptions) -> MultiThreadedExecutor {
        MultiThreadedExecutor::new(self, options)
    }

    pub(crate) fn graph(&self) -> &Arc<TopicGraph> {
        &self.inner.graph
    }

    pub(crate) fn register_wait_set(&self, wait_set: &Arc<WaitSet>) {
        self.inner.wait_sets.lock().push(Arc::downgrade(wait_set));
    }
}
