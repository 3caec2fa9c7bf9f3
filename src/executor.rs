use std::{
    cell::Cell,
    num::NonZeroUsize,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use log::{debug, error, info};
use parking_lot::{Condvar, Mutex};

use crate::{
    context::Context,
    error::{Result, RuntimeError},
    group::CallbackGroup,
    node::Node,
};

pub(crate) type Work = Box<dyn FnOnce() + Send>;

/// Something the executor can take ready work from: a timer or a subscription.
pub(crate) trait Executable: Send + Sync {
    fn callback_group(&self) -> &CallbackGroup;

    fn gate(&self) -> &Gate;

    fn has_ready(&self) -> bool;

    /// Claims one unit of ready work. `None` if another worker got there first.
    fn take_ready(&self) -> Option<Work>;
}

static NEXT_GATE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static ACTIVE_GATE: Cell<u64> = const { Cell::new(0) };
}

/// Lets callbacks through until closed; closing waits for the ones in flight.
pub(crate) struct Gate {
    id: u64,
    state: Mutex<GateState>,
    idle: Condvar,
}

struct GateState {
    open: bool,
    in_flight: usize,
}

struct InFlight<'a> {
    gate: &'a Gate,
    previous: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        ACTIVE_GATE.set(self.previous);
        let mut state = self.gate.state.lock();
        state.in_flight -= 1;
        if state.in_flight == 0 {
            self.gate.idle.notify_all();
        }
    }
}

impl Gate {
    pub(crate) fn new() -> Self {
        Self {
            id: NEXT_GATE_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(GateState {
                open: true,
                in_flight: 0,
            }),
            idle: Condvar::new(),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Runs `work` unless the gate is closed. Returns whether it ran.
    pub(crate) fn run(&self, work: Work) -> bool {
        {
            let mut state = self.state.lock();
            if !state.open {
                return false;
            }
            state.in_flight += 1;
        }
        let _in_flight = InFlight {
            gate: self,
            previous: ACTIVE_GATE.replace(self.id),
        };
        work();
        true
    }

    /// Closes the gate and blocks until in-flight work has drained.
    ///
    /// When called from inside work admitted by this gate, that one
    /// invocation is not waited for.
    pub(crate) fn close(&self) {
        let own = usize::from(ACTIVE_GATE.get() == self.id);
        let mut state = self.state.lock();
        state.open = false;
        while state.in_flight > own {
            self.idle.wait(&mut state);
        }
    }
}

/// Registered entities plus the condition variable workers sleep on.
pub(crate) struct WaitSet {
    state: Mutex<WaitState>,
    ready: Condvar,
}

struct WaitState {
    entities: Vec<Weak<dyn Executable>>,
    cursor: usize,
}

impl WaitState {
    fn claim(&mut self) -> Option<(Arc<dyn Executable>, Work)> {
        self.entities.retain(|entity| entity.strong_count() > 0);
        let len = self.entities.len();
        for offset in 0..len {
            let index = (self.cursor + offset) % len;
            let Some(entity) = self.entities[index].upgrade() else {
                continue;
            };
            if !entity.has_ready() || !entity.gate().is_open() {
                continue;
            }
            if !entity.callback_group().try_enter() {
                continue;
            }
            match entity.take_ready() {
                Some(work) => {
                    self.cursor = index + 1;
                    return Some((entity, work));
                }
                None => entity.callback_group().leave(),
            }
        }
        None
    }
}

impl WaitSet {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(WaitState {
                entities: Vec::new(),
                cursor: 0,
            }),
            ready: Condvar::new(),
        }
    }

    pub(crate) fn add(&self, entity: Weak<dyn Executable>) {
        self.state.lock().entities.push(entity);
        self.ready.notify_all();
    }

    /// Wakes sleeping workers. Call after making an entity ready.
    pub(crate) fn wake_all(&self) {
        // Taking the lock orders the wakeup after any in-progress readiness scan.
        let _state = self.state.lock();
        self.ready.notify_all();
    }

    #[cfg(test)]
    pub(crate) fn entity_count(&self) -> usize {
        let mut state = self.state.lock();
        state.entities.retain(|entity| entity.strong_count() > 0);
        state.entities.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    pub num_threads: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        let parallelism = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(2);
        Self {
            num_threads: parallelism.max(2),
        }
    }
}

impl ExecutorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_threads(self, num_threads: usize) -> Self {
        Self {
            num_threads: num_threads.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpinOptions {
    pub timeout: Option<Duration>,
}

impl SpinOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return from `spin` once `timeout` has elapsed, even without shutdown.
    pub fn timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Dispatches ready timers and subscriptions on a pool of worker threads.
///
/// Callback groups decide what may overlap: reentrant groups never hold a
/// worker back, mutually exclusive groups admit one callback at a time.
pub struct MultiThreadedExecutor {
    context: Context,
    wait_set: Arc<WaitSet>,
    options: ExecutorOptions,
}

impl MultiThreadedExecutor {
    pub fn new(context: &Context, options: ExecutorOptions) -> Self {
        let wait_set = Arc::new(WaitSet::new());
        context.register_wait_set(&wait_set);
        Self {
            context: context.clone(),
            wait_set,
            options,
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn options(&self) -> ExecutorOptions {
        self.options
    }

    pub fn create_node(&self, name: &str) -> Result<Node> {
        Node::new(&self.context, Arc::clone(&self.wait_set), name)
    }

    /// Blocks dispatching callbacks until the context shuts down or the
    /// optional timeout expires.
    pub fn spin(&self, options: SpinOptions) -> Result<()> {
        if self.context.is_shutdown() {
            debug!("context already shut down, not spinning");
            return Ok(());
        }

        // A timeout too large to represent as an instant never expires.
        let deadline = options
            .timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));
        let stop = AtomicBool::new(false);
        let num_threads = self.options.num_threads.max(1);
        info!("executor spinning on {num_threads} threads");

        let outcome = thread::scope(|scope| {
            let mut workers = Vec::with_capacity(num_threads);
            for index in 0..num_threads {
                let name = format!("executor-{index}");
                let spawned = thread::Builder::new()
                    .name(name.clone())
                    .spawn_scoped(scope, || self.run_worker(&stop, deadline));
                match spawned {
                    Ok(handle) => workers.push(handle),
                    Err(source) => {
                        self.halt(&stop);
                        return Err(RuntimeError::ThreadSpawn { name, source });
                    }
                }
            }

            let mut panicked = false;
            for worker in workers {
                panicked |= worker.join().is_err();
            }
            if panicked {
                Err(RuntimeError::WorkerPanicked)
            } else {
                Ok(())
            }
        });

        info!("executor stopped spinning");
        outcome
    }

    fn halt(&self, stop: &AtomicBool) {
        stop.store(true, Ordering::Release);
        self.wait_set.wake_all();
    }

    fn run_worker(&self, stop: &AtomicBool, deadline: Option<Instant>) {
        while let Some((entity, work)) = self.next_work(stop, deadline) {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| entity.gate().run(work)));
            let group = entity.callback_group();
            group.leave();
            self.wait_set.wake_all();
            if outcome.is_err() {
                error!(
                    "callback in group {} of node '{}' panicked",
                    group.id(),
                    group.node_name()
                );
            }
        }
    }

    fn next_work(
        &self,
        stop: &AtomicBool,
        deadline: Option<Instant>,
    ) -> Option<(Arc<dyn Executable>, Work)> {
        let mut state = self.wait_set.state.lock();
        loop {
            if stop.load(Ordering::Acquire) || self.context.is_shutdown() {
                return None;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                stop.store(true, Ordering::Release);
                self.wait_set.ready.notify_all();
                return None;
            }
            if let Some(claimed) = state.claim() {
                return Some(claimed);
            }
            match deadline {
                Some(deadline) => {
                    let _timed_out = self.wait_set.ready.wait_until(&mut state, deadline);
                }
                None => self.wait_set.ready.wait(&mut state),
            }
        }
    }
}
