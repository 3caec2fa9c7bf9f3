use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, error};
use parking_lot::{Condvar, Mutex};

use crate::{
    context::Context,
    error::{Result, RuntimeError},
    executor::{Executable, Gate, WaitSet, Work},
    group::CallbackGroup,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerSignal {
    Run,
    Stop,
    Dropped,
}

#[derive(Debug, Clone)]
pub struct TimerOptions {
    pub period: Duration,
    pub single_shot: bool,
    pub auto_start: bool,
    pub callback_group: Option<CallbackGroup>,
}

impl TimerOptions {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            single_shot: false,
            auto_start: true,
            callback_group: None,
        }
    }

    pub fn with_single_shot(self) -> Self {
        Self {
            single_shot: true,
            ..self
        }
    }

    pub fn without_auto_start(self) -> Self {
        Self {
            auto_start: false,
            ..self
        }
    }

    pub fn with_callback_group(self, group: &CallbackGroup) -> Self {
        Self {
            callback_group: Some(group.clone()),
            ..self
        }
    }
}

pub(crate) struct TimerShared {
    period: Duration,
    single_shot: bool,
    signal_pair: (Mutex<TimerSignal>, Condvar),
    running: AtomicBool,
    pending: AtomicBool,
    triggers: AtomicU64,
    callback: Arc<dyn Fn() + Send + Sync>,
    group: CallbackGroup,
    gate: Arc<Gate>,
    wait_set: Arc<WaitSet>,
}

impl Executable for TimerShared {
    fn callback_group(&self) -> &CallbackGroup {
        &self.group
    }

    fn gate(&self) -> &Gate {
        &self.gate
    }

    fn has_ready(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    fn take_ready(&self) -> Option<Work> {
        if !self.pending.swap(false, Ordering::AcqRel) {
            return None;
        }
        let callback = Arc::clone(&self.callback);
        Some(Box::new(move || callback()))
    }
}

/// Where the clock thread is in its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deadline {
    /// Not armed yet; the first expiration is one period from now.
    Unarmed,
    At(Instant),
    /// The deadline is past what `Instant` can represent.
    Never,
}

impl Deadline {
    fn after(start: Instant, period: Duration) -> Self {
        start.checked_add(period).map_or(Self::Never, Self::At)
    }
}

/// The first period boundary after `now` on the grid that starts at `last`.
fn next_deadline(last: Instant, now: Instant, period: Duration) -> Deadline {
    match last.checked_add(period) {
        Some(upcoming) if upcoming > now => Deadline::At(upcoming),
        Some(_) => {
            let missed = now.duration_since(last).as_nanos() / period.as_nanos();
            let skip = u32::try_from(missed).unwrap_or(u32::MAX).saturating_add(1);
            period
                .checked_mul(skip)
                .map_or(Deadline::Never, |offset| Deadline::after(last, offset))
        }
        None => Deadline::Never,
    }
}

impl TimerShared {
    // Fixed-rate schedule; expirations missed while nobody took the pending
    // one are skipped, not replayed.
    fn run(&self, context: &Context) {
        let (lock, cvar) = &self.signal_pair;
        let mut deadline = Deadline::Unarmed;
        let mut signal = lock.lock();

        loop {
            match *signal {
                TimerSignal::Dropped => return,
                TimerSignal::Stop => {
                    self.running.store(false, Ordering::SeqCst);
                    deadline = Deadline::Unarmed;
                    cvar.wait(&mut signal);
                    continue;
                }
                TimerSignal::Run => {}
            }
            if context.is_shutdown() {
                self.running.store(false, Ordering::SeqCst);
                return;
            }

            self.running.store(true, Ordering::SeqCst);
            if deadline == Deadline::Unarmed {
                deadline = Deadline::after(Instant::now(), self.period);
            }
            let next = match deadline {
                Deadline::At(next) => next,
                Deadline::Unarmed | Deadline::Never => {
                    // Running, but nothing to wait for besides start/stop/drop.
                    cvar.wait(&mut signal);
                    continue;
                }
            };
            if !cvar.wait_until(&mut signal, next).timed_out() {
                // Woken by start/stop/drop; re-evaluate the signal.
                continue;
            }
            if *signal != TimerSignal::Run {
                continue;
            }

            self.triggers.fetch_add(1, Ordering::Relaxed);
            self.pending.store(true, Ordering::Release);
            self.wait_set.wake_all();

            if self.single_shot {
                *signal = TimerSignal::Stop;
                continue;
            }
            deadline = next_deadline(next, Instant::now(), self.period);
        }
    }

    fn send(&self, new_signal: TimerSignal) {
        let (lock, cvar) = &self.signal_pair;
        let mut signal = lock.lock();
        if *signal != TimerSignal::Dropped {
            *signal = new_signal;
        }
        let run = *signal == TimerSignal::Run;
        self.running.store(run, Ordering::SeqCst);
        if !run {
            self.pending.store(false, Ordering::Release);
        }
        cvar.notify_all();
    }
}

/// A periodic trigger with its own clock thread.
///
/// The thread only marks the timer ready; the callback itself runs on an
/// executor worker in the timer's callback group.
pub struct Timer {
    shared: Arc<TimerShared>,
    join_handle: Option<JoinHandle<()>>,
}

impl Timer {
    pub(crate) fn new(
        context: &Context,
        options: TimerOptions,
        group: CallbackGroup,
        gate: Arc<Gate>,
        wait_set: Arc<WaitSet>,
        callback: Arc<dyn Fn() + Send + Sync>,
    ) -> Result<Self> {
        if options.period.is_zero() {
            return Err(RuntimeError::InvalidTimerPeriod);
        }

        let initial = if options.auto_start {
            TimerSignal::Run
        } else {
            TimerSignal::Stop
        };
        let shared = Arc::new(TimerShared {
            period: options.period,
            single_shot: options.single_shot,
            signal_pair: (Mutex::new(initial), Condvar::new()),
            running: AtomicBool::new(options.auto_start),
            pending: AtomicBool::new(false),
            triggers: AtomicU64::new(0),
            callback,
            group,
            gate,
            wait_set: Arc::clone(&wait_set),
        });

        let name = format!("timer-{}", shared.group.node_name());
        let handle = {
            let shared = Arc::clone(&shared);
            let context = context.clone();
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || shared.run(&context))
                .map_err(|source| RuntimeError::ThreadSpawn { name, source })?
        };

        let entity: Arc<dyn Executable> = shared.clone();
        wait_set.add(Arc::downgrade(&entity));
        debug!(
            "timer created with period {:?} in group {}",
            options.period,
            shared.group.id()
        );

        Ok(Self {
            shared,
            join_handle: Some(handle),
        })
    }

    /// Starts a stopped timer; the first trigger is one period away.
    pub fn start(&self) {
        self.shared.send(TimerSignal::Run);
    }

    /// Stops the timer and discards a trigger nobody has taken yet.
    pub fn stop(&self) {
        self.shared.send(TimerSignal::Stop);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn period(&self) -> Duration {
        self.shared.period
    }

    /// How many times the timer has expired since creation.
    pub fn trigger_count(&self) -> u64 {
        self.shared.triggers.load(Ordering::Relaxed)
    }

    pub fn callback_group(&self) -> &CallbackGroup {
        &self.shared.group
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("period", &self.shared.period)
            .field("running", &self.is_running())
            .field("group", &self.shared.group)
            .finish()
    }
}

// Dropping the timer stops its clock thread.
impl Drop for Timer {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            self.shared.send(TimerSignal::Dropped);
            if handle.join().is_err() {
                error!("timer thread panicked");
            }
        }
    }
}
