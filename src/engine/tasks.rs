//! Fixed worker pool with per-worker queues, work stealing, and
//! group-scoped completion tracking.
//!
//! Callers submit work against a [`TaskGroup`], an `Arc`-shared pending
//! counter. [`TaskComposer::execute`] enqueues a single unit,
//! [`TaskComposer::dispatch`] splits an index range into sub-range units.
//! [`TaskComposer::wait`] drains queued units on the calling thread until
//! the group's counter reaches zero, so a task may itself dispatch and
//! wait on a nested group without deadlocking the pool.
//!
//! A panic escaping a unit is unrecoverable: it is caught, logged, and
//! the process aborts. Shared component storage gives no way to reason
//! about partially applied writes, so unwinding past a unit boundary is
//! never allowed.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Per-unit arguments passed to a dispatched range function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskExecuteArgs {
    /// Index within the full dispatched range `[0, task_count)`.
    pub global_index: usize,
    /// Index within this unit's sub-range, starting at zero.
    pub local_index: usize,
    /// `true` for the first index of the sub-range.
    pub first_in_range: bool,
    /// `true` for the last index of the sub-range.
    pub last_in_range: bool,
}

/// Completion counter shared between submitters and workers.
///
/// Submission increments the counter before the unit is visible to any
/// worker; the worker decrements after the unit returns. A group may be
/// reused across passes once it has drained to zero.
pub struct TaskGroup {
    pending: AtomicUsize,
}

impl TaskGroup {
    /// Creates a drained group ready for submissions.
    pub fn new() -> Arc<Self> {
        Arc::new(Self { pending: AtomicUsize::new(0) })
    }

    /// Units submitted but not yet completed.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Returns `true` when every submitted unit has completed.
    pub fn is_complete(&self) -> bool {
        self.pending() == 0
    }

    fn begin(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    fn complete(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

enum TaskKind {
    Single(Box<dyn FnOnce() + Send>),
    Range {
        run: Arc<dyn Fn(TaskExecuteArgs) + Send + Sync>,
        begin: usize,
        end: usize,
    },
}

struct Task {
    group: Arc<TaskGroup>,
    kind: TaskKind,
}

struct Shared {
    queues: Vec<Mutex<VecDeque<Task>>>,
    sleep_lock: Mutex<()>,
    wake: Condvar,
    shutdown: AtomicBool,
}

impl Shared {
    fn lock_queue(&self, index: usize) -> MutexGuard<'_, VecDeque<Task>> {
        match self.queues[index].lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Pops from the worker's own queue first, then steals from siblings.
    fn pop(&self, home: usize) -> Option<Task> {
        let count = self.queues.len();
        for offset in 0..count {
            let index = (home + offset) % count;
            if let Some(task) = self.lock_queue(index).pop_front() {
                return Some(task);
            }
        }
        None
    }

    fn has_work(&self) -> bool {
        (0..self.queues.len()).any(|index| !self.lock_queue(index).is_empty())
    }

    fn notify(&self) {
        // Taking the sleep lock orders this notification after any
        // worker's empty-queue recheck, so the wakeup cannot be lost.
        let _guard = match self.sleep_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.wake.notify_all();
    }

    fn run(&self, task: Task) {
        match task.kind {
            TaskKind::Single(run) => {
                if panic::catch_unwind(AssertUnwindSafe(run)).is_err() {
                    log::error!("task panicked, aborting");
                    process::abort();
                }
            }
            TaskKind::Range { run, begin, end } => {
                for global_index in begin..end {
                    let args = TaskExecuteArgs {
                        global_index,
                        local_index: global_index - begin,
                        first_in_range: global_index == begin,
                        last_in_range: global_index + 1 == end,
                    };
                    if panic::catch_unwind(AssertUnwindSafe(|| run(args))).is_err() {
                        log::error!("dispatched task panicked at index {global_index}, aborting");
                        process::abort();
                    }
                }
            }
        }
        task.group.complete();
    }

    fn worker_loop(&self, home: usize) {
        loop {
            if let Some(task) = self.pop(home) {
                self.run(task);
                continue;
            }
            let guard = match self.sleep_lock.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if self.shutdown.load(Ordering::Acquire) {
                return;
            }
            if self.has_work() {
                continue;
            }
            drop(self.wake.wait(guard));
        }
    }
}

/// Fixed-size task pool.
///
/// Worker count is the requested value clamped to
/// `[1, available_parallelism - 1]`, leaving one hardware thread for the
/// submitting thread itself.
pub struct TaskComposer {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    next_queue: AtomicUsize,
}

impl TaskComposer {
    /// Starts the pool with `requested_threads` workers, clamped to the
    /// documented range.
    pub fn new(requested_threads: usize) -> Self {
        let available = thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
        let cap = available.saturating_sub(1).max(1);
        let thread_count = requested_threads.clamp(1, cap);

        let shared = Arc::new(Shared {
            queues: (0..thread_count).map(|_| Mutex::new(VecDeque::new())).collect(),
            sleep_lock: Mutex::new(()),
            wake: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let mut workers = Vec::with_capacity(thread_count);
        for home in 0..thread_count {
            let shared = shared.clone();
            match thread::Builder::new()
                .name(format!("ecs-worker-{home}"))
                .spawn(move || shared.worker_loop(home))
            {
                Ok(handle) => workers.push(handle),
                Err(err) => log::error!("failed to spawn worker thread {home}: {err}"),
            }
        }
        if workers.is_empty() {
            log::warn!("no worker threads started; work will run on waiting threads only");
        }

        Self { shared, workers, next_queue: AtomicUsize::new(0) }
    }

    /// Number of pool workers.
    pub fn thread_count(&self) -> usize {
        self.shared.queues.len()
    }

    /// Worker threads actually running. Normally equals
    /// [`thread_count`](Self::thread_count); lower only when a spawn
    /// failed at construction.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Enqueues one unit against `group`.
    pub fn execute(&self, group: &Arc<TaskGroup>, run: impl FnOnce() + Send + 'static) {
        group.begin();
        self.enqueue(Task { group: group.clone(), kind: TaskKind::Single(Box::new(run)) });
    }

    /// Splits `[0, task_count)` into `ceil(task_count / group_size)`
    /// sub-range units and enqueues them against `group`. `run` is
    /// invoked once per index with its [`TaskExecuteArgs`].
    pub fn dispatch(
        &self,
        group: &Arc<TaskGroup>,
        task_count: usize,
        group_size: usize,
        run: impl Fn(TaskExecuteArgs) + Send + Sync + 'static,
    ) {
        if task_count == 0 {
            return;
        }
        let group_size = group_size.max(1);
        let run: Arc<dyn Fn(TaskExecuteArgs) + Send + Sync> = Arc::new(run);
        let mut begin = 0;
        while begin < task_count {
            let end = (begin + group_size).min(task_count);
            group.begin();
            self.enqueue(Task {
                group: group.clone(),
                kind: TaskKind::Range { run: run.clone(), begin, end },
            });
            begin = end;
        }
    }

    /// Blocks until `group` has no pending units, draining queued units
    /// on the calling thread in the meantime. Returns immediately when
    /// the group is already complete.
    pub fn wait(&self, group: &Arc<TaskGroup>) {
        while !group.is_complete() {
            match self.shared.pop(0) {
                Some(task) => self.shared.run(task),
                None => thread::yield_now(),
            }
        }
    }

    fn enqueue(&self, task: Task) {
        let slot = self.next_queue.fetch_add(1, Ordering::Relaxed) % self.shared.queues.len();
        self.shared.lock_queue(slot).push_back(task);
        self.shared.notify();
    }
}

impl Drop for TaskComposer {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.notify();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
