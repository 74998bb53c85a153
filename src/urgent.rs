use crate::task::{lock, run_caught};
use crate::{Activity, HookError, MainThread, RejectedTask, RunLoop, Task};
use std::collections::VecDeque;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// The phases at which pending urgent work is run: right before the loop
/// processes its sources (and with them, the normal task queue)
/// and right before it would go idle.
pub const URGENT_PHASES: Activity = Activity::BeforeSources.union(Activity::BeforeWaiting);

/// Runs urgent work on the main thread ahead of the main thread's task queue.
///
/// Work submitted with [`UrgentQueue::add_urgent_task`] from the main thread
/// runs immediately. Work submitted from any other thread is picked up by an
/// observer hooked into the main run loop, which runs it as soon as the
/// current task finishes rather than after everything already queued.
///
/// The hook has to be installed with [`UrgentQueue::add_hook`] first, on the main thread.
/// Clones share the same hook and the same pending work.
/// When the last clone is dropped, the hook is removed and pending work is discarded.
pub struct UrgentQueue<L: RunLoop> {
    inner: Arc<Inner<L>>,
}

/// How an accepted urgent task is going to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    /// The caller was on the main thread; the work already ran.
    Inline,
    /// The work waits for the next firing of the run loop observer.
    Deferred,
}

/// Counters describing what an [`UrgentQueue`] has done so far.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UrgentStats {
    /// Tasks that ran synchronously because they were submitted on the main thread.
    pub inline: u64,
    /// Tasks that ran from within the run loop observer.
    pub deferred: u64,
    /// Observer callbacks that found pending work.
    pub firings: u64,
    /// Pending tasks that were discarded because the hook was removed.
    pub dropped: u64,
}

struct Inner<L: RunLoop> {
    run_loop: L,
    main_thread: Box<dyn MainThread>,
    pending: Arc<Pending>,
    hook: Mutex<Option<L::Registration>>,
}

/// The pending work shared between submitting threads and the observer.
#[derive(Default)]
struct Pending {
    state: Mutex<PendingState>,
    counters: Counters,
}

#[derive(Default)]
struct PendingState {
    // Lives under the same lock as `tasks` so that no task can slip in
    // after the hook has been removed.
    hooked: bool,
    tasks: VecDeque<Task>,
}

#[derive(Default)]
struct Counters {
    inline: AtomicU64,
    deferred: AtomicU64,
    firings: AtomicU64,
    dropped: AtomicU64,
}

impl<L: RunLoop + MainThread> UrgentQueue<L> {
    /// Creates a queue for `run_loop`, which also decides what the main thread is.
    pub fn new(run_loop: L) -> Self
    where
        L: Clone,
    {
        Self::with_main_thread(run_loop.clone(), run_loop)
    }
}

impl<L: RunLoop> UrgentQueue<L> {
    /// Creates a queue for `run_loop` whose main thread is identified by `main_thread`.
    ///
    /// The hook is not installed yet.
    pub fn with_main_thread(run_loop: L, main_thread: impl MainThread + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                run_loop,
                main_thread: Box::new(main_thread),
                pending: Arc::default(),
                hook: Mutex::new(None),
            }),
        }
    }

    /// Installs the run loop observer.
    ///
    /// Must be called on the main thread. Returns `false` if the hook
    /// is already installed, if called from another thread or if the
    /// observer could not be registered.
    pub fn add_hook(&self) -> bool {
        match self.try_add_hook() {
            Ok(()) => true,
            Err(_error) => {
                #[cfg(feature = "log")]
                log::warn!("failed to install urgent task hook: {_error}");
                false
            }
        }
    }

    /// Like [`UrgentQueue::add_hook`] but reports why the hook wasn't installed.
    pub fn try_add_hook(&self) -> Result<(), HookError> {
        if !self.inner.main_thread.is_main_thread() {
            return Err(HookError::NotMainThread);
        }
        let mut hook = lock(&self.inner.hook);
        if hook.is_some() {
            return Err(HookError::AlreadyInstalled);
        }
        let pending = Arc::clone(&self.inner.pending);
        let registration = self
            .inner
            .run_loop
            .add_observer(URGENT_PHASES, Box::new(move |_| pending.drain()))?;
        lock(&self.inner.pending.state).hooked = true;
        *hook = Some(registration);
        Ok(())
    }

    /// Uninstalls the run loop observer and discards pending urgent work
    /// without running it.
    ///
    /// Must be called on the main thread. Does nothing if no hook is installed.
    pub fn remove_hook(&self) {
        if let Err(_error) = self.try_remove_hook() {
            #[cfg(feature = "log")]
            log::warn!("failed to remove urgent task hook: {_error}");
        }
    }

    /// Like [`UrgentQueue::remove_hook`] but reports calls from the wrong thread.
    pub fn try_remove_hook(&self) -> Result<(), HookError> {
        if !self.inner.main_thread.is_main_thread() {
            return Err(HookError::NotMainThread);
        }
        self.inner.unhook();
        Ok(())
    }

    /// Returns `true` while the hook is installed.
    pub fn is_hooked(&self) -> bool {
        lock(&self.inner.hook).is_some()
    }

    /// Runs `work` on the main thread as soon as possible.
    ///
    /// * On the main thread, `work` runs synchronously before this returns.
    /// * On any other thread, `work` runs on the main thread after the task the
    ///   main thread is currently busy with, ahead of tasks waiting in the
    ///   main thread's normal queue. This requires the hook to be installed.
    ///
    /// Returns `false` if the work was rejected, in which case it is dropped.
    /// Work is rejected when the hook isn't installed or the run loop is gone;
    /// in the latter case the hook is removed and pending work is discarded.
    /// Acceptance doesn't guarantee delivery: work that is pending when the loop
    /// stops iterating or the hook is removed never runs.
    pub fn add_urgent_task(&self, work: impl FnOnce() + Send + 'static) -> bool {
        self.try_add_urgent_task(work).is_ok()
    }

    /// Like [`UrgentQueue::add_urgent_task`] but hands rejected work back to
    /// the caller, e.g. to fall back to the normal task queue.
    pub fn try_add_urgent_task(
        &self,
        work: impl FnOnce() + Send + 'static,
    ) -> Result<Scheduled, RejectedTask> {
        if self.inner.main_thread.is_main_thread() {
            work();
            self.inner.pending.counters.inline.fetch_add(1, Ordering::Relaxed);
            return Ok(Scheduled::Inline);
        }

        if self.inner.run_loop.is_closed() {
            #[cfg(feature = "log")]
            log::debug!("rejecting urgent task: run loop is gone");
            self.inner.unhook();
            return Err(RejectedTask::new(Box::new(work)));
        }
        self.inner.pending.push(Box::new(work))?;
        self.inner.run_loop.wake_up();
        Ok(Scheduled::Deferred)
    }

    /// The number of urgent tasks waiting for the observer.
    pub fn pending(&self) -> usize {
        lock(&self.inner.pending.state).tasks.len()
    }

    /// A snapshot of the counters. Each counter is read on its own,
    /// so a snapshot taken while work is running may be slightly skewed.
    pub fn stats(&self) -> UrgentStats {
        let counters = &self.inner.pending.counters;
        UrgentStats {
            inline: counters.inline.load(Ordering::Relaxed),
            deferred: counters.deferred.load(Ordering::Relaxed),
            firings: counters.firings.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// The run loop this queue hooks into.
    pub fn run_loop(&self) -> &L {
        &self.inner.run_loop
    }
}

impl<L: RunLoop> Clone for UrgentQueue<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: RunLoop> fmt::Debug for UrgentQueue<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrgentQueue")
            .field("hooked", &self.is_hooked())
            .field("pending", &self.pending())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<L: RunLoop> Inner<L> {
    fn unhook(&self) {
        let Some(registration) = lock(&self.hook).take() else {
            return;
        };
        self.run_loop.remove_observer(registration);
        let discarded = self.pending.unhook();
        #[cfg(feature = "log")]
        if !discarded.is_empty() {
            log::debug!("discarding {} pending urgent tasks", discarded.len());
        }
        self.pending
            .counters
            .dropped
            .fetch_add(discarded.len() as u64, Ordering::Relaxed);
        // Dropped outside of the lock: a task's captures may call back into the queue.
        drop(discarded);
    }
}

impl<L: RunLoop> Drop for Inner<L> {
    fn drop(&mut self) {
        self.unhook();
    }
}

impl Pending {
    fn push(&self, task: Task) -> Result<(), RejectedTask> {
        let mut state = lock(&self.state);
        if !state.hooked {
            drop(state);
            #[cfg(feature = "log")]
            log::debug!("rejecting urgent task: hook is not installed");
            return Err(RejectedTask::new(task));
        }
        state.tasks.push_back(task);
        Ok(())
    }

    fn unhook(&self) -> VecDeque<Task> {
        let mut state = lock(&self.state);
        state.hooked = false;
        mem::take(&mut state.tasks)
    }

    /// Runs pending work one task at a time, in submission order.
    /// Called by the observer on the main thread.
    fn drain(&self) {
        let mut fired = false;
        loop {
            let task = lock(&self.state).tasks.pop_front();
            let Some(task) = task else {
                break;
            };
            if !fired {
                fired = true;
                self.counters.firings.fetch_add(1, Ordering::Relaxed);
            }
            self.counters.deferred.fetch_add(1, Ordering::Relaxed);
            run_caught(task);
        }
    }
}

#[cfg(test)]
static_assertions::assert_impl_all!(UrgentQueue<crate::LoopHandle>: Send, Sync, Clone);
