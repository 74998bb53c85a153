//! A portable run loop for a designated main thread.
//!
//! The loop owns a plain FIFO task queue (the "normal" way of getting work
//! onto the main thread) and reports the phases of every cycle to
//! registered observers, the same way a `CFRunLoop` does on Apple platforms.

use crate::task::{lock, read, run_caught, write};
use crate::{Activity, HookError, MainThread, ObserverFn, RunLoop, Task, ThreadIdentity};
use observers::Observers;
pub use observers::ObserverToken;
use std::cell::Cell;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::mem;
use std::sync::{Arc, Condvar, Mutex, RwLock};

mod observers;

/// An event loop bound to the thread that created it.
///
/// `EventLoop` is neither `Send` nor `Sync`: it can only be run on the
/// thread that created it, which becomes the loop's designated thread.
/// Use [`EventLoop::handle`] to talk to the loop from other threads.
pub struct EventLoop {
    shared: Arc<Shared>,
    running: Cell<bool>,
    _not_send: PhantomData<*const ()>,
}

/// Configures an [`EventLoop`].
#[derive(Debug, Clone)]
pub struct EventLoopBuilder {
    tasks_per_cycle: usize,
}

/// A cheap, cloneable handle to an [`EventLoop`] usable from any thread.
#[derive(Clone)]
pub struct LoopHandle {
    shared: Arc<Shared>,
}

struct Shared {
    identity: ThreadIdentity,
    tasks_per_cycle: usize,
    state: Mutex<State>,
    condvar: Condvar,
    observers: RwLock<Observers<ObserverFn>>,
}

#[derive(Default)]
struct State {
    tasks: VecDeque<Task>,
    woken: bool,
    stop: bool,
    closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Forever,
    UntilIdle,
}

#[cfg(test)]
static_assertions::assert_impl_all!(LoopHandle: Send, Sync);
#[cfg(test)]
static_assertions::assert_not_impl_any!(EventLoop: Send, Sync);

impl EventLoopBuilder {
    pub fn new() -> Self {
        Self { tasks_per_cycle: 1 }
    }

    /// How many queued tasks the loop runs per cycle before
    /// the observers get to see the next [`Activity::BeforeSources`].
    ///
    /// Defaults to `1`. Values below `1` are treated as `1`.
    pub fn tasks_per_cycle(mut self, tasks_per_cycle: usize) -> Self {
        self.tasks_per_cycle = tasks_per_cycle.max(1);
        self
    }

    /// Creates the loop. The calling thread becomes its designated thread.
    pub fn build(self) -> EventLoop {
        EventLoop {
            shared: Arc::new(Shared {
                identity: ThreadIdentity::current(),
                tasks_per_cycle: self.tasks_per_cycle,
                state: Mutex::new(State::default()),
                condvar: Condvar::new(),
                observers: RwLock::new(Observers::new()),
            }),
            running: Cell::new(false),
            _not_send: PhantomData,
        }
    }
}

impl Default for EventLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Creates a loop with the default configuration on the calling thread.
    pub fn new() -> Self {
        EventLoopBuilder::new().build()
    }

    pub fn builder() -> EventLoopBuilder {
        EventLoopBuilder::new()
    }

    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Returns `true` while [`EventLoop::run`] or [`EventLoop::run_until_idle`] is on the stack.
    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Runs the loop until [`LoopHandle::stop`] is called.
    ///
    /// A stop requested while the loop wasn't running ends the next run
    /// right after [`Activity::Entry`].
    /// Calling `run` from within a task of the same loop returns immediately.
    pub fn run(&self) {
        self.run_in(Mode::Forever);
    }

    /// Runs the loop until there are no more queued tasks
    /// and nothing woke the loop by the time it would start waiting.
    pub fn run_until_idle(&self) {
        self.run_in(Mode::UntilIdle);
    }

    fn run_in(&self, mode: Mode) {
        if self.running.replace(true) {
            #[cfg(feature = "log")]
            log::warn!("event loop is already running, ignoring nested run");
            return;
        }

        let shared = &self.shared;
        shared.notify(Activity::Entry);
        loop {
            if mem::take(&mut lock(&shared.state).stop) {
                break;
            }
            shared.notify(Activity::BeforeTimers);
            shared.notify(Activity::BeforeSources);
            if shared.perform_tasks() > 0 {
                continue;
            }
            shared.notify(Activity::BeforeWaiting);
            if !shared.wait(mode) {
                break;
            }
            shared.notify(Activity::AfterWaiting);
        }
        shared.notify(Activity::Exit);

        self.running.set(false);
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        let tasks = {
            let mut state = lock(&self.shared.state);
            state.closed = true;
            mem::take(&mut state.tasks)
        };
        let observers = mem::replace(&mut *write(&self.shared.observers), Observers::new());
        // Queued work and observer closures may own handles to this loop.
        drop(tasks);
        drop(observers);
    }
}

impl Shared {
    fn notify(&self, activity: Activity) {
        let observers = read(&self.observers).matching(activity);
        for observer in observers {
            // An earlier observer of this phase may have removed this one.
            if !read(&self.observers).contains(&observer) {
                continue;
            }
            run_caught(|| (**observer)(activity));
        }
    }

    fn perform_tasks(&self) -> usize {
        let mut ran = 0;
        while ran < self.tasks_per_cycle {
            let task = lock(&self.state).tasks.pop_front();
            let Some(task) = task else {
                break;
            };
            run_caught(task);
            ran += 1;
        }
        ran
    }

    /// Blocks until there is something to do.
    /// Returns `false` if the loop should exit instead.
    fn wait(&self, mode: Mode) -> bool {
        let mut state = lock(&self.state);
        loop {
            if state.stop || !state.tasks.is_empty() || mem::take(&mut state.woken) {
                return true;
            }
            if mode == Mode::UntilIdle {
                return false;
            }
            state = self
                .condvar
                .wait(state)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    fn update(&self, f: impl FnOnce(&mut State)) {
        f(&mut lock(&self.state));
        self.condvar.notify_one();
    }
}

impl LoopHandle {
    /// Enqueues `task` at the back of the loop's task queue.
    ///
    /// This is the normal way of running something on the loop's thread:
    /// the task runs after everything that was queued before it.
    /// Returns `false` if the loop has been dropped.
    pub fn dispatch(&self, task: impl FnOnce() + Send + 'static) -> bool {
        let mut accepted = false;
        self.shared.update(|state| {
            if !state.closed {
                state.tasks.push_back(Box::new(task));
                accepted = true;
            }
        });
        accepted
    }

    /// Asks the loop to stop. [`EventLoop::run`] returns at the start of its next cycle.
    pub fn stop(&self) {
        self.shared.update(|state| state.stop = true);
    }

    /// Makes a waiting loop run another cycle even if no task was queued.
    pub fn wake_up(&self) {
        self.shared.update(|state| state.woken = true);
    }

    /// Returns `true` once the [`EventLoop`] has been dropped.
    pub fn is_closed(&self) -> bool {
        lock(&self.shared.state).closed
    }

    /// The number of tasks waiting in the queue.
    pub fn queued_tasks(&self) -> usize {
        lock(&self.shared.state).tasks.len()
    }

    /// The number of observers currently registered.
    pub fn observer_count(&self) -> usize {
        read(&self.shared.observers).len()
    }
}

impl MainThread for LoopHandle {
    fn is_main_thread(&self) -> bool {
        self.shared.identity.is_main_thread()
    }
}

impl RunLoop for LoopHandle {
    type Registration = ObserverToken;

    fn add_observer(
        &self,
        activities: Activity,
        observer: ObserverFn,
    ) -> Result<ObserverToken, HookError> {
        if self.is_closed() {
            return Err(HookError::NoRunLoop);
        }
        Ok(write(&self.shared.observers).add(activities, observer)?)
    }

    fn remove_observer(&self, registration: ObserverToken) {
        write(&self.shared.observers).remove(registration);
    }

    fn wake_up(&self) {
        LoopHandle::wake_up(self);
    }

    fn is_closed(&self) -> bool {
        LoopHandle::is_closed(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::mpsc;
    use std::thread;

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(log: &Log, entry: impl Into<String>) {
        log.lock().expect("log poisoned").push(entry.into());
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().expect("log poisoned").clone()
    }

    fn observe(handle: &LoopHandle, activities: Activity, log: &Log) -> ObserverToken {
        let log = Arc::clone(log);
        handle
            .add_observer(
                activities,
                Box::new(move |activity| record(&log, format!("{activity:?}"))),
            )
            .expect("loop is open")
    }

    #[test]
    fn idle_loop_reports_every_phase_once() {
        let event_loop = EventLoop::new();
        let log = Log::default();
        let _token = observe(&event_loop.handle(), Activity::All, &log);
        event_loop.run_until_idle();
        assert_eq!(
            entries(&log),
            [
                "{Entry}",
                "{BeforeTimers}",
                "{BeforeSources}",
                "{BeforeWaiting}",
                "{Exit}"
            ]
        );
    }

    #[test]
    fn tasks_run_between_cycles() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let log = Log::default();
        let _token = observe(&handle, Activity::BeforeSources | Activity::BeforeWaiting, &log);
        for index in 0..2 {
            let log = Arc::clone(&log);
            assert!(handle.dispatch(move || record(&log, format!("task {index}"))));
        }
        assert_eq!(2, handle.queued_tasks());
        event_loop.run_until_idle();
        assert_eq!(0, handle.queued_tasks());
        assert_eq!(
            entries(&log),
            [
                "{BeforeSources}",
                "task 0",
                "{BeforeSources}",
                "task 1",
                "{BeforeSources}",
                "{BeforeWaiting}"
            ]
        );
    }

    #[test]
    fn batches_tasks_per_cycle() {
        let event_loop = EventLoop::builder().tasks_per_cycle(3).build();
        let handle = event_loop.handle();
        let log = Log::default();
        let _token = observe(&handle, Activity::BeforeSources, &log);
        for index in 0..4 {
            let log = Arc::clone(&log);
            handle.dispatch(move || record(&log, format!("task {index}")));
        }
        event_loop.run_until_idle();
        assert_eq!(
            entries(&log),
            [
                "{BeforeSources}",
                "task 0",
                "task 1",
                "task 2",
                "{BeforeSources}",
                "task 3",
                "{BeforeSources}"
            ]
        );
    }

    #[test]
    fn zero_tasks_per_cycle_is_clamped() {
        let event_loop = EventLoop::builder().tasks_per_cycle(0).build();
        let (sender, receiver) = mpsc::channel();
        event_loop.handle().dispatch(move || sender.send(()).expect("receiver alive"));
        event_loop.run_until_idle();
        assert!(receiver.try_recv().is_ok());
    }

    #[test]
    fn removed_observer_is_not_called() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let log = Log::default();
        let token = observe(&handle, Activity::BeforeSources, &log);
        assert_eq!(1, handle.observer_count());
        handle.remove_observer(token);
        assert_eq!(0, handle.observer_count());
        event_loop.run_until_idle();
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn observer_removed_by_earlier_observer_is_skipped() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let log = Log::default();
        let (sender, receiver) = mpsc::channel::<ObserverToken>();
        let receiver = Mutex::new(receiver);
        let remover = handle.clone();
        let _first = handle
            .add_observer(
                Activity::BeforeSources,
                Box::new(move |_| {
                    if let Ok(token) = receiver.lock().expect("poisoned").try_recv() {
                        remover.remove_observer(token);
                    }
                }),
            )
            .expect("loop is open");
        let second = observe(&handle, Activity::BeforeSources, &log);
        sender.send(second).expect("receiver alive");
        event_loop.run_until_idle();
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn stop_from_another_thread_ends_run() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let log = Log::default();
        let worker = {
            let log = Arc::clone(&log);
            let handle = handle.clone();
            thread::spawn(move || {
                for index in 0..3 {
                    let log = Arc::clone(&log);
                    handle.dispatch(move || record(&log, format!("task {index}")));
                }
                handle.stop();
            })
        };
        event_loop.run();
        worker.join().expect("worker panicked");
        // Whatever ran, ran in order.
        let ran = entries(&log);
        let expected: Vec<String> = (0..ran.len()).map(|i| format!("task {i}")).collect();
        assert_eq!(ran, expected);
        assert!(!event_loop.is_running());
    }

    #[test]
    fn wake_up_without_tasks_starts_a_new_cycle() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let log = Log::default();
        let _token = observe(&handle, Activity::AfterWaiting, &log);
        handle.wake_up();
        event_loop.run_until_idle();
        assert_eq!(entries(&log), ["{AfterWaiting}"]);
    }

    #[test]
    fn panicking_task_does_not_stop_the_loop() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let log = Log::default();
        handle.dispatch(|| panic!("boom"));
        {
            let log = Arc::clone(&log);
            handle.dispatch(move || record(&log, "after panic"));
        }
        event_loop.run_until_idle();
        assert_eq!(entries(&log), ["after panic"]);
    }

    thread_local! {
        static NESTED: RefCell<Option<Rc<EventLoop>>> = const { RefCell::new(None) };
    }

    #[test]
    fn nested_run_returns_immediately() {
        let event_loop = Rc::new(EventLoop::new());
        NESTED.with(|nested| *nested.borrow_mut() = Some(Rc::clone(&event_loop)));
        let log = Log::default();
        {
            let log = Arc::clone(&log);
            event_loop.handle().dispatch(move || {
                let inner = NESTED
                    .with(|nested| nested.borrow().clone())
                    .expect("loop is registered");
                assert!(inner.is_running());
                inner.run();
                record(&log, "nested run returned");
            });
        }
        event_loop.run_until_idle();
        NESTED.with(|nested| nested.borrow_mut().take());
        assert_eq!(entries(&log), ["nested run returned"]);
    }

    #[test]
    fn handle_knows_the_loop_thread() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        assert!(handle.is_main_thread());
        let on_worker = thread::spawn(move || handle.is_main_thread())
            .join()
            .expect("worker panicked");
        assert!(!on_worker);
    }

    #[test]
    fn dropped_loop_rejects_work_and_observers() {
        let handle = EventLoop::new().handle();
        assert!(handle.is_closed());
        assert!(!handle.dispatch(|| {}));
        let result = handle.add_observer(Activity::All, Box::new(|_| {}));
        assert_eq!(result.err(), Some(HookError::NoRunLoop));
    }
}
