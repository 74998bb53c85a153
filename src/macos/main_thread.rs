use dispatch::Queue;
use objc2::MainThreadMarker;

pub(crate) fn is_main_thread() -> bool {
    MainThreadMarker::new().is_some()
}

// Inspired by run_on_main:
// <https://github.com/madsmtm/objc2/blob/67a4acd391663a072061f04d35ba2c1a351d8900/framework-crates/objc2-foundation/src/main_thread_bound.rs#L27>
pub(crate) fn run_on_main_async(f: impl FnOnce() + Send + 'static) {
    Queue::main().exec_async(f);
}
