#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]
#![forbid(
    clippy::dbg_macro,
    clippy::missing_safety_doc,
    clippy::unnecessary_safety_comment,
    clippy::unnecessary_safety_doc,
    unsafe_op_in_unsafe_fn
)]
#![deny(clippy::unwrap_used)]

//! Cut in line on the main thread ✂️
//!
//! UI toolkits funnel all of their work through a single main thread.
//! Getting something onto that thread usually means enqueuing it
//! behind everything that is already waiting there. When the queue
//! has a backlog, "run this on the main thread" can take a while.
//!
//! `cutline` hooks an observer into the main thread's run loop instead.
//! The observer fires right before the loop processes its sources and right
//! before it goes idle, which means urgent work runs as soon as the main thread
//! finishes whatever it is doing *right now*, ahead of the queued backlog.
//!
//! * Called on the main thread, [`UrgentQueue::add_urgent_task`] runs the work synchronously.
//! * Called on any other thread, the work is picked up by the observer
//!   at the loop's next [`BeforeSources`] or [`BeforeWaiting`] phase.
//!
//! This is a latency optimization, not a priority scheduler: there is
//! exactly one lane of urgent work, it runs in submission order, and
//! acceptance is the only guarantee. Work that is still pending when the
//! hook is removed or the loop stops iterating never runs.
//!
//! ## Example
//! ```
//! use cutline::{EventLoop, UrgentQueue};
//! use std::thread;
//!
//! let event_loop = EventLoop::new();
//! let queue = UrgentQueue::new(event_loop.handle());
//!
//! // Installing the hook must happen on the loop's thread.
//! assert!(queue.add_hook());
//!
//! let worker = {
//!     let queue = queue.clone();
//!     let handle = event_loop.handle();
//!     thread::spawn(move || {
//!         queue.add_urgent_task(move || {
//!             eprintln!("urgent work on the main thread");
//!             handle.stop();
//!         })
//!     })
//! };
//!
//! event_loop.run();
//! assert!(worker.join().expect("worker panicked"));
//! queue.remove_hook();
//! ```
//!
//! On macOS, use `platform::macos::MainRunLoop` to hook into the main `CFRunLoop`
//! (and with it, the main dispatch queue) instead of the portable [`EventLoop`].
//!
//! ## Errors
//! Failures are reported through `bool` return values, with `try_` variants
//! that explain what went wrong. Nothing in this crate panics on misuse.
//! It can be useful to turn on the `log` feature to find out what's going on.
//!
//! [`BeforeSources`]: Activity::BeforeSources
//! [`BeforeWaiting`]: Activity::BeforeWaiting

mod activity;
pub use activity::*;
mod error;
pub use error::{HookError, RejectedTask};
mod event_loop;
pub use event_loop::*;
#[cfg(feature = "future")]
mod future;
#[cfg(feature = "future")]
pub use future::*;
mod main_thread;
pub use main_thread::*;
mod run_loop;
pub use run_loop::*;
mod task;
pub use task::Task;
mod urgent;
pub use urgent::*;

cfg_if::cfg_if! {
    if #[cfg(target_os = "macos")] {
        mod macos;
    }
}

/// Contains platform-specific run loops.
pub mod platform {
    /// Hooks into the main `CFRunLoop` of an AppKit or UIKit-style application.
    ///
    /// [`MainRunLoop`](macos::MainRunLoop) identifies the main thread through
    /// `MainThreadMarker`, registers a repeating `CFRunLoopObserver` in the common
    /// run loop modes and wakes the run loop with `CFRunLoopWakeUp` when urgent work
    /// is submitted from another thread.
    #[cfg(target_os = "macos")]
    #[cfg_attr(docsrs, doc(cfg(target_os = "macos")))]
    pub mod macos {
        pub use crate::macos::{MainRunLoop, ObserverRegistration};
    }
}

/// # Feature Flags
///
/// * `log`—Enable logging through the [`log`](https://docs.rs/log) facade.
/// * `future`—Enable [`UrgentQueue::spawn_urgent`] which hands back the work's
///   result through a future (*default*).
#[cfg(doc)]
#[cfg_attr(docsrs, doc(cfg(doc)))]
pub mod feature_flags {}
