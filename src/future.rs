use crate::{RejectedTask, RunLoop, UrgentQueue};
use futures_channel::oneshot;
pub use futures_channel::oneshot::Canceled;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// Resolves to the value returned by urgent work submitted with
    /// [`UrgentQueue::spawn_urgent`].
    ///
    /// Resolves to [`Canceled`] if the work was discarded without running,
    /// e.g. because the hook was removed or the work panicked.
    #[must_use = "dropping the handle does not cancel the work, but its result is lost"]
    pub struct UrgentHandle<T> {
        #[pin] receiver: oneshot::Receiver<T>,
    }
}

#[cfg(test)]
static_assertions::assert_impl_all!(UrgentHandle<u32>: Send, Sync);

impl<T> UrgentHandle<T> {
    /// Blocks the calling thread until the work has run.
    ///
    /// Never call this on the main thread for deferred work:
    /// the main thread would wait for itself.
    pub fn wait(self) -> Result<T, Canceled> {
        futures_lite::future::block_on(self)
    }

    /// Returns the result if the work already ran, without blocking.
    pub fn try_take(&mut self) -> Option<Result<T, Canceled>> {
        match self.receiver.try_recv() {
            Ok(Some(value)) => Some(Ok(value)),
            Ok(None) => None,
            Err(canceled) => Some(Err(canceled)),
        }
    }
}

impl<T> Future for UrgentHandle<T> {
    type Output = Result<T, Canceled>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project().receiver.poll(cx)
    }
}

impl<L: RunLoop> UrgentQueue<L> {
    /// Like [`UrgentQueue::try_add_urgent_task`] but makes the value
    /// returned by `work` available through the returned [`UrgentHandle`].
    pub fn spawn_urgent<T, F>(&self, work: F) -> Result<UrgentHandle<T>, RejectedTask>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.try_add_urgent_task(move || {
            // The receiver may be gone already, nobody is interested then.
            _ = sender.send(work());
        })?;
        Ok(UrgentHandle { receiver })
    }
}
