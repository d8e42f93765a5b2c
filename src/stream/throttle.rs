//! Latest-wins throttling for display-rate consumers

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Extension trait to add throttling to any Stream
pub trait ThrottleExt: Stream {
    /// Emit at most once per `period`
    ///
    /// Items arriving within one period replace each other; only the latest is
    /// emitted. A period with no items emits nothing.
    fn throttle(self, period: Duration) -> Throttle<Self>
    where
        Self: Sized,
    {
        Throttle::new(self, period)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// Stream returned by [`ThrottleExt::throttle`]
    pub struct Throttle<S: Stream> {
        #[pin]
        stream: S,
        interval: Interval,
        latest: Option<S::Item>,
        // A tick has elapsed and the next item may go out immediately
        open: bool,
        done: bool,
    }
}

impl<S: Stream> Throttle<S> {
    pub fn new(stream: S, period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self { stream, interval, latest: None, open: false, done: false }
    }
}

impl<S: Stream> Stream for Throttle<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if *this.done {
            return Poll::Ready(this.latest.take());
        }

        if !*this.open {
            ready!(this.interval.poll_tick(cx));
            *this.open = true;
        }

        loop {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.latest = Some(item),
                Poll::Ready(None) => {
                    *this.done = true;
                    return Poll::Ready(this.latest.take());
                }
                Poll::Pending => {
                    return match this.latest.take() {
                        Some(item) => {
                            *this.open = false;
                            Poll::Ready(Some(item))
                        }
                        // Stay open; the inner stream wakes us with the next item
                        None => Poll::Pending,
                    };
                }
            }
        }
    }
}
