//! Cancellable quiescence timer for search input.
//!
//! [`Debouncer`] is a plain state machine over any clock whose instants can be
//! offset by a [`Duration`]; [`firings`] replays a recorded event series
//! through it and [`run`] drives it from a tokio channel.

use std::ops::Add;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Pending<T, I> {
    value: T,
    deadline: I,
}

/// Holds at most one pending value; every push cancels the previous timer.
#[derive(Debug, Clone)]
pub struct Debouncer<T, I> {
    window: Duration,
    pending: Option<Pending<T, I>>,
}

impl<T, I> Debouncer<T, I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    /// Records input at `at`, rescheduling the deadline to `at + window`.
    pub fn push(&mut self, value: T, at: I) {
        self.pending = Some(Pending {
            value,
            deadline: at + self.window,
        });
    }

    pub fn deadline(&self) -> Option<I> {
        self.pending.as_ref().map(|pending| pending.deadline)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Takes the pending value once its deadline has passed.
    pub fn poll(&mut self, now: I) -> Option<T> {
        match &self.pending {
            Some(pending) if pending.deadline <= now => {
                self.pending.take().map(|pending| pending.value)
            }
            _ => None,
        }
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|pending| pending.value)
    }
}

/// Replays `(offset, value)` input events and returns `(offset, value)` firings.
///
/// Events are processed in time order; a timer that expires at or before the
/// next event fires first.
pub fn firings<T, E>(events: E, window: Duration) -> Vec<(Duration, T)>
where
    E: IntoIterator<Item = (Duration, T)>,
{
    let mut events: Vec<_> = events.into_iter().collect();
    events.sort_by_key(|(at, _)| *at);

    let mut debouncer = Debouncer::new(window);
    let mut fired = Vec::new();
    for (at, value) in events {
        if let Some(deadline) = debouncer.deadline() {
            if let Some(value) = debouncer.poll(at) {
                fired.push((deadline, value));
            }
        }
        debouncer.push(value, at);
    }
    if let Some(deadline) = debouncer.deadline() {
        if let Some(value) = debouncer.cancel() {
            fired.push((deadline, value));
        }
    }
    fired
}

/// Forwards values from `input` to `output` once `window` passes without new input.
///
/// Returns when `input` closes, discarding any value still waiting on its
/// timer, or when `output` is dropped.
#[cfg(feature = "client")]
pub async fn run<T>(
    mut input: tokio::sync::mpsc::Receiver<T>,
    output: tokio::sync::mpsc::Sender<T>,
    window: Duration,
) {
    use tokio::time::{Instant, sleep_until};

    let mut debouncer = Debouncer::new(window);
    loop {
        let deadline = debouncer.deadline();
        tokio::select! {
            received = input.recv() => match received {
                Some(value) => debouncer.push(value, Instant::now()),
                None => break,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some(value) = debouncer.poll(Instant::now()) {
                    if output.send(value).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
    if debouncer.cancel().is_some() {
        tracing::debug!("debounce input closed with a pending value; dropped");
    }
}
