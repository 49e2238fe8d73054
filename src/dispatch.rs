//! Debounced dispatch: coalesce bursts of edits into one compile at a time.
//!
//! Two layers sit in front of a [`WorkerChannel`]:
//!
//! - a single-slot debouncer holding the latest edit, whose deadline moves
//!   forward on every [`DispatchQueue::notify`];
//! - at most one outstanding submission. A newer submission replaces it and
//!   the channel resolves the old one `Canceled`, so its result never reaches
//!   the output stream.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::channel::{Handler, Reply, ReplyFuture, WorkerChannel};
use crate::error::ChannelError;

// ── Debouncer ───────────────────────────────────────────────────────────

/// Latest pending edit and the instant it becomes due.
struct Debouncer<T> {
    quiet_period: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
}

impl<T> Debouncer<T> {
    fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            pending: None,
            deadline: None,
        }
    }

    /// Replace the pending edit and restart the quiet period.
    fn push(&mut self, edit: T, now: Instant) {
        self.pending = Some(edit);
        self.deadline = Some(now + self.quiet_period);
    }

    fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    fn deadline(&self) -> Instant {
        self.deadline.unwrap_or_else(Instant::now)
    }

    fn take(&mut self) -> Option<T> {
        self.deadline = None;
        self.pending.take()
    }

    fn clear(&mut self) {
        self.deadline = None;
        self.pending = None;
    }
}

// ── Queue ───────────────────────────────────────────────────────────────

enum Command<T> {
    Edit(T),
    Flush(T),
}

/// Handle to a running dispatch loop. Dropping every clone stops the loop.
pub struct DispatchQueue<H: Handler> {
    commands: mpsc::UnboundedSender<Command<H::Request>>,
}

impl<H: Handler> Clone for DispatchQueue<H> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
        }
    }
}

impl<H: Handler> DispatchQueue<H> {
    /// Start the loop on the current tokio runtime.
    ///
    /// The receiver yields every response that was not superseded, in
    /// submission order.
    pub fn spawn(
        channel: WorkerChannel<H>,
        quiet_period: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<H::Response>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let (results, results_rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch_loop(channel, quiet_period, rx, results));
        (Self { commands }, results_rx)
    }

    /// Record an edit. It is submitted once no newer edit arrives for the
    /// quiet period.
    pub fn notify(&self, edit: H::Request) {
        if self.commands.send(Command::Edit(edit)).is_err() {
            tracing::warn!("dispatch queue stopped; edit dropped");
        }
    }

    /// Submit now, discarding any edit still waiting for its quiet period.
    pub fn flush(&self, edit: H::Request) {
        if self.commands.send(Command::Flush(edit)).is_err() {
            tracing::warn!("dispatch queue stopped; edit dropped");
        }
    }
}

async fn dispatch_loop<H: Handler>(
    channel: WorkerChannel<H>,
    quiet_period: Duration,
    mut commands: mpsc::UnboundedReceiver<Command<H::Request>>,
    results: mpsc::UnboundedSender<H::Response>,
) {
    let mut debouncer = Debouncer::new(quiet_period);
    let mut in_flight: Option<ReplyFuture<H::Response>> = None;

    loop {
        tokio::select! {
            biased;
            command = commands.recv() => match command {
                Some(Command::Edit(edit)) => debouncer.push(edit, Instant::now()),
                Some(Command::Flush(edit)) => {
                    debouncer.clear();
                    in_flight = Some(channel.send(edit));
                }
                None => break,
            },
            _ = tokio::time::sleep_until(debouncer.deadline()), if debouncer.is_armed() => {
                if let Some(edit) = debouncer.take() {
                    tracing::debug!(channel = channel.name(), "quiet period elapsed, submitting");
                    in_flight = Some(channel.send(edit));
                }
            }
            outcome = wait(&mut in_flight), if in_flight.is_some() => {
                in_flight = None;
                match outcome {
                    Ok(Reply::Ready(response)) => {
                        if results.send(response).is_err() {
                            break;
                        }
                    }
                    Ok(Reply::Canceled) => {
                        tracing::trace!(channel = channel.name(), "submission superseded");
                    }
                    Err(err) => {
                        tracing::error!("dispatch stopped: {err}");
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!(channel = channel.name(), "dispatch loop stopped");
}

async fn wait<T>(in_flight: &mut Option<ReplyFuture<T>>) -> Result<Reply<T>, ChannelError> {
    match in_flight {
        Some(reply) => reply.await,
        None => std::future::pending().await,
    }
}
