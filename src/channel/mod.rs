//! Request/response channel to a worker thread, with staleness cancellation.
//!
//! Every request gets a [`Token`] from a per-channel counter. A superseding
//! [`WorkerChannel::send`] first announces its token as the authority and
//! then sends the payload. Two checks keep stale results away from callers:
//!
//! - the worker re-reads the authority after finishing a job and answers
//!   `Canceled` if a newer token arrived meanwhile;
//! - the sending side only hands a result to its caller when the token is
//!   still the most recently sent one, and cancels older callers as soon as a
//!   newer request is sent.
//!
//! [`WorkerChannel::request`] is correlated but never superseded; the
//! language service uses it for queries whose answers all matter.

mod worker;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use anyhow::Context as _;
use tokio::sync::{mpsc, oneshot};

use crate::error::ChannelError;

/// Identifies one request on one channel. Later requests have larger tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u64);

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a caller gets back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    Ready(T),
    /// A newer request superseded this one. Not an error.
    Canceled,
}

impl<T> Reply<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Reply::Ready(value) => Some(value),
            Reply::Canceled => None,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Reply::Canceled)
    }
}

/// The work done on the other side of a channel.
pub trait Handler: Send + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    fn handle(&mut self, request: Self::Request) -> Self::Response;
}

enum Envelope<Req> {
    /// From now on only this token's superseding request is current.
    Authority(Token),
    Request {
        token: Token,
        superseding: bool,
        payload: Req,
    },
    Close,
}

struct Outcome<Resp> {
    token: Token,
    reply: Reply<Resp>,
}

type ReplySender<T> = oneshot::Sender<Result<Reply<T>, ChannelError>>;

struct Waiter<T> {
    superseding: bool,
    tx: ReplySender<T>,
}

struct State<T> {
    next_token: u64,
    /// Most recently sent superseding token.
    latest: Option<Token>,
    waiting: HashMap<Token, Waiter<T>>,
    closed: bool,
}

impl<T> State<T> {
    fn release_all(&mut self, name: &str) {
        for (_, waiter) in self.waiting.drain() {
            let _ = waiter.tx.send(Err(ChannelError::Disconnected(name.to_string())));
        }
    }
}

struct Shared<T> {
    name: Arc<str>,
    state: Mutex<State<T>>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Sending side of a worker. Cheap to clone; the worker stops when every
/// clone is dropped or [`WorkerChannel::close`] is called.
pub struct WorkerChannel<H: Handler> {
    shared: Arc<Shared<H::Response>>,
    envelopes: mpsc::UnboundedSender<Envelope<H::Request>>,
}

impl<H: Handler> Clone for WorkerChannel<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            envelopes: self.envelopes.clone(),
        }
    }
}

impl<H: Handler> WorkerChannel<H> {
    /// Start `handler` on its own thread. Must be called inside a tokio
    /// runtime, which hosts the task routing replies back to callers.
    pub fn spawn(name: &str, handler: H) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("worker channels must be spawned inside a tokio runtime")?;

        let (env_tx, env_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            name: Arc::from(name),
            state: Mutex::new(State {
                next_token: 0,
                latest: None,
                waiting: HashMap::new(),
                closed: false,
            }),
        });

        let thread_name = name.to_string();
        std::thread::Builder::new()
            .name(format!("stylepen-{name}"))
            .spawn(move || worker::run(&thread_name, handler, env_rx, out_tx))
            .with_context(|| format!("failed to start worker `{name}`"))?;

        runtime.spawn(route(Arc::clone(&shared), out_rx));
        tracing::debug!(channel = name, "worker started");

        Ok(Self {
            shared,
            envelopes: env_tx,
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Send a request that supersedes every earlier `send` on this channel.
    ///
    /// Earlier callers still waiting resolve `Canceled` immediately.
    pub fn send(&self, request: H::Request) -> ReplyFuture<H::Response> {
        self.submit(request, true)
    }

    /// Send a request that is answered regardless of later traffic.
    pub fn request(&self, request: H::Request) -> ReplyFuture<H::Response> {
        self.submit(request, false)
    }

    /// Stop the worker after the job it is running. Waiting callers resolve
    /// with [`ChannelError::Disconnected`].
    pub fn close(&self) {
        let _ = self.envelopes.send(Envelope::Close);
    }

    fn submit(&self, payload: H::Request, superseding: bool) -> ReplyFuture<H::Response> {
        let (tx, rx) = oneshot::channel();
        let future = ReplyFuture {
            rx,
            channel: Arc::clone(&self.shared.name),
        };

        let mut state = self.shared.lock();
        if state.closed {
            let _ = tx.send(Err(ChannelError::Disconnected(self.shared.name.to_string())));
            return future;
        }

        state.next_token += 1;
        let token = Token(state.next_token);

        if superseding {
            let stale: Vec<Token> = state
                .waiting
                .iter()
                .filter(|(_, w)| w.superseding)
                .map(|(t, _)| *t)
                .collect();
            for old in stale {
                if let Some(waiter) = state.waiting.remove(&old) {
                    tracing::trace!(channel = %self.shared.name, token = %old, "request superseded");
                    let _ = waiter.tx.send(Ok(Reply::Canceled));
                }
            }
            state.latest = Some(token);
        }
        state.waiting.insert(token, Waiter { superseding, tx });

        // Enqueued under the lock so envelope order always matches token order.
        let sent = (!superseding || self.envelopes.send(Envelope::Authority(token)).is_ok())
            && self
                .envelopes
                .send(Envelope::Request {
                    token,
                    superseding,
                    payload,
                })
                .is_ok();

        if !sent {
            tracing::warn!(channel = %self.shared.name, "worker is gone");
            state.closed = true;
            state.release_all(&self.shared.name);
        }

        future
    }
}

/// Sending-side router: delivers outcomes to the callers still waiting for them.
async fn route<T>(shared: Arc<Shared<T>>, mut outcomes: mpsc::UnboundedReceiver<Outcome<T>>) {
    while let Some(Outcome { token, reply }) = outcomes.recv().await {
        let mut state = shared.lock();
        let Some(waiter) = state.waiting.remove(&token) else {
            tracing::trace!(channel = %shared.name, %token, "response without a waiter dropped");
            continue;
        };

        let reply = match reply {
            Reply::Ready(_) if waiter.superseding && state.latest != Some(token) => {
                tracing::debug!(channel = %shared.name, %token, "stale response dropped");
                Reply::Canceled
            }
            reply => reply,
        };
        let _ = waiter.tx.send(Ok(reply));
    }

    let mut state = shared.lock();
    state.closed = true;
    state.release_all(&shared.name);
    tracing::debug!(channel = %shared.name, "router stopped");
}

/// Resolves once the request is answered, canceled, or the worker is gone.
#[must_use = "a reply future does nothing unless awaited"]
pub struct ReplyFuture<T> {
    rx: oneshot::Receiver<Result<Reply<T>, ChannelError>>,
    channel: Arc<str>,
}

impl<T> Future for ReplyFuture<T> {
    type Output = Result<Reply<T>, ChannelError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ChannelError::Disconnected(self.channel.to_string()))),
            Poll::Pending => Poll::Pending,
        }
    }
}
