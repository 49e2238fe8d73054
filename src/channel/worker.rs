//! The receiving side: the loop that runs on the worker thread.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use super::{Envelope, Handler, Outcome, Reply, Token};

/// A request waiting on the worker side.
struct Job<Req> {
    token: Token,
    superseding: bool,
    payload: Req,
}

/// Worker-side view of the protocol: the authority marker and the jobs that
/// arrived but have not run yet.
struct Inbox<Req> {
    authority: Option<Token>,
    jobs: VecDeque<Job<Req>>,
    closing: bool,
}

impl<Req> Inbox<Req> {
    fn absorb(&mut self, envelope: Envelope<Req>) {
        match envelope {
            Envelope::Authority(token) => self.authority = Some(token),
            Envelope::Request {
                token,
                superseding,
                payload,
            } => self.jobs.push_back(Job {
                token,
                superseding,
                payload,
            }),
            Envelope::Close => self.closing = true,
        }
    }

    /// Take everything already sent without blocking.
    fn drain(&mut self, rx: &mut UnboundedReceiver<Envelope<Req>>) {
        while let Ok(envelope) = rx.try_recv() {
            self.absorb(envelope);
        }
    }

    fn is_current(&self, job_token: Token, superseding: bool) -> bool {
        !superseding || self.authority == Some(job_token)
    }
}

/// Serve requests until every sender is gone or the channel is closed.
///
/// Authority changes are absorbed before a job starts and again before its
/// result is sent, so a job that was overtaken while running answers
/// `Canceled` and a job overtaken before it started never runs.
pub(super) fn run<H: Handler>(
    name: &str,
    mut handler: H,
    mut rx: UnboundedReceiver<Envelope<H::Request>>,
    out: UnboundedSender<Outcome<H::Response>>,
) {
    let mut inbox = Inbox {
        authority: None,
        jobs: VecDeque::new(),
        closing: false,
    };

    loop {
        if inbox.jobs.is_empty() && !inbox.closing {
            match rx.blocking_recv() {
                Some(envelope) => inbox.absorb(envelope),
                None => break,
            }
        }
        inbox.drain(&mut rx);

        if inbox.closing {
            break;
        }
        let Some(job) = inbox.jobs.pop_front() else {
            continue;
        };

        if !inbox.is_current(job.token, job.superseding) {
            tracing::trace!(channel = name, token = %job.token, "skipping superseded request");
            if out
                .send(Outcome {
                    token: job.token,
                    reply: Reply::Canceled,
                })
                .is_err()
            {
                break;
            }
            continue;
        }

        tracing::trace!(channel = name, token = %job.token, "request started");
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(job.payload)));
        inbox.drain(&mut rx);

        let reply = match result {
            Ok(response) if inbox.is_current(job.token, job.superseding) => Reply::Ready(response),
            Ok(_) => {
                tracing::debug!(channel = name, token = %job.token, "request superseded while running");
                Reply::Canceled
            }
            Err(_) => {
                tracing::error!(channel = name, token = %job.token, "request handler panicked");
                Reply::Canceled
            }
        };

        if out
            .send(Outcome {
                token: job.token,
                reply,
            })
            .is_err()
        {
            break;
        }
    }

    tracing::debug!(channel = name, dropped = inbox.jobs.len(), "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc as std_mpsc;
    use tokio::sync::mpsc;

    /// Echoes its input; the first call blocks until the gate opens.
    struct Gated {
        gate: Option<std_mpsc::Receiver<()>>,
        seen: std_mpsc::Sender<u32>,
    }

    impl Handler for Gated {
        type Request = u32;
        type Response = u32;

        fn handle(&mut self, request: u32) -> u32 {
            let _ = self.seen.send(request);
            if let Some(gate) = self.gate.take() {
                let _ = gate.recv();
            }
            request
        }
    }

    fn request(token: u64, payload: u32) -> Envelope<u32> {
        Envelope::Request {
            token: Token(token),
            superseding: true,
            payload,
        }
    }

    #[test]
    fn stale_jobs_are_skipped_and_overtaken_jobs_cancel() {
        let (env_tx, env_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (gate_tx, gate_rx) = std_mpsc::channel();
        let (seen_tx, seen_rx) = std_mpsc::channel();

        let worker = std::thread::spawn(move || {
            run(
                "test",
                Gated {
                    gate: Some(gate_rx),
                    seen: seen_tx,
                },
                env_rx,
                out_tx,
            )
        });

        env_tx.send(Envelope::Authority(Token(1))).unwrap();
        env_tx.send(request(1, 10)).unwrap();
        assert_eq!(seen_rx.recv().unwrap(), 10);

        // Two newer requests arrive while the first is running.
        env_tx.send(Envelope::Authority(Token(2))).unwrap();
        env_tx.send(request(2, 20)).unwrap();
        env_tx.send(Envelope::Authority(Token(3))).unwrap();
        env_tx.send(request(3, 30)).unwrap();
        gate_tx.send(()).unwrap();
        drop(env_tx);
        worker.join().unwrap();

        let outcomes: Vec<_> = std::iter::from_fn(|| out_rx.try_recv().ok())
            .map(|o| (o.token.0, o.reply))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                (1, Reply::Canceled),
                (2, Reply::Canceled),
                (3, Reply::Ready(30)),
            ]
        );
        // Request 2 never reached the handler.
        assert_eq!(seen_rx.try_iter().collect::<Vec<_>>(), vec![30]);
    }

    #[test]
    fn correlated_requests_ignore_authority() {
        let (env_tx, env_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (seen_tx, _seen_rx) = std_mpsc::channel();

        env_tx.send(Envelope::Authority(Token(5))).unwrap();
        env_tx
            .send(Envelope::Request {
                token: Token(4),
                superseding: false,
                payload: 7,
            })
            .unwrap();
        drop(env_tx);

        run("test", Gated { gate: None, seen: seen_tx }, env_rx, out_tx);

        let outcome = out_rx.try_recv().unwrap();
        assert_eq!(outcome.reply, Reply::Ready(7));
    }

    struct Exploding;

    impl Handler for Exploding {
        type Request = ();
        type Response = ();

        fn handle(&mut self, _: ()) {
            panic!("boom")
        }
    }

    #[test]
    fn panicking_handler_answers_canceled() {
        let (env_tx, env_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();

        env_tx.send(Envelope::Authority(Token(1))).unwrap();
        env_tx
            .send(Envelope::Request {
                token: Token(1),
                superseding: true,
                payload: (),
            })
            .unwrap();
        drop(env_tx);

        run("test", Exploding, env_rx, out_tx);

        assert_eq!(out_rx.try_recv().unwrap().reply, Reply::Canceled);
        assert!(out_rx.try_recv().is_err());
    }
}
