//! The multiplexed backend: a dedicated worker thread drives many
//! requests concurrently while each submitter blocks on its own
//! completion.
//!
//! Submissions flow through an unbounded FIFO channel to the worker; each
//! carries a one-shot channel through which the finished request and its
//! outcome travel back. The channel pair provides the ordering guarantees
//! callers rely on: a submission happens-before the worker observes it,
//! and a request's completion happens-before its submitter returns. No
//! ordering exists between independent requests.

use std::{collections::VecDeque, thread, time::Duration};

use tokio::{
    runtime,
    sync::{mpsc, oneshot},
    task::JoinSet,
};
use tracing::{debug, error, warn};

use crate::{
    backend::Completion,
    config::S3Config,
    error::{ErrorKind, S3Error},
    request::PreparedRequest,
    transport,
};

struct Submission {
    request: PreparedRequest,
    done_tx: oneshot::Sender<Completion>,
}

/// Owns the worker thread. Dropping the backend closes the submission
/// channel; the worker drains everything already submitted, exits, and is
/// joined.
pub(crate) struct MultiBackend {
    submit_tx: Option<mpsc::UnboundedSender<Submission>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl MultiBackend {
    pub(crate) fn new(config: &S3Config) -> Result<Self, S3Error> {
        let client = transport::build_client(config)?;
        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                S3Error::init(format!("failed to build worker runtime: {e}"))
            })?;

        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        let max_in_flight = config.max_total_connections.max(1);
        let idle_timeout = config.multi_idle_timeout;

        let worker = thread::Builder::new()
            .name("s3-multi".to_string())
            .spawn(move || {
                runtime.block_on(worker_loop(
                    client,
                    submit_rx,
                    max_in_flight,
                    idle_timeout,
                ));
            })
            .map_err(|e| {
                S3Error::init(format!("failed to spawn worker thread: {e}"))
            })?;

        Ok(Self {
            submit_tx: Some(submit_tx),
            worker: Some(worker),
        })
    }

    /// Submit one request and block until the worker completes it.
    pub(crate) fn run(&self, request: PreparedRequest) -> Completion {
        let (done_tx, done_rx) = oneshot::channel();

        let Some(submit_tx) = self.submit_tx.as_ref() else {
            // Unreachable while the backend is alive; kept for safety.
            return Completion {
                request,
                result: Err(S3Error::new(
                    ErrorKind::Internal,
                    "multiplexed backend is stopping",
                )),
            };
        };

        if let Err(rejected) = submit_tx.send(Submission { request, done_tx }) {
            let Submission { request, .. } = rejected.0;
            return Completion {
                request,
                result: Err(S3Error::new(
                    ErrorKind::Internal,
                    "multiplexed backend is stopping",
                )),
            };
        }

        // The worker completes every submission it receives before exiting,
        // and the channel outlives this call, so the only way to see a
        // closed one-shot here is a worker panic.
        done_rx
            .blocking_recv()
            .expect("s3-multi worker exited without delivering a completion")
    }
}

impl Drop for MultiBackend {
    fn drop(&mut self) {
        // Closing the submission channel is the stop signal.
        drop(self.submit_tx.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("s3-multi worker panicked");
            }
        }
    }
}

/// The worker: receive submissions, keep at most `max_in_flight` requests
/// executing, deliver each completion through its one-shot channel, and
/// exit once the submission channel closes and all work has drained.
async fn worker_loop(
    client: reqwest::Client,
    mut submit_rx: mpsc::UnboundedReceiver<Submission>,
    max_in_flight: usize,
    idle_timeout: Duration,
) {
    debug!(max_in_flight, "s3-multi worker started");

    let mut pending: VecDeque<Submission> = VecDeque::new();
    let mut in_flight: JoinSet<()> = JoinSet::new();
    let mut open = true;

    loop {
        // Move pending submissions into execution while capacity allows.
        while in_flight.len() < max_in_flight {
            let Some(submission) = pending.pop_front() else {
                break;
            };
            let client = client.clone();
            in_flight.spawn(async move {
                let Submission {
                    mut request,
                    done_tx,
                } = submission;
                let result = transport::execute(&client, &mut request).await;
                match &result {
                    Ok(status) => debug!(%status, "request harvested"),
                    Err(err) => warn!("request harvested with error: {err}"),
                }
                // A dropped receiver means the submitter is gone; the
                // request is released with the completion.
                let _ = done_tx.send(Completion { request, result });
            });
        }

        if !open && pending.is_empty() && in_flight.is_empty() {
            break;
        }

        tokio::select! {
            biased;
            joined = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Some(Err(join_err)) = joined {
                    // The completion was lost with the task; the submitter
                    // sees a closed one-shot and panics in turn.
                    error!("in-flight request task failed: {join_err}");
                }
            }
            received = submit_rx.recv(), if open => match received {
                Some(submission) => pending.push_back(submission),
                None => open = false,
            },
            // Bounded park while requests are in flight, so harvesting
            // never waits on a wakeup that raced with completion.
            _ = tokio::time::sleep(idle_timeout), if !in_flight.is_empty() => {}
        }
    }

    debug!("s3-multi worker stopped");
}
