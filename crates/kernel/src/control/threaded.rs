//! Receiver that runs its controller on a dedicated thread.
//!
//! Requests and replies travel over bounded crossbeam channels and carry a
//! sequence number. The simulator waits at most the tick timeout; a reply
//! that arrives after its tick gave up is discarded on the next tick.

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::{ClockReceiver, ControlOutput, ReceiverError, TickContext};

/// Controller logic hosted by a [`ThreadedReceiver`].
pub trait Controller: Send + 'static {
    fn control(&mut self, ctx: &TickContext) -> ControlOutput;
}

impl<F> Controller for F
where
    F: FnMut(&TickContext) -> ControlOutput + Send + 'static,
{
    fn control(&mut self, ctx: &TickContext) -> ControlOutput {
        self(ctx)
    }
}

struct Request {
    seq: u64,
    ctx: TickContext,
}

struct Reply {
    seq: u64,
    output: ControlOutput,
}

pub struct ThreadedReceiver {
    name: String,
    requests: Option<Sender<Request>>,
    replies: Receiver<Reply>,
    next_seq: u64,
    worker: Option<JoinHandle<()>>,
}

impl ThreadedReceiver {
    /// Start the controller thread.
    pub fn spawn<C: Controller>(name: impl Into<String>, mut controller: C) -> std::io::Result<Self> {
        let name = name.into();
        let (request_tx, request_rx) = crossbeam_channel::bounded::<Request>(1);
        let (reply_tx, reply_rx) = crossbeam_channel::bounded::<Reply>(1);

        let worker = thread::Builder::new()
            .name(format!("controller-{name}"))
            .spawn(move || {
                for request in request_rx.iter() {
                    let output = controller.control(&request.ctx);
                    let reply = Reply {
                        seq: request.seq,
                        output,
                    };
                    if reply_tx.send(reply).is_err() {
                        break;
                    }
                }
            })?;

        Ok(Self {
            name,
            requests: Some(request_tx),
            replies: reply_rx,
            next_seq: 0,
            worker: Some(worker),
        })
    }
}

impl ClockReceiver for ThreadedReceiver {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self, ctx: &TickContext) -> Result<ControlOutput, ReceiverError> {
        let Some(requests) = &self.requests else {
            return Err(ReceiverError::Disconnected);
        };
        let deadline = Instant::now() + ctx.timeout;
        let seq = self.next_seq;
        self.next_seq += 1;

        while let Ok(stale) = self.replies.try_recv() {
            tracing::trace!(receiver = %self.name, seq = stale.seq, "discarding late reply");
        }

        let request = Request {
            seq,
            ctx: ctx.clone(),
        };
        match requests.send_deadline(request, deadline) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => return Err(ReceiverError::Timeout(ctx.timeout)),
            Err(SendTimeoutError::Disconnected(_)) => return Err(ReceiverError::Disconnected),
        }

        loop {
            match self.replies.recv_deadline(deadline) {
                Ok(reply) if reply.seq == seq => return Ok(reply.output),
                Ok(stale) => {
                    tracing::trace!(receiver = %self.name, seq = stale.seq, "discarding late reply");
                }
                Err(RecvTimeoutError::Timeout) => return Err(ReceiverError::Timeout(ctx.timeout)),
                Err(RecvTimeoutError::Disconnected) => return Err(ReceiverError::Disconnected),
            }
        }
    }
}

impl Drop for ThreadedReceiver {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop after its current call.
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            // A worker still inside a controller call is detached, not waited on.
            if worker.is_finished() && worker.join().is_err() {
                tracing::warn!(receiver = %self.name, "controller thread panicked");
            }
        }
    }
}
