//! Background evaluation pool.
//!
//! The editing side snapshots the graph and queues a job; workers evaluate
//! snapshots against the shared cache and report events. Jobs for the same
//! target coalesce: a job whose target has since been requested again is
//! skipped if it has not started, and cancelled between nodes if it has.

use std::collections::HashMap;
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{EvalError, GraphError};
use crate::graph::{GraphSnapshot, NodeGraph, NodeId};
use crate::preview::{PreviewBridge, PreviewFrame};

use super::{CancelToken, EvalReport, Evaluator};

/// Handle for one queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTicket {
    pub target: NodeId,
    pub epoch: u64,
}

/// Progress reported by the pool.
#[derive(Debug, Clone)]
pub enum EvalEvent {
    /// The pass finished and the target produced an image.
    Completed { target: NodeId, report: EvalReport },
    /// The pass finished but the target has no image.
    Failed {
        target: NodeId,
        epoch: u64,
        error: EvalError,
    },
    /// A newer request for the same target made this one moot.
    Superseded { target: NodeId, epoch: u64 },
}

impl EvalEvent {
    pub fn target(&self) -> NodeId {
        match self {
            EvalEvent::Completed { target, .. }
            | EvalEvent::Failed { target, .. }
            | EvalEvent::Superseded { target, .. } => *target,
        }
    }

    pub fn epoch(&self) -> u64 {
        match self {
            EvalEvent::Completed { report, .. } => report.epoch,
            EvalEvent::Failed { epoch, .. } | EvalEvent::Superseded { epoch, .. } => *epoch,
        }
    }
}

struct Job {
    target: NodeId,
    snapshot: GraphSnapshot,
    cancel: CancelToken,
}

/// Newest requested epoch per target, with the token of its job.
type Pending = Arc<Mutex<HashMap<NodeId, (u64, CancelToken)>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A pool of evaluation threads sharing one [`Evaluator`].
pub struct EvaluationService {
    evaluator: Evaluator,
    jobs: Option<Sender<Job>>,
    events: Receiver<EvalEvent>,
    pending: Pending,
    workers: Vec<JoinHandle<()>>,
}

impl EvaluationService {
    /// Spawn `workers` threads (at least one). Completed target images are
    /// published to `bridge` when one is given.
    pub fn start(
        evaluator: Evaluator,
        workers: usize,
        bridge: Option<PreviewBridge>,
    ) -> io::Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (event_tx, event_rx) = mpsc::channel();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let pending: Pending = Arc::default();

        let count = workers.max(1);
        let mut handles = Vec::with_capacity(count);
        for index in 0..count {
            let worker = Worker {
                evaluator: evaluator.clone(),
                jobs: Arc::clone(&job_rx),
                events: event_tx.clone(),
                pending: Arc::clone(&pending),
                bridge: bridge.clone(),
            };
            let handle = thread::Builder::new()
                .name(format!("texgraph-eval-{index}"))
                .spawn(move || worker.run())?;
            handles.push(handle);
        }
        info!(workers = count, "evaluation service started");

        Ok(Self {
            evaluator,
            jobs: Some(job_tx),
            events: event_rx,
            pending,
            workers: handles,
        })
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Snapshot `target`'s closure and queue it.
    pub fn request(&self, graph: &NodeGraph, target: NodeId) -> Result<JobTicket, GraphError> {
        let snapshot = graph.snapshot(&[target])?;
        Ok(self.submit(target, snapshot))
    }

    /// Queue the terminal node.
    pub fn request_terminal(&self, graph: &NodeGraph) -> Result<JobTicket, GraphError> {
        let target = graph.terminal().ok_or(GraphError::NoTerminal)?;
        self.request(graph, target)
    }

    /// Queue an already captured snapshot for `target`.
    pub fn submit(&self, target: NodeId, snapshot: GraphSnapshot) -> JobTicket {
        let epoch = snapshot.epoch();
        let cancel = CancelToken::new();
        {
            let mut pending = lock(&self.pending);
            let stale = pending
                .get(&target)
                .is_some_and(|(newest, _)| *newest > epoch);
            if !stale {
                if let Some((_, previous)) = pending.insert(target, (epoch, cancel.clone())) {
                    previous.cancel();
                }
            }
        }

        let job = Job {
            target,
            snapshot,
            cancel,
        };
        if let Some(jobs) = &self.jobs {
            if jobs.send(job).is_err() {
                debug!(target = %target, "no worker left to take job");
            }
        }
        debug!(target = %target, epoch, "queued evaluation");
        JobTicket { target, epoch }
    }

    /// Wait up to `timeout` for the next event.
    pub fn next_event(&self, timeout: Duration) -> Option<EvalEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_next_event(&self) -> Option<EvalEvent> {
        self.events.try_recv().ok()
    }

    /// Wait for the event that settles `ticket`, discarding others.
    pub fn wait_for(&self, ticket: JobTicket, timeout: Duration) -> Option<EvalEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.checked_duration_since(Instant::now())?;
            let event = self.next_event(left)?;
            if event.target() == ticket.target && event.epoch() == ticket.epoch {
                return Some(event);
            }
        }
    }

    /// Stop accepting jobs, let queued ones drain and join the workers.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.jobs.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("evaluation worker panicked");
            }
        }
    }
}

impl Drop for EvaluationService {
    fn drop(&mut self) {
        self.stop();
        debug!("evaluation service stopped");
    }
}

struct Worker {
    evaluator: Evaluator,
    jobs: Arc<Mutex<Receiver<Job>>>,
    events: Sender<EvalEvent>,
    pending: Pending,
    bridge: Option<PreviewBridge>,
}

impl Worker {
    fn run(self) {
        loop {
            let job = lock(&self.jobs).recv();
            let Ok(job) = job else { break };
            let (target, epoch) = (job.target, job.snapshot.epoch());
            let event = self.process(job);
            self.settle(target, epoch);
            // Nobody may be listening; the pass still filled the cache.
            let _ = self.events.send(event);
        }
        debug!("evaluation worker exiting");
    }

    fn is_superseded(&self, target: NodeId, epoch: u64) -> bool {
        lock(&self.pending)
            .get(&target)
            .is_some_and(|(newest, _)| *newest > epoch)
    }

    /// Drop the pending entry once its newest job is done.
    fn settle(&self, target: NodeId, epoch: u64) {
        let mut pending = lock(&self.pending);
        if pending.get(&target).is_some_and(|(newest, _)| *newest == epoch) {
            pending.remove(&target);
        }
    }

    fn process(&self, job: Job) -> EvalEvent {
        let Job {
            target,
            snapshot,
            cancel,
        } = job;
        let epoch = snapshot.epoch();
        if self.is_superseded(target, epoch) {
            debug!(target = %target, epoch, "skipping superseded job");
            return EvalEvent::Superseded { target, epoch };
        }

        let report = self.evaluator.evaluate_with(&snapshot, &cancel);
        if !report.is_complete() {
            return EvalEvent::Superseded { target, epoch };
        }
        match report.output(target, 0) {
            Ok(image) => {
                if let Some(bridge) = &self.bridge {
                    bridge.publish(PreviewFrame {
                        node: target,
                        epoch,
                        image,
                    });
                }
                EvalEvent::Completed { target, report }
            }
            Err(error) => EvalEvent::Failed {
                target,
                epoch,
                error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamSet;

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[test]
    fn settled_targets_leave_no_pending_entry() {
        let mut g = NodeGraph::with_resolution(8, 8).unwrap();
        let a = g
            .add_node("constant", ParamSet::new().with("value", 0.2))
            .unwrap();
        let b = g.add_node("invert", ParamSet::new()).unwrap();
        g.connect(a, 0, b, 0).unwrap();

        let service = EvaluationService::start(Evaluator::new(), 2, None).unwrap();
        let first = service.request(&g, b).unwrap();
        let second = service.request(&g, b).unwrap();
        let event = service.wait_for(second, TIMEOUT).unwrap();
        assert!(matches!(event, EvalEvent::Completed { .. }));
        assert!(first.epoch < second.epoch);

        assert!(lock(&service.pending).is_empty());
        service.shutdown();
    }

    #[test]
    fn removed_nodes_do_not_accumulate() {
        let mut g = NodeGraph::with_resolution(4, 4).unwrap();
        let service = EvaluationService::start(Evaluator::new(), 1, None).unwrap();
        for _ in 0..8 {
            let id = g.add_node("constant", ParamSet::new()).unwrap();
            let ticket = service.request(&g, id).unwrap();
            assert!(service.wait_for(ticket, TIMEOUT).is_some());
            g.remove_node(id).unwrap();
        }
        assert!(lock(&service.pending).is_empty());
    }
}
