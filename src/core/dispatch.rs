//! KI-030: Fan-out dispatcher. One unit of work per node on a bounded pool.
//!
//! Units are launched in node order by at most `max_parallel` scoped worker
//! threads. A unit that has started always runs to completion, so a host is
//! never left between two remote steps. The first failing unit cancels the
//! shared token; units still queued beyond the first batch see it when a
//! worker picks them up and are reported as cancelled without being run.
//! Once every unit has finished, the first real error in launch order is
//! returned.

use super::error::KubeiError;
use super::rundata::Node;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use tracing::{debug, dispatcher};

/// Cancellation shared by all units of one dispatch.
#[derive(Debug, Default)]
struct CancelToken {
    cancelled: AtomicBool,
}

impl CancelToken {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Number of available processing units.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Run `work` once for every node, at most `max_parallel` at a time
/// (0 = CPU count), and aggregate the outcomes into one result.
pub fn dispatch<F>(nodes: &[&Node], max_parallel: usize, work: F) -> Result<(), KubeiError>
where
    F: Fn(&Node) -> Result<(), KubeiError> + Sync,
{
    if nodes.is_empty() {
        return Ok(());
    }

    let limit = if max_parallel == 0 {
        default_parallelism()
    } else {
        max_parallel
    };
    let worker_count = limit.min(nodes.len());
    debug!(nodes = nodes.len(), workers = worker_count, "dispatching");

    let cancel = CancelToken::default();
    let next = AtomicUsize::new(0);
    let log = dispatcher::get_default(|d| d.clone());
    let (tx, rx) = mpsc::channel::<(usize, Result<(), KubeiError>)>();

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            let tx = tx.clone();
            let (cancel, next, work, log) = (&cancel, &next, &work, &log);
            scope.spawn(move || {
                dispatcher::with_default(log, || loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(node) = nodes.get(index) else {
                        break;
                    };
                    let outcome = if index >= worker_count && cancel.is_cancelled() {
                        debug!(host = node.name(), "skipping queued unit after an earlier failure");
                        Err(KubeiError::Cancelled {
                            host: node.name().to_string(),
                            operation: "queued".to_string(),
                        })
                    } else {
                        run_unit(work, node)
                    };
                    if let Err(ref e) = outcome {
                        if !e.is_cancellation() {
                            cancel.cancel();
                        }
                    }
                    if tx.send((index, outcome)).is_err() {
                        break;
                    }
                })
            });
        }
    });
    drop(tx);

    let mut outcomes: Vec<Option<Result<(), KubeiError>>> = (0..nodes.len()).map(|_| None).collect();
    for (index, outcome) in rx {
        outcomes[index] = Some(outcome);
    }

    first_error(outcomes)
}

fn run_unit<F>(work: &F, node: &Node) -> Result<(), KubeiError>
where
    F: Fn(&Node) -> Result<(), KubeiError>,
{
    catch_unwind(AssertUnwindSafe(|| work(node))).unwrap_or_else(|payload| {
        Err(KubeiError::WorkerPanicked {
            host: node.name().to_string(),
            message: panic_message(payload.as_ref()),
        })
    })
}

/// Pick the error to report: the earliest real error by launch index, falling
/// back to the earliest cancellation.
fn first_error(outcomes: Vec<Option<Result<(), KubeiError>>>) -> Result<(), KubeiError> {
    let mut cancelled = None;
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Some(Ok(())) => {}
            Some(Err(e)) if e.is_cancellation() => {
                if cancelled.is_none() {
                    cancelled = Some(e);
                }
            }
            Some(Err(e)) => return Err(e),
            None => {
                return Err(KubeiError::WorkerPanicked {
                    host: format!("unit #{}", index),
                    message: "unit finished without reporting".to_string(),
                })
            }
        }
    }
    match cancelled {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
