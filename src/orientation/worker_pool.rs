//! Fixed pool of worker threads draining a job queue.
//!
//! Workers pull jobs from a shared queue and send each result back over a
//! channel. The calling thread consumes results in arrival order, so storage
//! writes stay on one thread. No job is started once the deadline has passed
//! or once the consumer has failed; jobs already running are allowed to finish.
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Mutex};
use std::thread;

use log::{debug, info};

use crate::pigazing_errors::PiGazingError;
use crate::time::Deadline;

/// Worker count when none is configured: every core but one, at least one.
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

/// What happened to the jobs handed to [`run_pool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolOutcome {
    /// Results delivered to the consumer
    pub completed: usize,
    /// Jobs never started because of the deadline
    pub not_started: usize,
    pub deadline_reached: bool,
}

/// Run `work` over `jobs` on `workers` threads.
///
/// Arguments
/// -----------------
/// * `jobs`: units of work, started in order.
/// * `workers`: thread count, clamped to `[1, jobs.len()]`.
/// * `deadline`: checked before each job is started.
/// * `work`: the job body, run on a worker thread.
/// * `on_result`: called on the calling thread for each result as it arrives.
///
/// Return
/// ----------
/// * The [`PoolOutcome`], or the first error of `on_result`. After such an error
///   no further job is started and pending results are dropped.
pub fn run_pool<J, R, W, C>(
    jobs: Vec<J>,
    workers: usize,
    deadline: &Deadline,
    work: W,
    mut on_result: C,
) -> Result<PoolOutcome, PiGazingError>
where
    J: Send,
    R: Send,
    W: Fn(J) -> R + Sync,
    C: FnMut(R) -> Result<(), PiGazingError>,
{
    let total = jobs.len();
    if total == 0 {
        return Ok(PoolOutcome::default());
    }
    let workers = workers.clamp(1, total);
    let queue = Mutex::new(jobs.into_iter().collect::<VecDeque<J>>());
    let stop = AtomicBool::new(false);
    let deadline_reached = AtomicBool::new(false);
    debug!("dispatching {total} job(s) to {workers} worker(s)");

    let mut completed = 0;
    let mut failure = None;
    thread::scope(|scope| {
        let (tx, rx) = mpsc::channel::<R>();
        for _ in 0..workers {
            let tx = tx.clone();
            let (queue, stop, deadline_reached, work) = (&queue, &stop, &deadline_reached, &work);
            scope.spawn(move || loop {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                if deadline.expired() {
                    deadline_reached.store(true, Ordering::Relaxed);
                    break;
                }
                let job = match queue.lock() {
                    Ok(mut q) => q.pop_front(),
                    Err(_) => None,
                };
                let Some(job) = job else { break };
                if tx.send(work(job)).is_err() {
                    break;
                }
            });
        }
        // Only the workers hold senders now, so the loop ends when they all exit
        drop(tx);

        for result in rx {
            if failure.is_some() {
                continue;
            }
            match on_result(result) {
                Ok(()) => completed += 1,
                Err(e) => {
                    stop.store(true, Ordering::Relaxed);
                    failure = Some(e);
                }
            }
        }
    });

    if let Some(e) = failure {
        return Err(e);
    }
    let not_started = queue.into_inner().map(|q| q.len()).unwrap_or(0);
    let deadline_reached = deadline_reached.into_inner();
    if deadline_reached {
        info!("deadline reached, {not_started} job(s) not started");
    }
    Ok(PoolOutcome {
        completed,
        not_started,
        deadline_reached,
    })
}
