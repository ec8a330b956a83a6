//! Worker pool - concurrent match execution over shared registry state
//!
//! A round fans `n_matches` tasks across a bounded pool of worker threads.
//! Each task is `select -> run subprocess -> update`; only the subprocess
//! step runs outside the registry lock, so selections and updates never
//! interleave while the long-latency part stays fully parallel. Virtual loss
//! applied at selection keeps concurrent workers off the same in-flight
//! agents, and is rolled back whenever a match produces no outcome.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, warn};

use ladder_core::{apply_match, release_pair, select_pair, Registry};

use crate::runner::{MatchError, MatchRunner, SideSpec};

/// Cooperative stop signal shared by the population loop, the workers and
/// any in-flight subprocess supervision.
#[derive(Clone, Debug, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown: no new matches are claimed and running children
    /// are killed at the next poll.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Accounting for one completed round
#[derive(Clone, Copy, Debug, Default)]
pub struct RoundSummary {
    /// Matches the round asked for
    pub scheduled: usize,
    /// Matches that produced an applied outcome
    pub completed: usize,
    /// Matches claimed but dropped (runner error, timeout, interrupt)
    pub failed: usize,
}

/// Run one round of `n_matches` concurrent matches, blocking until every
/// claimed task has either applied its outcome or been dropped.
pub fn run_round(
    registry: &Mutex<Registry>,
    runner: &MatchRunner,
    n_matches: usize,
    threads: usize,
    exploration_c: f32,
    elo_k: f32,
    shutdown: &ShutdownFlag,
) -> RoundSummary {
    let (task_tx, task_rx) = crossbeam::channel::bounded::<()>(n_matches);
    for _ in 0..n_matches {
        task_tx.send(()).expect("channel sized to the round");
    }
    drop(task_tx);

    let completed = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    crossbeam::scope(|s| {
        for _ in 0..threads.max(1) {
            let task_rx = task_rx.clone();
            let completed = &completed;
            let failed = &failed;
            s.spawn(move |_| {
                while !shutdown.is_set() && task_rx.try_recv().is_ok() {
                    match run_one(registry, runner, exploration_c, elo_k, shutdown) {
                        TaskResult::Completed => {
                            completed.fetch_add(1, Ordering::Relaxed);
                        }
                        TaskResult::Dropped => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                        TaskResult::Abandon => break,
                    }
                }
            });
        }
    })
    .expect("match worker panicked");

    RoundSummary {
        scheduled: n_matches,
        completed: completed.into_inner(),
        failed: failed.into_inner(),
    }
}

enum TaskResult {
    Completed,
    Dropped,
    /// The pool cannot make progress (e.g. fewer than two agents); the
    /// worker should stop claiming tasks.
    Abandon,
}

fn run_one(
    registry: &Mutex<Registry>,
    runner: &MatchRunner,
    exploration_c: f32,
    elo_k: f32,
    shutdown: &ShutdownFlag,
) -> TaskResult {
    // Critical section 1: pick the pair and charge virtual loss.
    let (lesser, greater, lesser_spec, greater_spec) = {
        let mut reg = registry.lock().unwrap();
        let (lesser, greater) = match select_pair(&mut reg, exploration_c) {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "pair selection failed, abandoning round");
                return TaskResult::Abandon;
            }
        };

        let specs = (
            SideSpec::for_agent(&reg, &lesser),
            SideSpec::for_agent(&reg, &greater),
        );
        match specs {
            (Some(ls), Some(gs)) => (lesser, greater, ls, gs),
            _ => {
                // Directory invariant broken; restore and drop the task.
                debug_assert!(false, "selected agent without directory entry");
                error!(%lesser, %greater, "missing network path for selected pair");
                release_pair(&mut reg, &lesser, &greater);
                return TaskResult::Dropped;
            }
        }
    };

    // Long-latency part, no lock held.
    let outcome = runner.run(&lesser_spec, &greater_spec, shutdown);

    // Critical section 2: land the outcome, or restore selection state.
    let mut reg = registry.lock().unwrap();
    match outcome {
        Ok(counts) => match apply_match(&mut reg, &lesser, &greater, counts, elo_k) {
            Ok(()) => TaskResult::Completed,
            Err(e) => {
                debug_assert!(false, "update rejected: {}", e);
                error!(%lesser, %greater, error = %e, "dropping unappliable outcome");
                release_pair(&mut reg, &lesser, &greater);
                TaskResult::Dropped
            }
        },
        Err(MatchError::Interrupted) => {
            debug!(%lesser, %greater, "match interrupted by shutdown");
            release_pair(&mut reg, &lesser, &greater);
            TaskResult::Dropped
        }
        Err(e) => {
            warn!(%lesser, %greater, error = %e, "match failed, restoring selection state");
            release_pair(&mut reg, &lesser, &greater);
            TaskResult::Dropped
        }
    }
}
