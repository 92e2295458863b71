//! Bounded parallel task execution
//!
//! Tasks are dispatched in input order onto a pool of at most `workers`
//! evaluation threads. The first failure cancels every task not yet
//! dispatched; tasks already running are drained before the failure is
//! reported.

use super::errors::{Error, Result};
use super::executor::{lost_evaluation, spawn_evaluation};
use super::report::{Event, Reporter, Status};
use super::types::Val;
use indexmap::IndexMap;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Deferred task body, evaluated on its own thread
pub type TaskFn = Box<dyn FnOnce() -> Result<Val> + Send + 'static>;

pub struct ParallelExecutor {
    handle: Handle,
    reporter: Reporter,
    workers: usize,
}

impl ParallelExecutor {
    pub fn new(handle: Handle, reporter: Reporter, workers: usize) -> Self {
        ParallelExecutor {
            handle,
            reporter,
            workers: workers.max(1),
        }
    }

    /// Run every task and return the results keyed by task name, in input
    /// order
    ///
    /// Must be called from outside the runtime's worker threads.
    pub fn run(&self, tasks: Vec<(String, TaskFn)>) -> Result<IndexMap<String, Val>> {
        self.handle.block_on(self.run_async(tasks))
    }

    async fn run_async(&self, tasks: Vec<(String, TaskFn)>) -> Result<IndexMap<String, Val>> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let cancel = CancellationToken::new();
        let failure: Arc<OnceLock<(String, Error)>> = Arc::new(OnceLock::new());

        let names: Vec<String> = tasks.iter().map(|(name, _)| name.clone()).collect();
        let mut running = Vec::with_capacity(tasks.len());

        tracing::debug!(tasks = names.len(), workers = self.workers, "parallel dispatch");

        for (index, (name, task)) in tasks.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let permit = match permit {
                Some(permit) if !cancel.is_cancelled() => permit,
                _ => {
                    self.reporter.emit(
                        Event::new("task_end")
                            .step(&name)
                            .status(Status::Cancelled),
                    );
                    continue;
                }
            };

            let reporter = self.reporter.clone();
            let cancel_on_error = cancel.clone();
            let first_failure = failure.clone();
            let task_name = name.clone();
            let spawned = spawn_evaluation(&name, move || {
                let _permit = permit;
                reporter.emit(Event::new("task_start").step(&task_name));
                let started = Instant::now();

                let outcome = task();

                let end = Event::new("task_end")
                    .step(&task_name)
                    .duration(started.elapsed());
                match &outcome {
                    Ok(_) => reporter.emit(end.status(Status::Ok)),
                    Err(error) => {
                        reporter.emit(end.status(Status::Error).error(error));
                        let _ = first_failure.set((task_name, error.clone()));
                        cancel_on_error.cancel();
                    }
                }
                outcome
            });

            match spawned {
                Ok(receiver) => running.push((index, receiver)),
                Err(error) => {
                    let _ = failure.set((name, error));
                    cancel.cancel();
                }
            }
        }

        let mut results: Vec<Option<Val>> = vec![None; names.len()];
        for (index, receiver) in running {
            match receiver.await {
                Ok(Ok(value)) => results[index] = Some(value),
                Ok(Err(_)) => {}
                Err(_) => {
                    let _ = failure.set((names[index].clone(), lost_evaluation(&names[index])));
                }
            }
        }

        if let Some((task, source)) = failure.get() {
            return Err(Error::ParallelTaskFailed {
                task: task.clone(),
                source: Box::new(source.clone()),
            });
        }

        names
            .into_iter()
            .zip(results)
            .map(|(name, value)| match value {
                Some(value) => Ok((name, value)),
                None => Err(lost_evaluation(&name)),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::host::MemorySink;
    use crate::interpreter::types::{Expr, Program, Run};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn reporter() -> (Reporter, Arc<MemorySink>) {
        let program = Program {
            meta: IndexMap::new(),
            imports: Vec::new(),
            inputs: IndexMap::new(),
            steps: Vec::new(),
            run: Run::Expr(Expr::literal(0)),
        };
        let sink = Arc::new(MemorySink::default());
        (Reporter::new(&program, sink.clone()), sink)
    }

    fn task(f: impl FnOnce() -> Result<Val> + Send + 'static) -> TaskFn {
        Box::new(f)
    }

    /// Run on a plain thread, the way evaluation threads call in
    fn run_detached(executor: ParallelExecutor, tasks: Vec<(String, TaskFn)>) -> Result<IndexMap<String, Val>> {
        std::thread::spawn(move || executor.run(tasks))
            .join()
            .expect("executor thread")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_results_in_input_order() {
        let (reporter, sink) = reporter();
        let executor = ParallelExecutor::new(Handle::current(), reporter, 4);
        let tasks = vec![
            (
                "slow".to_string(),
                task(|| {
                    std::thread::sleep(Duration::from_millis(50));
                    Ok(Val::Int(1))
                }),
            ),
            ("fast".to_string(), task(|| Ok(Val::Int(2)))),
        ];

        let results = run_detached(executor, tasks).expect("Should succeed");
        let keys: Vec<&str> = results.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["slow", "fast"]);
        assert_eq!(results["fast"], Val::Int(2));

        let events = sink.events();
        assert_eq!(events.iter().filter(|e| e.kind == "task_start").count(), 2);
        assert_eq!(events.iter().filter(|e| e.kind == "task_end").count(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pool_is_bounded() {
        let (reporter, _) = reporter();
        let executor = ParallelExecutor::new(Handle::current(), reporter, 2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..6)
            .map(|i| {
                let active = active.clone();
                let peak = peak.clone();
                let body = task(move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(Val::Int(i))
                });
                (format!("t{}", i), body)
            })
            .collect();

        let results = run_detached(executor, tasks).expect("Should succeed");
        assert_eq!(results.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_first_failure_cancels_undispatched() {
        let (reporter, sink) = reporter();
        let executor = ParallelExecutor::new(Handle::current(), reporter, 1);
        let tasks = vec![
            ("a".to_string(), task(|| Err(Error::value_error("boom")))),
            ("b".to_string(), task(|| Ok(Val::Int(2)))),
            ("c".to_string(), task(|| Ok(Val::Int(3)))),
        ];

        let err = run_detached(executor, tasks).expect_err("Should fail");
        let Error::ParallelTaskFailed { task, source } = &err else {
            unreachable!("Expected ParallelTaskFailed, got {:?}", err);
        };
        assert_eq!(task, "a");
        assert_eq!(source.describe(), "ValueError: boom");

        let cancelled: Vec<String> = sink
            .events()
            .into_iter()
            .filter(|e| e.status == Some(Status::Cancelled))
            .filter_map(|e| e.step)
            .collect();
        assert_eq!(cancelled, vec!["b", "c"]);
    }
}
