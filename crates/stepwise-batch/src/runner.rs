use anyhow::{Context, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

/// Bounded worker pool that runs every branch of one step.
///
/// `run` returns only when all branches have finished, which is the barrier
/// between steps.
pub struct BranchPool {
    pool: ThreadPool,
    threads: usize,
}

impl BranchPool {
    /// `workers = 0` uses one thread per CPU.
    pub fn new(workers: usize) -> Result<Self> {
        let threads = if workers == 0 { num_cpus::get() } else { workers };
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("stepwise-branch-{i}"))
            .build()
            .context("building Rayon thread pool for branch runs")?;
        debug!(threads, "branch pool ready");
        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Apply `job` to every item in parallel, keeping input order.
    pub fn run<I, T, F>(&self, items: &[I], job: F) -> Vec<T>
    where
        I: Sync,
        T: Send,
        F: Fn(&I) -> T + Sync,
    {
        self.pool.install(|| items.par_iter().map(&job).collect())
    }
}
