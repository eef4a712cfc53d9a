//! The parallel unit kernels run on.
//!
//! Kernels are plain functions of an invocation id. A dispatch runs every
//! invocation unordered on a dedicated rayon pool, batched in workgroups, and
//! returns only once all of them finished and a full memory barrier was
//! issued. Invocations coordinate exclusively through `AtomicCounter`s and
//! atomic buffer words; all inputs are passed explicitly per dispatch.

pub mod buffer;
pub mod counter;

pub use buffer::{BufferRange, StorageBuffer};
pub use counter::AtomicCounter;

use std::sync::atomic::{fence, Ordering};

use rayon::prelude::*;

use crate::core::config::ComputeConfig;
use crate::core::{Error, Result};

/// Make every write of finished dispatches visible to later ones
#[inline]
pub fn memory_barrier() {
    fence(Ordering::SeqCst);
}

/// Execution context for compute dispatches
pub struct ComputeContext {
    pool: rayon::ThreadPool,
    workgroup_size: u32,
}

impl ComputeContext {
    /// Create the context. Failing to start the worker pool is fatal.
    pub fn new(config: &ComputeConfig) -> Result<Self> {
        if config.workgroup_size == 0 {
            return Err(Error::KernelSetup("workgroup_size must be at least 1".to_string()));
        }

        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("svox-compute-{}", i));
        if let Some(threads) = config.threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::KernelSetup(format!("compute pool: {}", e)))?;

        log::debug!(
            "Compute context ready: {} threads, workgroup size {}",
            pool.current_num_threads(),
            config.workgroup_size
        );

        Ok(Self {
            pool,
            workgroup_size: config.workgroup_size,
        })
    }

    pub fn workgroup_size(&self) -> u32 {
        self.workgroup_size
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Workgroups needed to cover `invocations`
    pub fn workgroup_count(&self, invocations: u32) -> u32 {
        invocations.div_ceil(self.workgroup_size)
    }

    /// Run `kernel(id)` for every id in `0..invocations` and wait for completion.
    pub fn dispatch<K>(&self, label: &str, invocations: u32, kernel: K)
    where
        K: Fn(u32) + Sync,
    {
        let workgroups = self.workgroup_count(invocations);
        log::trace!("[{}] {} invocations in {} workgroups", label, invocations, workgroups);

        if workgroups > 0 {
            let size = self.workgroup_size as u64;
            let total = invocations as u64;
            self.pool.install(|| {
                (0..workgroups).into_par_iter().for_each(|group| {
                    let first = group as u64 * size;
                    let end = (first + size).min(total);
                    for id in first..end {
                        kernel(id as u32);
                    }
                });
            });
        }

        memory_barrier();
    }
}

impl std::fmt::Debug for ComputeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeContext")
            .field("threads", &self.threads())
            .field("workgroup_size", &self.workgroup_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(workgroup_size: u32) -> ComputeContext {
        ComputeContext::new(&ComputeConfig { workgroup_size, threads: Some(4) }).unwrap()
    }

    #[test]
    fn test_workgroup_count() {
        let ctx = context(32);
        assert_eq!(ctx.workgroup_count(0), 0);
        assert_eq!(ctx.workgroup_count(1), 1);
        assert_eq!(ctx.workgroup_count(32), 1);
        assert_eq!(ctx.workgroup_count(33), 2);
        assert_eq!(ctx.threads(), 4);
    }

    #[test]
    fn test_dispatch_runs_each_invocation_once() {
        let ctx = context(7);
        let hits = StorageBuffer::new("hits", 1000);
        let range = hits.full_range();
        ctx.dispatch("count", 1000, |id| {
            range.fetch_or(id as usize, 1);
        });
        assert!(hits.to_vec().iter().all(|&w| w == 1));

        let counter = AtomicCounter::new("calls");
        ctx.dispatch("calls", 1000, |_| {
            counter.increment();
        });
        assert_eq!(counter.get_value(), 1000);
    }

    #[test]
    fn test_zero_invocations() {
        let ctx = context(32);
        let counter = AtomicCounter::new("calls");
        ctx.dispatch("empty", 0, |_| {
            counter.increment();
        });
        assert_eq!(counter.get_value(), 0);
    }

    #[test]
    fn test_rejects_empty_workgroups() {
        let result = ComputeContext::new(&ComputeConfig { workgroup_size: 0, threads: None });
        assert!(matches!(result, Err(Error::KernelSetup(_))));
    }
}
