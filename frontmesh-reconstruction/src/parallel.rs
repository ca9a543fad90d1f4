//! Parallel processing utilities for reconstruction
//!
//! Guidance estimation fans out over samples on a dedicated thread pool; the
//! mesher itself stays on the calling thread.

use frontmesh_core::{Error, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Thread pool configuration for parallel processing
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of threads to use (None = automatic)
    pub num_threads: Option<usize>,
    /// Thread stack size in bytes
    pub stack_size: Option<usize>,
    /// Thread name prefix
    pub thread_name_prefix: String,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            stack_size: None,
            thread_name_prefix: "frontmesh-guidance".to_string(),
        }
    }
}

impl ThreadPoolConfig {
    /// Configuration for a requested thread count, where 0 means automatic
    pub fn for_threads(threads: usize) -> Self {
        Self::default().with_threads(threads)
    }

    /// Set number of threads
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = if num_threads == 0 { None } else { Some(num_threads) };
        self
    }

    /// Set stack size
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Whether work should run inline on the caller's thread
    pub fn is_sequential(&self) -> bool {
        self.num_threads == Some(1)
    }
}

/// Build a thread pool from the configuration
pub fn build_thread_pool(config: &ThreadPoolConfig) -> Result<ThreadPool> {
    let mut builder = ThreadPoolBuilder::new();

    if let Some(num_threads) = config.num_threads {
        builder = builder.num_threads(num_threads);
    }

    if let Some(stack_size) = config.stack_size {
        builder = builder.stack_size(stack_size);
    }

    if !config.thread_name_prefix.is_empty() {
        let prefix = config.thread_name_prefix.clone();
        builder = builder.thread_name(move |index| format!("{}-{}", prefix, index));
    }

    builder
        .build()
        .map_err(|e| Error::Algorithm(format!("Failed to create thread pool: {}", e)))
}

/// Map with index, one output slot per input
///
/// Runs inline for a single thread, otherwise on a pool built for the call.
pub fn parallel_map_indexed<T, U, F>(config: &ThreadPoolConfig, data: &[T], f: F) -> Result<Vec<U>>
where
    T: Sync,
    U: Send,
    F: Fn(usize, &T) -> U + Sync + Send,
{
    if config.is_sequential() || data.len() < 2 {
        return Ok(data.iter().enumerate().map(|(i, x)| f(i, x)).collect());
    }

    let pool = build_thread_pool(config)?;
    Ok(pool.install(|| data.par_iter().enumerate().map(|(i, x)| f(i, x)).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_pool_config() {
        let config = ThreadPoolConfig::default()
            .with_threads(4)
            .with_stack_size(16 * 1024 * 1024);

        assert_eq!(config.num_threads, Some(4));
        assert_eq!(config.stack_size, Some(16 * 1024 * 1024));
        assert!(!config.is_sequential());
    }

    #[test]
    fn test_zero_threads_means_automatic() {
        let config = ThreadPoolConfig::for_threads(0);
        assert_eq!(config.num_threads, None);
    }

    #[test]
    fn test_parallel_map_indexed_preserves_order() {
        let data: Vec<usize> = (0..500).collect();
        for threads in [1, 3] {
            let config = ThreadPoolConfig::for_threads(threads);
            let result = parallel_map_indexed(&config, &data, |i, x| i + x).unwrap();
            assert_eq!(result.len(), 500);
            assert!(result.iter().enumerate().all(|(i, v)| *v == 2 * i));
        }
    }
}
