//! Thread budget for the worker pool
//!
//! CPU cores are a fixed budget split between parallel tasks and the threads each
//! child encoder gets: `parallel_tasks * ENCODER_THREADS <= available cores`.

/// Threads a single magick / ffmpeg child is expected to keep busy.
const ENCODER_THREADS: usize = 2;
const MAX_PARALLEL_TASKS: usize = 8;

fn workers_for_cores(total_cores: usize) -> usize {
    // Reserve 20% of cores for the OS and UI, minimum 1, maximum 2
    let reserved = ((total_cores as f64 * 0.2).ceil() as usize).clamp(1, 2);
    let available_cores = total_cores.saturating_sub(reserved).max(1);
    // On a 10-core machine: 8 available / 2 = 4 tasks.
    (available_cores / ENCODER_THREADS).clamp(1, MAX_PARALLEL_TASKS)
}

/// Default `--max-workers`.
pub fn default_worker_count() -> usize {
    workers_for_cores(num_cpus::get())
}
