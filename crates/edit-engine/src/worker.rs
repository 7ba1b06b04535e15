//! Bulk line processing.
//!
//! Re-deriving per-line data (tokenization, analysis) over a large range is
//! too slow for the mutation thread, while spawning a thread for a handful of
//! lines costs more than the work itself. [`BulkProcessor`] dispatches a
//! line-range job inline below a configurable threshold and on a worker
//! thread above it; either way results arrive over the returned channel.

use std::sync::mpsc;
use std::thread;

/// Default line count above which jobs move to a worker thread.
pub const DEFAULT_INLINE_THRESHOLD: usize = 64;

/// Dispatches per-line jobs inline or on a worker thread by batch size.
#[derive(Debug, Clone)]
pub struct BulkProcessor {
    inline_threshold: usize,
}

impl BulkProcessor {
    /// Create a processor with the default inline threshold.
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_INLINE_THRESHOLD)
    }

    /// Create a processor that runs batches of up to `inline_threshold` lines
    /// on the calling thread.
    pub fn with_threshold(inline_threshold: usize) -> Self {
        Self { inline_threshold }
    }

    /// Run `job` over `lines`, yielding `(line_index, output)` pairs in line
    /// order on the returned channel. `first_line` is the index of the first
    /// element of `lines` in the document.
    pub fn process<T, F>(
        &self,
        first_line: usize,
        lines: Vec<String>,
        job: F,
    ) -> mpsc::Receiver<(usize, T)>
    where
        T: Send + 'static,
        F: Fn(usize, &str) -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        if lines.len() <= self.inline_threshold {
            run_job(first_line, &lines, &job, &tx);
        } else {
            thread::spawn(move || {
                run_job(first_line, &lines, &job, &tx);
            });
        }
        rx
    }
}

impl Default for BulkProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn run_job<T, F>(first_line: usize, lines: &[String], job: &F, tx: &mpsc::Sender<(usize, T)>)
where
    F: Fn(usize, &str) -> T,
{
    for (i, line) in lines.iter().enumerate() {
        let index = first_line + i;
        // The receiver may have been dropped by a caller that no longer
        // cares; stop instead of erroring.
        if tx.send((index, job(index, line))).is_err() {
            return;
        }
    }
}
