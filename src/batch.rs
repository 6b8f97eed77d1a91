/*!
 * Fan-out orchestration of filter-file jobs
 *
 * A batch pairs one MRF source with many NPI filter files; each filter
 * file becomes an independent [`Job`] with its own output directory and
 * its own log. The [`JobOrchestrator`] dispatches jobs across a bounded
 * worker pool and contains the blast radius of any single failure: a
 * job that cannot load its filter, open its source, or survive its own
 * parsing is recorded as a failure in the [`BatchResult`] and never
 * takes a sibling or the batch down with it.
 *
 * Workers share no mutable state. Inputs are handed over by value or by
 * immutable reference at dispatch, outputs are per-job artifacts, and
 * results flow back only through the collect barrier — the batch
 * summary exists only once every job has reported.
 */

use std::any::Any;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use chrono::Utc;

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::MrfConfig;
use crate::constants::DEFAULT_LOGS_DIR;
use crate::filter::FilterSet;
use crate::source::{SourceLocation, SourceStream, StreamHandle};
use crate::{MrfError, Result};

/// Unit of work: one filter file applied to one source, writing into one
/// output directory
#[derive(Debug, Clone)]
pub struct Job {
    /// NPI filter file for this job
    pub filter_file: PathBuf,
    /// MRF payload to stream
    pub source: SourceLocation,
    /// Directory this job's rows are written into (created if absent)
    pub out_dir: PathBuf,
}

impl Job {
    pub fn new(filter_file: PathBuf, source: SourceLocation, out_dir: PathBuf) -> Self {
        Self {
            filter_file,
            source,
            out_dir,
        }
    }

    /// Base name of the filter file, used for the job's log file and
    /// display label
    pub fn label(&self) -> String {
        self.filter_file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "job".to_string())
    }
}

/// Collaborator contract for turning a filtered record stream into
/// output rows.
///
/// The orchestrator guarantees an open decompressed stream, a
/// normalized NPI filter set, an optional billing-code filter set, and
/// a writable output directory. Traversal of the rate structures and
/// the schema of what gets written are entirely the implementor's
/// concern.
pub trait Flattener: Send + Sync {
    fn flatten(
        &self,
        stream: StreamHandle,
        source: &SourceLocation,
        npi_filter: &FilterSet,
        code_filter: Option<&FilterSet>,
        out_dir: &Path,
    ) -> Result<()>;
}

/// Flattener that drains the stream and reports how many decompressed
/// bytes it saw.
///
/// Lets a batch be exercised end to end — filters loaded, directories
/// created, sources opened and fully streamed — before a real flattener
/// is wired in.
pub struct DrainFlattener;

impl Flattener for DrainFlattener {
    fn flatten(
        &self,
        mut stream: StreamHandle,
        source: &SourceLocation,
        npi_filter: &FilterSet,
        _code_filter: Option<&FilterSet>,
        _out_dir: &Path,
    ) -> Result<()> {
        let mut buf = [0u8; 8192];
        let mut total: u64 = 0;
        loop {
            let n = stream.read(&mut buf).map_err(|e| MrfError::Io {
                message: format!("error reading '{}': {}", source, e),
                source: e,
            })?;
            if n == 0 {
                break;
            }
            total += n as u64;
        }
        tracing::info!(source = %source, bytes = total, npis = npi_filter.len(), "drained source stream");
        Ok(())
    }
}

/// Aggregate outcome of a batch run, final only once every job has
/// reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchResult {
    fn from_outcomes(outcomes: &[JobOutcome]) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.result.is_ok()).count();
        Self {
            total: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} succeeded={} failed={}",
            self.total, self.succeeded, self.failed
        )
    }
}

/// Terminal state of one job
#[derive(Debug)]
struct JobOutcome {
    label: String,
    result: std::result::Result<(), String>,
}

/// Dedicated log sink for a single job: newline-delimited timestamped
/// entries under the orchestrator's logs directory
struct JobLog {
    writer: BufWriter<File>,
}

impl JobLog {
    fn create(logs_dir: &Path, label: &str) -> Result<Self> {
        fs::create_dir_all(logs_dir)?;
        let path = logs_dir.join(format!("{}.log", label));
        let file = File::create(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn entry(&mut self, message: &str) {
        let stamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        // a failed log write must not fail the job it is describing
        let _ = writeln!(self.writer, "[{}] {}", stamp, message);
        let _ = self.writer.flush();
    }
}

/// Worker count for a machine exposing `available_units` parallel units;
/// one unit stays free for the orchestrator, floored at 1
pub fn concurrency_for(available_units: usize) -> usize {
    available_units.saturating_sub(1).max(1)
}

/// Default worker count derived from the machine's available parallelism
pub fn default_concurrency() -> usize {
    let units = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    concurrency_for(units)
}

/// Fans a batch of jobs across a bounded worker pool with per-job fault
/// isolation.
///
/// ```no_run
/// use mrf::prelude::*;
/// use std::path::PathBuf;
///
/// # fn main() -> mrf::Result<()> {
/// let source = SourceLocation::parse("https://example.com/plan_rates.json.gz")?;
/// let jobs: Vec<Job> = ["north.csv", "south.csv"]
///     .iter()
///     .map(|f| Job::new(PathBuf::from(*f), source.clone(), PathBuf::from("out").join(f)))
///     .collect();
///
/// let result = JobOrchestrator::new().run(&jobs, None, &DrainFlattener);
/// println!("batch finished: {}", result);
/// # Ok(())
/// # }
/// ```
pub struct JobOrchestrator {
    concurrency: usize,
    logs_dir: PathBuf,
    opener: SourceStream,
    #[cfg(feature = "progress")]
    show_progress_bar: bool,
}

impl Default for JobOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl JobOrchestrator {
    /// Create an orchestrator with default settings
    pub fn new() -> Self {
        Self {
            concurrency: default_concurrency(),
            logs_dir: PathBuf::from(DEFAULT_LOGS_DIR),
            opener: SourceStream::new(),
            #[cfg(feature = "progress")]
            show_progress_bar: true,
        }
    }

    /// Create an orchestrator from a runtime configuration
    pub fn from_config(config: &MrfConfig) -> Self {
        Self {
            concurrency: config.worker_threads.unwrap_or_else(default_concurrency).max(1),
            logs_dir: config.logs_dir.clone(),
            opener: SourceStream::from_config(config),
            #[cfg(feature = "progress")]
            show_progress_bar: config.enable_progress_bar,
        }
    }

    /// Set the worker count (floored at 1)
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }

    /// Set the directory per-job log files are written under
    pub fn with_logs_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.logs_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the source opener used by every job
    pub fn with_opener(mut self, opener: SourceStream) -> Self {
        self.opener = opener;
        self
    }

    #[cfg(feature = "progress")]
    /// Enable or disable the batch progress bar
    pub fn with_progress_bar(mut self, show: bool) -> Self {
        self.show_progress_bar = show;
        self
    }

    /// The resolved worker count
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every job to a terminal state and report the aggregate tally.
    ///
    /// Jobs dispatch in input order and may complete in any order; the
    /// call blocks until all of them have reported. Individual job
    /// failures are data in the returned [`BatchResult`], never an
    /// error from this method.
    pub fn run<F: Flattener>(
        &self,
        jobs: &[Job],
        code_filter: Option<&FilterSet>,
        flattener: &F,
    ) -> BatchResult {
        if jobs.is_empty() {
            tracing::info!("batch contains no jobs");
            return BatchResult::default();
        }
        tracing::info!(jobs = jobs.len(), concurrency = self.concurrency, "batch started");

        #[cfg(feature = "progress")]
        let progress = if self.show_progress_bar {
            let bar = ProgressBar::new(jobs.len() as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} jobs ({eta})")
                    .unwrap()
                    .progress_chars("#>-"),
            );
            Some(bar)
        } else {
            None
        };

        let run_one = |job: &Job| {
            let outcome = self.execute(job, code_filter, flattener);
            #[cfg(feature = "progress")]
            if let Some(bar) = &progress {
                bar.inc(1);
            }
            outcome
        };

        #[cfg(feature = "parallel")]
        let outcomes: Vec<JobOutcome> = {
            use rayon::prelude::*;
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.concurrency)
                .thread_name(|i| format!("mrf-job-{}", i))
                .build()
            {
                Ok(pool) => pool.install(|| jobs.par_iter().map(run_one).collect()),
                Err(e) => {
                    tracing::error!(error = %e, "worker pool unavailable, running jobs sequentially");
                    jobs.iter().map(run_one).collect()
                }
            }
        };
        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<JobOutcome> = jobs.iter().map(run_one).collect();

        #[cfg(feature = "progress")]
        if let Some(bar) = progress {
            bar.finish();
        }

        let result = BatchResult::from_outcomes(&outcomes);
        tracing::info!(
            total = result.total,
            succeeded = result.succeeded,
            failed = result.failed,
            "batch complete"
        );
        result
    }

    /// Run one job to a terminal state.
    ///
    /// Every failure mode — filter load, directory creation, stream
    /// open, flattener error, or an outright panic in any of them — is
    /// captured here and becomes the job's recorded outcome.
    fn execute<F: Flattener>(
        &self,
        job: &Job,
        code_filter: Option<&FilterSet>,
        flattener: &F,
    ) -> JobOutcome {
        let label = job.label();

        let mut log = match JobLog::create(&self.logs_dir, &label) {
            Ok(log) => log,
            Err(e) => {
                let message = format!("cannot create job log: {}", e);
                tracing::error!(job = %label, error = %message, "job failed");
                return JobOutcome {
                    label,
                    result: Err(message),
                };
            }
        };

        log.entry(&format!(
            "job started: source={} out_dir={}",
            job.source,
            job.out_dir.display()
        ));
        tracing::info!(job = %label, source = %job.source, "job started");

        let caught = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_job(job, code_filter, flattener, &mut log)
        }));
        let result = match caught {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(payload) => Err(panic_message(payload)),
        };

        match &result {
            Ok(()) => {
                log.entry("job completed: success");
                tracing::info!(job = %label, "job succeeded");
            }
            Err(message) => {
                log.entry(&format!("job failed: {}", message));
                tracing::error!(job = %label, error = %message, "job failed");
            }
        }

        JobOutcome { label, result }
    }

    fn run_job<F: Flattener>(
        &self,
        job: &Job,
        code_filter: Option<&FilterSet>,
        flattener: &F,
        log: &mut JobLog,
    ) -> Result<()> {
        let npi_filter = FilterSet::from_npi_csv(&job.filter_file)?;
        log.entry(&format!("loaded filter set: {} entries", npi_filter.len()));

        fs::create_dir_all(&job.out_dir).map_err(|e| MrfError::Io {
            message: format!(
                "cannot create output directory '{}': {}",
                job.out_dir.display(),
                e
            ),
            source: e,
        })?;

        let stream = self.opener.open(&job.source)?;
        flattener.flatten(stream, &job.source, &npi_filter, code_filter, &job.out_dir)
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {}", message)
    } else {
        "panic: unknown payload".to_string()
    }
}
