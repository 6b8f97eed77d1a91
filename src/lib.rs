/*!
 * # MRF Ingestion & Identity Library
 *
 * A Rust library for streaming, filtering, and identity-hashing
 * healthcare price-transparency machine-readable files (MRFs).
 *
 * ## Features
 *
 * - 🚀 **Streaming First**: multi-gigabyte payloads are never
 *   materialized — local and remote sources read through the same
 *   lazily-decompressing byte stream
 * - 🌐 **Unified Access**: one opener for filesystem paths and http(s)
 *   URLs, gzip-compressed or plain, with pooled connections and bounded
 *   retries
 * - 🔑 **Deterministic Identities**: content-addressed integer ids for
 *   records and filenames, stable across runs, field order, and machines
 * - 🧮 **Normalized Filters**: NPI and billing-code filter files load
 *   into value-equality lookup sets under two explicit policies
 * - 🛡️ **Fault-Isolated Batches**: one worker per filter-file job; a
 *   failing job is a counted outcome, never a batch abort
 *
 * ## Quick Start
 *
 * ```no_run
 * use mrf::prelude::*;
 * use std::path::PathBuf;
 *
 * # fn main() -> mrf::Result<()> {
 * // One MRF source, one job per NPI filter file
 * let source = SourceLocation::parse(
 *     "https://example.com/mrf/2026-08_in-network-rates.json.gz",
 * )?;
 *
 * let jobs: Vec<Job> = ["north_clinics", "south_clinics"]
 *     .iter()
 *     .map(|name| {
 *         Job::new(
 *             PathBuf::from(format!("filters/{name}.csv")),
 *             source.clone(),
 *             PathBuf::from("csv_output").join(name),
 *         )
 *     })
 *     .collect();
 *
 * let code_filter = FilterSet::from_csv("filters/codes.csv")?;
 *
 * let result = JobOrchestrator::new()
 *     .with_logs_dir("logs")
 *     .run(&jobs, Some(&code_filter), &DrainFlattener);
 *
 * println!("batch finished: {}", result);
 * # Ok(())
 * # }
 * ```
 *
 * ## Stable Record Identities
 *
 * ```
 * use serde_json::{Map, Value};
 *
 * let mut rate = Map::new();
 * rate.insert("npi".to_string(), Value::from(1234567890u64));
 * rate.insert("billing_code".to_string(), Value::from("99213"));
 *
 * // field order never matters; the id doubles as a join key
 * let id = mrf::identity::append_identity(&mut rate, "rate_hash").unwrap();
 * assert_eq!(rate.get("rate_hash"), Some(&Value::from(id)));
 *
 * // files sharing a stem share an id, whatever the extension
 * assert_eq!(
 *     mrf::identity::filename_identity("plan.json.gz").unwrap(),
 *     mrf::identity::filename_identity("plan.json").unwrap(),
 * );
 * ```
 *
 * ## Plugging In a Flattener
 *
 * Rate-structure traversal and the output row schema are the
 * [`Flattener`](batch::Flattener) implementor's concern. This crate
 * guarantees the collaborator a valid open stream, normalized filter
 * sets, and a writable output directory — nothing else.
 *
 * ## Configuration
 *
 * ```no_run
 * # use mrf::config::ConfigBuilder;
 * let config = ConfigBuilder::new()
 *     .retry_attempts(5)
 *     .retry_backoff_ms(250)
 *     .worker_threads(Some(8))
 *     .build();
 * mrf::config::set_global_config(config);
 * ```
 */

// Re-export error types from root
pub use error::{MrfError, Result};

// Public modules
pub mod batch;
pub mod config;
pub mod error;
pub mod filter;
pub mod identity;
pub mod source;

/// Prelude module for convenient imports
///
/// Import everything you need with:
/// ```
/// use mrf::prelude::*;
/// ```
pub mod prelude {
    pub use crate::batch::{
        concurrency_for, default_concurrency, BatchResult, DrainFlattener, Flattener, Job,
        JobOrchestrator,
    };
    pub use crate::config::{ConfigBuilder, MrfConfig};
    pub use crate::error::{MrfError, Result};
    pub use crate::filter::{FilterKey, FilterSet};
    pub use crate::identity::{
        append_identity, filename_identity, record_identity, record_identity_with_width,
    };
    pub use crate::source::{SourceFormat, SourceLocation, SourceStream, StreamHandle};
}

/// MRF pipeline constants
pub mod constants {
    /// Read-ahead buffer for local file and plain remote streams
    pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

    /// Remote open attempts before a connection error surfaces
    pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

    /// Sleep between remote open attempts, in milliseconds
    pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

    /// HTTP connection pool size, sized for high fan-out batches
    pub const DEFAULT_POOL_MAX_CONNECTIONS: usize = 100;

    /// Digest bytes folded into a record identity
    pub const DEFAULT_IDENTITY_WIDTH: usize = 8;

    /// Upper bound on identity width (identities are u64 join keys)
    pub const MAX_IDENTITY_WIDTH: usize = 8;

    /// Default per-job log directory
    pub const DEFAULT_LOGS_DIR: &str = "logs";

    /// Default batch output directory
    pub const DEFAULT_OUT_DIR: &str = "csv_output";
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;

    #[test]
    fn test_prelude_exposes_core_types() {
        let location = SourceLocation::parse("plan.json").unwrap();
        assert!(!location.is_remote());
        assert_eq!(location.format().unwrap(), SourceFormat::Json);

        let set = FilterSet::default();
        assert!(set.is_empty());
    }

    #[test]
    fn test_identity_determinism_across_calls() {
        let a = filename_identity("2026-08_plan_rates.json.gz").unwrap();
        let b = filename_identity("2026-08_plan_rates.json.gz").unwrap();
        assert_eq!(a, b);
    }
}
