use clap::{Args, Parser, Subcommand};
use mrf::prelude::*;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mrfcli")]
#[command(about = "MRF CLI - stream, filter, and identity-hash healthcare price-transparency files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch of NPI filter-file jobs against one MRF source
    Run(RunArgs),
    /// Compute the content identity of a filename or an inline JSON record
    Hash(HashArgs),
    /// Load a filter file under both policies and report what each yields
    Inspect(InspectArgs),
}

#[derive(Args)]
struct RunArgs {
    /// NPI filter files to process, one job each
    #[arg(short = 'n', long, num_args = 1..)]
    npi_files: Vec<PathBuf>,
    /// Directory of NPI filter files (every *.csv inside becomes a job)
    #[arg(long, conflicts_with = "npi_files")]
    npi_dir: Option<PathBuf>,
    /// Local MRF path (.json or .json.gz)
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Remote MRF URL
    #[arg(short, long, conflicts_with = "file")]
    url: Option<String>,
    /// Billing-code filter file (applied to every job)
    #[arg(short, long)]
    code_file: Option<PathBuf>,
    /// Base output directory (one subdirectory per filter file)
    #[arg(short, long, default_value = mrf::constants::DEFAULT_OUT_DIR)]
    out_dir: PathBuf,
    /// Directory for per-job log files
    #[arg(long, default_value = mrf::constants::DEFAULT_LOGS_DIR)]
    logs_dir: PathBuf,
    /// Worker count (defaults to available cores minus one)
    #[arg(short, long)]
    jobs: Option<usize>,
}

#[derive(Args)]
struct HashArgs {
    /// File name to reduce to its stem and hash
    #[arg(long, conflicts_with = "record")]
    filename: Option<String>,
    /// Inline JSON object to hash
    #[arg(long)]
    record: Option<String>,
    /// Digest bytes folded into the identity (1-8)
    #[arg(long, default_value_t = mrf::constants::DEFAULT_IDENTITY_WIDTH)]
    width: usize,
}

#[derive(Args)]
struct InspectArgs {
    /// Filter file to load
    #[arg(short, long)]
    filter_file: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Hash(args) => cmd_hash(args),
        Commands::Inspect(args) => cmd_inspect(args),
    }
}

fn cmd_run(args: RunArgs) {
    let filter_files = match collect_filter_files(&args) {
        Ok(files) => files,
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
    };

    let source = match resolve_source(&args) {
        Ok(source) => source,
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
    };

    let code_filter = match args.code_file {
        Some(path) => match FilterSet::from_csv(&path) {
            Ok(set) => Some(set),
            Err(e) => {
                eprintln!("Error loading code filter: {}", e.user_message());
                std::process::exit(1);
            }
        },
        None => None,
    };

    let jobs: Vec<Job> = filter_files
        .into_iter()
        .map(|filter_file| {
            let name = filter_file
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "job".to_string());
            Job::new(filter_file, source.clone(), args.out_dir.join(name))
        })
        .collect();

    let mut orchestrator = JobOrchestrator::from_config(&mrf::config::global_config())
        .with_logs_dir(&args.logs_dir);
    if let Some(workers) = args.jobs {
        orchestrator = orchestrator.with_concurrency(workers);
    }

    let result = orchestrator.run(&jobs, code_filter.as_ref(), &DrainFlattener);
    println!("Batch complete: {}", result);
}

fn collect_filter_files(args: &RunArgs) -> std::result::Result<Vec<PathBuf>, String> {
    let mut files = args.npi_files.clone();

    if let Some(dir) = &args.npi_dir {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| format!("Cannot read NPI directory '{}': {}", dir.display(), e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|ext| ext == "csv").unwrap_or(false) {
                files.push(path);
            }
        }
        files.sort();
    }

    if files.is_empty() {
        return Err("No NPI filter files given; use --npi-files or --npi-dir".to_string());
    }
    Ok(files)
}

fn resolve_source(args: &RunArgs) -> std::result::Result<SourceLocation, String> {
    let input = match (&args.file, &args.url) {
        (Some(file), None) => file.display().to_string(),
        (None, Some(url)) => url.clone(),
        _ => return Err("Provide exactly one MRF source via --file or --url".to_string()),
    };
    let location =
        SourceLocation::parse(&input).map_err(|e| format!("Invalid source: {}", e.user_message()))?;
    // surface a bad suffix before any jobs dispatch
    location
        .format()
        .map_err(|e| format!("Invalid source: {}", e.user_message()))?;
    Ok(location)
}

fn cmd_hash(args: HashArgs) {
    if let Some(filename) = args.filename {
        match filename_identity(&filename) {
            Ok(id) => println!("{}", id),
            Err(e) => {
                eprintln!("Hash error: {}", e.user_message());
                std::process::exit(1);
            }
        }
        return;
    }

    let Some(raw) = args.record else {
        eprintln!("Provide --filename or --record");
        std::process::exit(1);
    };

    let record: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(record) => record,
        Err(e) => {
            eprintln!("Record is not a JSON object: {}", e);
            std::process::exit(1);
        }
    };

    match record_identity_with_width(&record, args.width) {
        Ok(id) => println!("{}", id),
        Err(e) => {
            eprintln!("Hash error: {}", e.user_message());
            std::process::exit(1);
        }
    }
}

fn cmd_inspect(args: InspectArgs) {
    match FilterSet::from_csv(&args.filter_file) {
        Ok(set) => println!("permissive: {} entries", set.len()),
        Err(e) => {
            eprintln!("Error loading filter file: {}", e.user_message());
            std::process::exit(1);
        }
    }
    match FilterSet::from_npi_csv(&args.filter_file) {
        Ok(set) => println!("strict-npi: {} entries", set.len()),
        Err(e) => {
            eprintln!("Error loading filter file: {}", e.user_message());
            std::process::exit(1);
        }
    }
}
