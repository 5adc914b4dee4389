//! # Main — CLI Entry Point
//!
//! Routes CLI subcommands to the factorization job engine and the dashboard
//! server. Handles shared concerns: database connection, checkpoint
//! directory, external-tool configuration, and Rayon thread pool setup.
//!
//! ## Subcommands
//!
//! - `factor`: submit one job and run it to completion synchronously,
//!   printing progress to stderr and the final job record to stdout.
//! - `dashboard`: start the HTTP/WebSocket job server.
//! - `verify`: independently re-check the primality certificates recorded
//!   against a job's results.
//!
//! ## Global Options
//!
//! - `--database-url` / `DATABASE_URL`: PostgreSQL connection for job state.
//! - `--checkpoint`: directory for resumable job checkpoints.
//! - `--external-gnfs-min-digits` / `--external-gnfs-path`: external GNFS
//!   tool configuration, mirroring the upstream PRST/PFGW "configured path,
//!   else search PATH, else unavailable" convention.
//! - `--qos`: macOS QoS P-core scheduling via `pthread_set_qos_class_self_np`.
//! - `--threads`: Rayon thread pool size (0 = all cores).

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "trurl-factor", about = "Orchestrate multi-stage integer factorization jobs")]
struct Cli {
    /// PostgreSQL connection URL (or set DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Directory for job checkpoint files, written on pause
    #[arg(long, default_value = "checkpoints", env = "CHECKPOINT_DIR")]
    checkpoint: PathBuf,

    /// Minimum digit count to hand a cofactor off to the external GNFS tool (0 to disable)
    #[arg(long, default_value_t = 200)]
    external_gnfs_min_digits: u64,

    /// Path to the external GNFS driver binary (auto-detected from PATH if not set)
    #[arg(long)]
    external_gnfs_path: Option<PathBuf>,

    /// Set macOS QoS class to user-initiated for rayon threads (P-core scheduling on Apple Silicon)
    #[arg(long)]
    qos: bool,

    /// Number of rayon worker threads (defaults to all logical cores)
    #[arg(long)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a factorization job and run it to completion against stdout
    Factor {
        /// Decimal integer to factor
        n: String,
        /// Lower bound for a range-scan job (requires --hi)
        #[arg(long, requires = "hi")]
        lo: Option<String>,
        /// Upper bound for a range-scan job (requires --lo)
        #[arg(long, requires = "lo")]
        hi: Option<String>,
        /// Skip straight to the equation-guided prime sieve stage
        #[arg(long)]
        use_equation: bool,
    },
    /// Launch the job dashboard (HTTP + WebSocket)
    Dashboard {
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
        /// Directory for CSV uploads
        #[arg(long, default_value = "uploads", env = "UPLOAD_DIR")]
        upload_dir: PathBuf,
        /// Directory to serve static files from (e.g. a built frontend)
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
    /// Independently re-verify the certificates recorded for a job
    Verify {
        /// Job ID whose results should be checked
        job_id: i64,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize structured logging: LOG_FORMAT=json for K8s, human-readable otherwise
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt().json().with_target(false).init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();

    trurl_factor::external_gnfs::init(
        cli.external_gnfs_min_digits,
        cli.external_gnfs_path.clone(),
        std::time::Duration::from_secs(3600),
    );
    cli::configure_rayon(cli.threads, cli.qos);

    match &cli.command {
        Commands::Factor { n, lo, hi, use_equation } => {
            cli::run_factor(&cli, n, lo.as_deref(), hi.as_deref(), *use_equation)
        }
        Commands::Dashboard { port, upload_dir, static_dir } => {
            cli::run_dashboard(&cli, *port, upload_dir, static_dir.as_deref())
        }
        Commands::Verify { job_id } => cli::run_verify_job(&cli, *job_id),
    }
}
