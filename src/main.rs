//! dirhound - concurrent web path discovery CLI

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dirhound::config::{self, CliOverrides};
use dirhound::controller::pause::StdinPrompt;
use dirhound::controller::{Console, Controller, ScanOutcome};
use dirhound::http::{AuthConfig, HttpConnector};
use dirhound::models::{OutputFormat, ScanConfig};
use dirhound::output::Output;
use dirhound::session::SessionSnapshot;

/// dirhound - Web path and directory discovery
#[derive(Parser)]
#[command(name = "dirhound", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[allow(clippy::large_enum_variant)]
enum Commands {
    /// Scan one or more targets with a wordlist
    Scan(ScanArgs),

    /// Resume a scan from a saved session file
    Resume {
        /// Session file written from the pause menu
        session: PathBuf,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Target URL (repeat for several targets)
    #[arg(short, long = "url", required = true)]
    urls: Vec<String>,

    /// Wordlist files (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    wordlists: Vec<String>,

    /// Extensions substituted for %EXT% (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    extensions: Option<Vec<String>>,

    /// Number of concurrent threads
    #[arg(short, long)]
    threads: Option<usize>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Retries per request on connection failure
    #[arg(long)]
    max_retries: Option<u32>,

    /// HTTP method
    #[arg(short = 'm', long)]
    http_method: Option<String>,

    /// Request body
    #[arg(short, long)]
    data: Option<String>,

    /// Custom headers (format: "Key: Value")
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    #[arg(long)]
    user_agent: Option<String>,

    #[arg(long)]
    cookie: Option<String>,

    /// File with user agents, one picked at random per request
    #[arg(long)]
    random_agents: Option<String>,

    /// HTTP/SOCKS proxy URL
    #[arg(long)]
    proxy: Option<String>,

    /// Proxy that every found path is replayed through
    #[arg(long)]
    replay_proxy: Option<String>,

    /// Connect to this IP instead of resolving the target host
    #[arg(long)]
    ip: Option<String>,

    /// Follow HTTP redirects
    #[arg(short = 'F', long)]
    follow_redirects: bool,

    /// Authentication type (none, basic, bearer, jwt, cookie)
    #[arg(long, default_value = "none")]
    auth_type: String,

    /// Credential for --auth-type (user:password, token or cookie string)
    #[arg(long)]
    auth: Option<String>,

    /// Delay between requests of each thread, in seconds
    #[arg(long)]
    delay: Option<f64>,

    /// Max requests per second
    #[arg(long)]
    max_rate: Option<u32>,

    /// Maximum runtime in seconds
    #[arg(long)]
    max_time: Option<u64>,

    /// Stop the whole scan on the first connection error
    #[arg(long)]
    exit_on_error: bool,

    /// Status codes to report (e.g. 200,300-399)
    #[arg(short, long)]
    include_status: Option<String>,

    /// Status codes to hide
    #[arg(short = 'x', long)]
    exclude_status: Option<String>,

    /// Skip the target when one of these status codes is seen
    #[arg(long)]
    skip_on_status: Option<String>,

    /// Response sizes to hide (e.g. 0B,4KB)
    #[arg(long, value_delimiter = ',')]
    exclude_sizes: Option<Vec<String>>,

    #[arg(long)]
    min_response_size: Option<usize>,

    #[arg(long)]
    max_response_size: Option<usize>,

    /// Hide responses containing these texts
    #[arg(long)]
    exclude_texts: Option<Vec<String>>,

    /// Hide responses whose body matches this regex
    #[arg(long)]
    exclude_regex: Option<String>,

    /// Hide redirects whose target contains or matches this value
    #[arg(long)]
    exclude_redirect: Option<String>,

    /// Hide responses similar to the response of this path
    #[arg(long)]
    exclude_response: Option<String>,

    /// Scan found directories recursively
    #[arg(short, long)]
    recursive: bool,

    /// Recurse into every level of a found path
    #[arg(long)]
    deep_recursive: bool,

    /// Recurse into every found path, directory or not
    #[arg(long)]
    force_recursive: bool,

    /// Maximum recursion depth (0 = unlimited)
    #[arg(short = 'R', long)]
    max_recursion_depth: Option<usize>,

    /// Status codes that trigger recursion
    #[arg(long)]
    recursion_status: Option<String>,

    /// Subdirectories never recursed into (comma-separated)
    #[arg(long, value_delimiter = ',')]
    exclude_subdirs: Option<Vec<String>>,

    /// Subdirectories scanned first (comma-separated)
    #[arg(long, value_delimiter = ',')]
    subdirs: Option<Vec<String>>,

    /// Print full URLs in results
    #[arg(long)]
    full_url: bool,

    /// Report file
    #[arg(short, long)]
    output: Option<String>,

    /// Report format (plain, simple, json, jsonl, csv)
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Directory for automatically saved reports
    #[arg(long)]
    output_location: Option<String>,

    /// Do not save reports automatically
    #[arg(long)]
    no_autosave: bool,

    /// Audit log file
    #[arg(long)]
    log: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl ScanArgs {
    fn overrides(self) -> Result<CliOverrides, String> {
        let auth = match AuthConfig::from_cli(&self.auth_type, self.auth)? {
            AuthConfig::None => None,
            auth => Some(auth),
        };

        Ok(CliOverrides {
            urls: self.urls,
            wordlists: self.wordlists,
            extensions: self.extensions,
            threads: self.threads,
            timeout_secs: self.timeout,
            max_retries: self.max_retries,
            http_method: self.http_method,
            data: self.data,
            headers: self.headers,
            user_agent: self.user_agent,
            cookie: self.cookie,
            random_agents_file: self.random_agents,
            proxy: self.proxy,
            replay_proxy: self.replay_proxy,
            ip: self.ip,
            follow_redirects: self.follow_redirects,
            auth,
            delay_secs: self.delay,
            max_rate: self.max_rate,
            max_time_secs: self.max_time,
            exit_on_error: self.exit_on_error,
            include_status: self.include_status,
            exclude_status: self.exclude_status,
            skip_on_status: self.skip_on_status,
            exclude_sizes: self.exclude_sizes,
            minimum_response_size: self.min_response_size,
            maximum_response_size: self.max_response_size,
            exclude_texts: self.exclude_texts,
            exclude_regex: self.exclude_regex,
            exclude_redirect: self.exclude_redirect,
            exclude_response: self.exclude_response,
            recursive: self.recursive,
            deep_recursive: self.deep_recursive,
            force_recursive: self.force_recursive,
            recursion_depth: self.max_recursion_depth,
            recursion_status: self.recursion_status,
            exclude_subdirs: self.exclude_subdirs,
            scan_subdirs: self.subdirs,
            full_url: self.full_url,
            output_file: self.output,
            output_format: self.format,
            output_location: self.output_location,
            no_autosave: self.no_autosave,
            log_file: self.log,
        })
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "dirhound=debug"
    } else {
        "dirhound=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();
}

/// Forwards every CTRL+C to the controller; presses made while one is
/// pending are dropped
fn forward_interrupts() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl+c: {e}");
                return;
            }
            if tx.is_closed() {
                return;
            }
            let _ = tx.try_send(());
        }
    });
    rx
}

fn load_scan_config(path: Option<&Path>) -> dirhound::error::Result<ScanConfig> {
    match path {
        Some(path) => config::load_config(path),
        None => {
            let default_path = Path::new("config/default.toml");
            if default_path.exists() {
                config::load_config(default_path)
            } else {
                Ok(ScanConfig::default())
            }
        }
    }
}

async fn run(controller: dirhound::error::Result<Controller>, output: &Output) {
    let mut controller = match controller {
        Ok(controller) => controller,
        Err(e) => {
            output.error(&e.to_string());
            std::process::exit(1);
        }
    };

    match controller.run().await {
        Ok(ScanOutcome::Completed) => info!("Scan completed in {:.1?}", controller.elapsed()),
        Ok(ScanOutcome::Aborted(reason)) => info!("Scan stopped: {reason}"),
        Err(e) => {
            output.error(&e.to_string());
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan(args) => {
            init_tracing(args.verbose);

            let mut scan_config = load_scan_config(args.config.as_deref())?;
            let overrides = args.overrides().unwrap_or_else(|e| {
                eprintln!("  {} {e}", "Error:".red().bold());
                std::process::exit(1);
            });
            config::merge_cli_args(&mut scan_config, overrides)?;

            let output = Arc::new(Output::new());
            let console = Console {
                output: Arc::clone(&output),
                interrupts: forward_interrupts(),
                prompt: Box::new(StdinPrompt::new()),
            };
            let controller = Controller::new(scan_config, Arc::new(HttpConnector), console);
            run(controller, &output).await;
        }

        Commands::Resume { session, verbose } => {
            init_tracing(verbose);

            let snapshot = SessionSnapshot::load(&session)?;
            let output = Arc::new(Output::new());
            let console = Console {
                output: Arc::clone(&output),
                interrupts: forward_interrupts(),
                prompt: Box::new(StdinPrompt::new()),
            };
            let controller = Controller::from_session(snapshot, Arc::new(HttpConnector), console);
            run(controller, &output).await;
        }
    }

    Ok(())
}
