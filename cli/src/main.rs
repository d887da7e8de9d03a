use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser};
use mfetch_core::config::{EngineConfig, DEFAULT_CHUNK_SIZE};
use mfetch_core::{Attributes, CancelToken, CoreError, DownloadEngine, Verification};
use tracing::{debug, error, info};
use url::Url;

mod render;

use render::{format_bytes, IndicatifRenderer};

#[derive(Parser, Debug)]
#[command(
    name = "mfetch",
    version,
    about = "Download one file in parallel byte ranges from one or more mirrors"
)]
struct Args {
    /// Destination filename
    #[arg(long, default_value = "download.dat")]
    dest: PathBuf,

    /// Add a source URL for the download (repeatable)
    #[arg(long = "url", value_name = "URL", required = true, value_parser = parse_url)]
    urls: Vec<String>,

    /// Chunk size in bytes
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, value_parser = clap::value_parser!(u64).range(1..))]
    chunk_size: u64,

    /// Give up on a chunk after this many failed attempts (default: retry forever)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: Option<u32>,

    /// Directory for temporary .part files (default: next to the destination)
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    #[arg(long, default_value = "mfetch/0.1")]
    user_agent: String,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Print the final report as JSON instead of the progress bar
    #[arg(long)]
    json: bool,
}

fn parse_url(value: &str) -> Result<String, String> {
    let url = Url::parse(value).map_err(|err| format!("invalid URL {:?}: {}", value, err))?;
    match url.scheme() {
        "http" | "https" => Ok(value.to_string()),
        scheme => Err(format!("unsupported scheme {:?}", scheme)),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args);
    debug!(?args, "arguments parsed");

    let cancel = CancelToken::new();
    install_signal_handler(cancel.clone());

    match run(&args, cancel) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CoreError::Canceled) => {
            info!("interrupted, temporary files removed");
            ExitCode::from(130)
        }
        Err(err @ CoreError::ChecksumMismatch { .. }) => {
            error!("Download failed; {}", err);
            error!(dest = %args.dest.display(), "merged file kept for inspection");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(args: &Args) {
    // RUST_LOG wins over -v/-q.
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn install_signal_handler(cancel: CancelToken) {
    let result = ctrlc::set_handler(move || {
        if cancel.is_canceled() {
            // Second interrupt: stop waiting for in-flight requests.
            std::process::exit(130);
        }
        cancel.cancel();
    });
    if let Err(err) = result {
        error!("could not install interrupt handler: {}", err);
    }
}

fn run(args: &Args, cancel: CancelToken) -> Result<(), CoreError> {
    let config = EngineConfig {
        chunk_size: args.chunk_size,
        user_agent: args.user_agent.clone(),
        connect_timeout: Duration::from_secs(args.connect_timeout),
        max_attempts: args.max_attempts,
        temp_dir: args.temp_dir.clone(),
        ..EngineConfig::default()
    };
    let engine = DownloadEngine::new(config)?.with_cancel_token(cancel);

    let attributes = engine.resolve(&args.urls)?;
    if attributes.connections.is_empty() {
        return Err(CoreError::NoSources);
    }
    if !args.json {
        display_file_info(&attributes);
    }

    let mut renderer = IndicatifRenderer::new(attributes.size, args.json || args.quiet);
    if args.quiet {
        renderer = renderer.silent();
    }
    let report = engine.download(&attributes, &args.dest, renderer)?;

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(err) => error!("could not encode report: {}", err),
        }
        return Ok(());
    }

    for source in &report.sources {
        println!("{}: {}", source.url, format_bytes(source.bytes));
    }
    match &report.verification {
        Verification::Verified { .. } => println!("Checksum passed. Download successful!"),
        Verification::Unverified => println!(
            "Download complete, but no checksum was available: integrity is unverified."
        ),
    }
    Ok(())
}

fn display_file_info(attributes: &Attributes) {
    println!("=============== File Information ==============");
    println!("File size: {}", attributes.size);
    println!(
        "Checksum: {}",
        attributes.checksum.as_deref().unwrap_or("(unavailable)")
    );
    println!("Connections: {}", attributes.connections.len());
    println!("===============================================");
}
