use std::path::PathBuf;
use std::process::ExitCode;

use amdl::config::AppConfig;
use amdl::logging::{self, LOG_RETENTION_DAYS};
use amdl::{SongCodec, UserContext};
use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::future::join_all;
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, args_conflicts_with_subcommands = true)]
struct Args {
    /// Catalog URLs (song, album with `?i=`, or collection) to acquire
    urls: Vec<String>,

    /// Config file; defaults to `<config dir>/amdl/config.toml`
    #[arg(short, long, env = "AMDL_CONFIG")]
    config: Option<PathBuf>,

    /// Codec preference (see `amdl codecs`)
    #[arg(long)]
    codec: Option<SongCodec>,

    /// Output root directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Maximum acquisitions running at once
    #[arg(short = 'j', long)]
    max_concurrent: Option<usize>,

    /// Identifier attached to log lines of each acquisition
    #[arg(long, default_value = "cli", env = "AMDL_USER")]
    user: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the supported codecs
    Codecs,
}

fn print_codecs() {
    println!("{:<15} {:<22} {:<8} DESCRIPTION", "CODEC", "FLAVOR", "FAMILY");
    for codec in SongCodec::ALL {
        println!(
            "{:<15} {:<22} {:<8} {}",
            codec.as_str(),
            codec.flavor(),
            format!("{:?}", codec.family()).to_lowercase(),
            codec.display_name()
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Some(Commands::Codecs) = args.command {
        print_codecs();
        return Ok(ExitCode::SUCCESS);
    }
    if args.urls.is_empty() {
        anyhow::bail!("no URLs given; run `amdl --help` for usage");
    }

    let mut config = AppConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(codec) = args.codec {
        config.codec = codec;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if let Some(max) = args.max_concurrent {
        config.max_concurrent = max;
    }
    config.validate().context("Invalid configuration")?;

    let _logging = logging::init_logging(&config.logging.dir, config.logging.filter.as_deref())
        .context("Failed to initialize logging")?;
    if let Err(e) = logging::cleanup_old_logs(&config.logging.dir, LOG_RETENTION_DAYS).await {
        warn!(error = %e, "Failed to cleanup old logs");
    }

    let service = amdl::build_service(&config)
        .await
        .context("Failed to set up the acquisition service")?;

    info!(count = args.urls.len(), codec = %config.codec, "Starting acquisitions");
    let user = UserContext::new(args.user);
    let results = join_all(
        args.urls
            .iter()
            .map(|url| service.acquire(url, user.clone())),
    )
    .await;

    let mut failed = 0usize;
    for (url, result) in args.urls.iter().zip(results) {
        match result {
            Ok(track) => {
                let note = if track.cache_hit { " (cached)" } else { "" };
                println!("{}{note}", track.path.display());
            }
            Err(e) => {
                failed += 1;
                eprintln!("{url}: {}", e.user_message());
            }
        }
    }

    if failed > 0 {
        warn!(failed, total = args.urls.len(), "Some acquisitions failed");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
