//! slipstream: batch runner and cache maintenance CLI

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use slipstream::config::{Config, Secrets};
use slipstream::{
    Dispatcher, MartianClient, OpenRouterClient, ProgressSink, RequestDescriptor, ResponseCache,
    SlipstreamError, UnitOutcome,
};

/// Slipstream batch runner
#[derive(Parser)]
#[command(name = "slipstream")]
#[command(version = slipstream::PKG_VERSION)]
#[command(about = "Cached, parallel LLM request runner")]
struct Args {
    /// Config file (default: ./slipstream.toml, then ~/.slipstream/config.toml)
    #[arg(short, long, env = "SLIPSTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Cache directory (overrides the config file)
    #[arg(long, env = "SLIPSTREAM_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dispatch a JSON Lines file of request descriptors
    Run {
        /// Input file, one descriptor per line
        #[arg(short, long)]
        input: PathBuf,
        /// Write the full batch report as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Units in flight (overrides the config file)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Inspect or clear the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// List models offered by a provider
    Models {
        #[arg(short, long, value_enum, default_value_t = Provider::Openrouter)]
        provider: Provider,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete cached responses
    Clear {
        /// Only entries whose digest starts with, or whose run tag or
        /// model contains, this string
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Count cached responses
    Count,
}

#[derive(Clone, Copy, ValueEnum)]
enum Provider {
    Openrouter,
    Martian,
}

/// Progress bar driven by dispatcher callbacks.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}] {msg}")
        {
            bar.set_style(style);
        }
        Self { bar }
    }
}

impl ProgressSink for BarProgress {
    fn advance(&self, completed: usize, _total: usize) {
        self.bar.set_position(completed as u64);
    }

    fn finish(&self, filled: usize, absent: usize) {
        self.bar
            .finish_with_message(format!("{filled} filled, {absent} absent"));
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // A missing .env is fine; keys may already be in the environment.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(dir) = args.cache_dir {
        config.cache.dir = dir;
    }

    match args.command {
        Command::Run {
            input,
            output,
            workers,
        } => run(&config, &input, output, workers).await?,

        Command::Cache { action } => {
            let cache = ResponseCache::open(&config.cache_config()).await?;
            match action {
                CacheAction::Clear { filter } => {
                    let removed = cache.clear(filter.as_deref()).await?;
                    println!("removed {removed} entries from {}", cache.dir().display());
                }
                CacheAction::Count => {
                    println!("{}", cache.len().await?);
                }
            }
        }

        Command::Models { provider } => {
            let secrets = Secrets::load()?;
            match provider {
                Provider::Openrouter => {
                    let key = secrets
                        .api_key("openrouter")
                        .ok_or(SlipstreamError::NoProvider)?;
                    let client = OpenRouterClient::with_options(key, &config.openrouter_options())?;
                    for model in client.list_models_or_default().await {
                        let pricing = model
                            .pricing
                            .as_ref()
                            .map(|p| {
                                format!(
                                    "prompt {} / completion {}",
                                    p.prompt.as_deref().unwrap_or("?"),
                                    p.completion.as_deref().unwrap_or("?")
                                )
                            })
                            .unwrap_or_default();
                        println!("{:<50} {}", model.id, pricing);
                    }
                }
                Provider::Martian => {
                    let key = secrets
                        .api_key("martian")
                        .ok_or(SlipstreamError::NoProvider)?;
                    let client = MartianClient::with_base_url(
                        key,
                        &config.martian_base_url(),
                        config.request_timeout(),
                    )?;
                    for id in client.list_models().await? {
                        println!("{id}");
                    }
                }
            }
        }
    }

    Ok(())
}

async fn run(
    config: &Config,
    input: &Path,
    output: Option<PathBuf>,
    workers: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let descriptors = read_descriptors(input)?;
    let clients = config.build_clients(&Secrets::load()?)?;
    let cache = ResponseCache::open(&config.cache_config()).await?;

    let mut builder = Dispatcher::builder()
        .cache(Arc::new(cache))
        .workers(workers.unwrap_or(config.dispatch.workers))
        .retry(config.retry_config());
    let default_available = clients
        .iter()
        .any(|c| c.name() == config.dispatch.default_provider);
    for client in clients {
        builder = builder.client(client);
    }
    if default_available {
        builder = builder.default_provider(&config.dispatch.default_provider);
    }
    let dispatcher = builder.build()?;

    let progress = BarProgress::new(descriptors.len());
    let outcome = dispatcher.dispatch(&descriptors, &progress).await;

    for slot in outcome.slots() {
        if let UnitOutcome::Failed {
            kind,
            message,
            attempts,
        } = &slot.outcome
        {
            eprintln!(
                "#{} failed ({kind:?}, {attempts} attempts): {message}",
                slot.index
            );
        }
    }

    if let Some(path) = output {
        std::fs::write(&path, serde_json::to_vec_pretty(&outcome)?)?;
        println!("report written to {}", path.display());
    }
    println!(
        "{} of {} filled, {} absent",
        outcome.filled(),
        outcome.len(),
        outcome.absent()
    );
    Ok(())
}

/// Parse one descriptor per non-blank line.
fn read_descriptors(path: &Path) -> Result<Vec<RequestDescriptor>, SlipstreamError> {
    let file = std::fs::File::open(path)?;
    let mut descriptors = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let descriptor = serde_json::from_str(&line).map_err(|e| {
            SlipstreamError::InvalidInput(format!("{}:{}: {e}", path.display(), n + 1))
        })?;
        descriptors.push(descriptor);
    }
    Ok(descriptors)
}
