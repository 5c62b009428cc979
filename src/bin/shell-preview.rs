//! Render the shell for a tenant configuration from the command line.
//!
//! Prints what the host page would emit at the early and late injection
//! points, plus banner markup when the tenant shows banners.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shell_splice::{
    CacheConfig, FixedLocale, Localization, NoHooks, NoLocalization, ShellPipeline, TenantConfig,
};

#[derive(Parser, Debug)]
#[command(name = "shell-preview")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Tenant configuration: a JSON object of option names to values
    #[arg(short, long)]
    config: PathBuf,

    /// Current locale; enables locale-suffixed options and cache entries
    #[arg(short, long)]
    locale: Option<String>,

    /// Durable cache root
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Timeout for the remote shell API in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Use https for the remote shell API
    #[arg(long)]
    https: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = Args::parse();

    let raw = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading {}", args.config.display()))?;
    let tenant = TenantConfig::from_json(&raw)
        .with_context(|| format!("parsing {}", args.config.display()))?;

    let mut config = CacheConfig {
        fetch_timeout: Duration::from_millis(args.timeout_ms),
        ..CacheConfig::default()
    };
    if let Some(dir) = args.cache_dir {
        config.cache_dir = dir;
    }
    if args.https {
        config.scheme = "https".to_owned();
    }

    let pipeline = ShellPipeline::http(config).context("building HTTP client")?;
    let localization: Box<dyn Localization> = match args.locale {
        Some(locale) => Box::new(FixedLocale(locale)),
        None => Box::new(NoLocalization),
    };

    let ctx = pipeline.load(tenant, localization.as_ref()).await;
    if !ctx.is_available() {
        eprintln!("no shell available; the page would render without it");
    }

    println!("<!-- early injection -->");
    print!("{}", ctx.early_injection(&mut NoHooks));
    println!("<!-- late injection -->");
    print!("{}", ctx.late_injection());
    if ctx.show_banners()
        && let Some(banners) = ctx.banners()
    {
        println!("<!-- banners -->");
        println!("{}", banners);
    }

    Ok(())
}
