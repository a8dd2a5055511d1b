use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use proxy_pool::{
    Config, Error, GeoResolver, Harvester, PoolConfig, ProxyChecker, ProxyCrawler, ProxyDatabase,
    ProxyPool, RelaySelector,
};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// SOCKS5 relay harvester, validator and geo-aware pool
#[derive(Parser)]
#[command(name = "proxy-pool")]
#[command(about = "SOCKS5 relay harvester, validator and geo-aware pool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Database file path (overrides config file)
    #[arg(short, long)]
    database: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch candidates and rebuild the relay table
    Crawl {
        /// Insert candidates without checking them
        #[arg(long)]
        no_check: bool,
        /// Repeat the crawl at this interval (e.g. 30m)
        #[arg(long)]
        every: Option<humantime::Duration>,
        /// Probe timeout (e.g. 5s)
        #[arg(long)]
        timeout: Option<humantime::Duration>,
        /// Candidate list URL (overrides config file)
        #[arg(long)]
        source: Option<String>,
        /// Number of candidates probed together
        #[arg(short = 'n', long)]
        batch_size: Option<usize>,
    },
    /// Select a live relay and print its locale
    Pick {
        /// Give up after this many draws
        #[arg(long)]
        attempts: Option<u32>,
    },
    /// Resolve an IPv4 address to timezone, country and language
    Resolve {
        /// Dotted-quad address
        ip: String,
    },
    /// Show stored relay count and pool state
    Stats,
    /// Delete stored relays
    Reset {
        /// Also delete the IP range table
        #[arg(long)]
        geo: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    if let Some(database) = &cli.database {
        config.database_url = database.clone();
    }

    init_tracing(&cli, &config);

    if cli.config.exists() {
        info!(path = %cli.config.display(), "loaded configuration");
    } else {
        warn!(path = %cli.config.display(), "configuration file not found, using defaults");
    }

    match cli.command {
        Commands::Crawl {
            no_check,
            every,
            timeout,
            source,
            batch_size,
        } => {
            if let Some(timeout) = timeout {
                config.checker.timeout = timeout.into();
            }
            if let Some(source) = source {
                config.crawler.source_url = source;
            }
            if let Some(batch_size) = batch_size {
                config.validator.batch_size = batch_size;
            }
            config
                .validate_for_crawl()
                .context("Configuration validation failed")?;

            let db = open_database(&config).await?;
            let crawler = ProxyCrawler::with_config(config.crawler.clone())?;
            let checker = ProxyChecker::with_config(config.checker.clone());
            let harvester = Harvester::new(
                db,
                crawler,
                checker,
                config.validator.clone(),
                config.importer.clone(),
            )
            .with_progress(std::io::stderr().is_terminal());

            match every {
                Some(interval) => harvester.run_forever(no_check, interval.into()).await,
                None => {
                    if !harvester.crawl(no_check).await {
                        anyhow::bail!("Crawl aborted, see log for the cause");
                    }
                }
            }
        }
        Commands::Pick { attempts } => {
            if attempts.is_some() {
                config.selector.max_attempts = attempts;
            }
            config.validate().context("Configuration validation failed")?;

            let db = open_database(&config).await?;
            let pool = ProxyPool::new(db.clone(), config.pool.clone());
            let checker = ProxyChecker::with_config(config.checker.clone());
            let resolver = GeoResolver::new(db, config.geo.clone());
            let mut selector = RelaySelector::new(pool, checker, resolver, config.selector.clone());

            let selected = selector.select().await?;
            println!("Proxy:    {}", selected.proxy_url);
            println!("Origin:   {}", selected.origin_ip);
            println!(
                "Country:  {}",
                selected.country_code.as_deref().unwrap_or("unknown")
            );
            println!("Timezone: {:+} min", selected.timezone_offset);
            println!("Language: {}", selected.language);
        }
        Commands::Resolve { ip } => {
            let db = open_database(&config).await?;
            let resolver = GeoResolver::new(db, config.geo.clone());
            let info = resolver.resolve(&ip).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Stats => {
            let db = open_database(&config).await?;
            println!("Stored relays: {}", db.count_relays().await?);

            let pool_config = PoolConfig {
                max_reload_attempts: Some(1),
                ..config.pool.clone()
            };
            let mut pool = ProxyPool::new(db, pool_config);
            match pool.reload().await {
                Ok(_) => println!("{}", serde_json::to_string_pretty(&pool.stats())?),
                Err(Error::PoolUnderPopulated {
                    available, required, ..
                }) => println!("Pool unusable: {}/{} relays", available, required),
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Reset { geo } => {
            let db = open_database(&config).await?;
            db.truncate_relays().await?;
            println!("Relay table cleared");
            if geo {
                db.clear_geo_ranges().await?;
                println!("IP range table cleared");
            }
        }
    }

    Ok(())
}

async fn open_database(config: &Config) -> Result<ProxyDatabase> {
    info!(database = %config.database_url, "opening database");
    ProxyDatabase::connect(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))
}

fn init_tracing(cli: &Cli, config: &Config) {
    let log_level = if cli.verbose {
        "debug"
    } else {
        cli.log_level.as_deref().unwrap_or(&config.log_level)
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(env_filter)
        .init();
}
