use crate::adapters::inbound::OutputFormat;
use crate::domain::ports::DEFAULT_CACHE_TTL;
use crate::domain::value_objects::ResolverKind;
use clap::Parser;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid resolver {0:?}: expected local, cloudflare, google or ip[:port]")]
    Resolver(String),
    #[error("invalid SEEIP_CACHE {0:?}: expected none, sqlite or lsm")]
    Cache(String),
    #[error("invalid SEEIP_OUTPUT {0:?}: expected yaml or json")]
    Output(String),
}

/// Which cache backend sits in front of the resumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheKind {
    #[default]
    None,
    Sqlite,
    Lsm,
}

impl CacheKind {
    pub fn default_path(self) -> &'static str {
        match self {
            Self::None | Self::Sqlite => "seeip.db",
            Self::Lsm => "seeip-cache",
        }
    }
}

impl FromStr for CacheKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" | "off" => Ok(Self::None),
            "sqlite" => Ok(Self::Sqlite),
            "lsm" | "fjall" => Ok(Self::Lsm),
            other => Err(ConfigError::Cache(other.to_string())),
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Sqlite => write!(f, "sqlite"),
            Self::Lsm => write!(f, "lsm"),
        }
    }
}

/// Command-line flags; each one given overrides its environment value.
#[derive(Parser, Debug, Default)]
#[command(name = "seeip")]
#[command(author, version, about = "Resolve host names and geolocate their addresses", long_about = None)]
pub struct Args {
    /// Search ip address or domain (repeatable or comma-separated)
    #[arg(short = 'a', long = "addr", env = "SEEIP_ADDRS", value_delimiter = ',')]
    pub addrs: Vec<String>,

    /// More names to search
    #[arg(value_name = "NAME")]
    pub names: Vec<String>,

    /// Resolver service name (local, cloudflare, google) or DNS server address
    #[arg(short = 'r', long = "reslov", visible_alias = "resolver", env = "SEEIP_RESOLVER")]
    pub resolver: Option<String>,

    /// JSON object output
    #[arg(short = 'j', long)]
    pub json: bool,

    /// Formatted JSON output
    #[arg(short = 'f', long = "format")]
    pub pretty: bool,

    /// Process worker count
    #[arg(short = 'w', long, allow_negative_numbers = true)]
    pub workers: Option<i64>,

    /// Attach map location links to every geolocated address
    #[arg(short = 'g', long = "geo")]
    pub geo_links: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    // Input
    pub addrs: Vec<String>,

    // Resolution
    pub resolver: ResolverKind,
    pub workers: i64,
    pub available_parallelism: usize,
    pub timeout_secs: u64,
    pub batch_timeout_secs: Option<u64>,

    // Enrichment
    pub geo_api_url: String,
    pub cache: CacheKind,
    pub cache_path: String,
    pub cache_ttl_secs: u64,
    pub geo_links: bool,

    // Output
    pub output: OutputFormat,
    pub pretty: bool,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        let available_parallelism = available_parallelism();
        Self {
            addrs: Vec::new(),
            resolver: ResolverKind::Local,
            workers: available_parallelism as i64,
            available_parallelism,
            timeout_secs: 5,
            batch_timeout_secs: None,
            geo_api_url: "http://ip-api.com".to_string(),
            cache: CacheKind::None,
            cache_path: CacheKind::None.default_path().to_string(),
            cache_ttl_secs: DEFAULT_CACHE_TTL.as_secs(),
            geo_links: false,
            output: OutputFormat::Yaml,
            pretty: false,
            debug: false,
        }
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn flag(value: Option<String>) -> bool {
    value
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

impl Config {
    /// Apply command-line flags on top of the environment configuration.
    pub fn with_args(mut self, args: Args) -> Result<Self, ConfigError> {
        let flagged: Vec<String> = args
            .addrs
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !flagged.is_empty() {
            self.addrs = flagged;
        }
        self.addrs.extend(args.names);

        if let Some(resolver) = args.resolver {
            self.resolver = resolver
                .parse()
                .map_err(|_| ConfigError::Resolver(resolver))?;
        }
        if args.json {
            self.output = OutputFormat::Json;
        }
        self.pretty |= args.pretty;
        self.geo_links |= args.geo_links;
        if let Some(workers) = args.workers {
            self.workers = workers;
        }
        Ok(self)
    }
}

/// Load from the environment, then apply the command line.
pub fn load_config() -> anyhow::Result<Config> {
    let args = Args::parse();
    Ok(load_config_from(|key| std::env::var(key).ok())?.with_args(args)?)
}

/// Build the configuration from any key lookup (the environment in
/// production, a map in tests).
pub fn load_config_from<F>(var: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();

    let addrs = var("SEEIP_ADDRS")
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let resolver = match var("SEEIP_RESOLVER") {
        Some(v) => v.parse().map_err(|_| ConfigError::Resolver(v))?,
        None => defaults.resolver,
    };

    let workers = var("SEEIP_WORKERS")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(defaults.workers);

    let timeout_secs = var("SEEIP_TIMEOUT_SECS")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(defaults.timeout_secs);

    let batch_timeout_secs = var("SEEIP_BATCH_TIMEOUT_SECS")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0);

    let geo_api_url = var("SEEIP_GEO_API_URL").unwrap_or(defaults.geo_api_url);

    let cache = match var("SEEIP_CACHE") {
        Some(v) => v.parse()?,
        None => defaults.cache,
    };

    let cache_path = var("SEEIP_CACHE_PATH").unwrap_or_else(|| cache.default_path().to_string());

    let cache_ttl_secs = var("SEEIP_CACHE_TTL_SECS")
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(defaults.cache_ttl_secs);

    let geo_links = flag(var("SEEIP_GEO_LINKS"));

    let output = match var("SEEIP_OUTPUT") {
        Some(v) => v.parse().map_err(ConfigError::Output)?,
        None => defaults.output,
    };

    let pretty = flag(var("SEEIP_PRETTY"));

    let debug = var("DEBUG").is_some();

    Ok(Config {
        addrs,
        resolver,
        workers,
        available_parallelism: defaults.available_parallelism,
        timeout_secs,
        batch_timeout_secs,
        geo_api_url,
        cache,
        cache_path,
        cache_ttl_secs,
        geo_links,
        output,
        pretty,
        debug,
    })
}
