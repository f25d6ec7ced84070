//! seeip - host and IP intelligence from the command line
//!
//! This is the composition root that wires together all the components.

use seeip::adapters::inbound::ReportWriter;
use seeip::adapters::outbound::{
    CloudflareResolver, GoogleResolver, IpApiResumer, LocalResolver, LsmIpStorage,
    RemoteResolver, SqliteIpStorage,
};
use seeip::{
    load_config, BatchContext, CacheKind, Config, IpInfoStorage, ResolveService, Resolver,
    ResolverKind,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment and command line
    let cfg = load_config()?;

    // Setup logging; stdout carries only the report
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "starting seeip resolver={} cache={} workers={} names={}",
        cfg.resolver,
        cfg.cache,
        cfg.workers,
        cfg.addrs.len()
    );

    // ===== COMPOSITION ROOT =====

    // 1. Create outbound adapters
    let timeout = Duration::from_secs(cfg.timeout_secs);

    let resolver: Arc<dyn Resolver> = match cfg.resolver {
        ResolverKind::Local => Arc::new(LocalResolver::new(timeout)),
        ResolverKind::Cloudflare => Arc::new(CloudflareResolver::new(timeout)?),
        ResolverKind::Google => Arc::new(GoogleResolver::new(timeout)?),
        ResolverKind::Remote(server) => Arc::new(RemoteResolver::new(server, timeout)),
    };

    let resumer = Arc::new(IpApiResumer::new(cfg.geo_api_url.clone(), timeout)?);

    let storage = open_storage(&cfg);

    // 2. Create application service
    let service = ResolveService::new(
        resolver,
        resumer,
        storage,
        cfg.workers,
        cfg.available_parallelism,
    )
    .with_map_links(cfg.geo_links);

    tracing::debug!(
        "resolving via {} with {} workers",
        service.resolver_name(),
        service.workers()
    );

    // 3. Batch context: Ctrl-C and the optional deadline cancel it
    let ctx = BatchContext::new();
    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling batch");
                ctx.cancel();
            }
        });
    }
    if let Some(secs) = cfg.batch_timeout_secs {
        ctx.cancel_after(Duration::from_secs(secs));
    }

    // 4. Run and print
    let reports = service.lookup(&ctx, &cfg.addrs).await?;
    let rendered = ReportWriter::new(cfg.output, cfg.pretty).render(&reports)?;
    std::io::stdout().lock().write_all(rendered.as_bytes())?;

    Ok(())
}

/// Open the configured cache. A cache that cannot be opened is skipped.
fn open_storage(cfg: &Config) -> Option<Arc<dyn IpInfoStorage>> {
    let ttl = Duration::from_secs(cfg.cache_ttl_secs);
    let opened: Result<Arc<dyn IpInfoStorage>, _> = match cfg.cache {
        CacheKind::None => return None,
        CacheKind::Sqlite => {
            SqliteIpStorage::open(&cfg.cache_path, ttl).map(|s| Arc::new(s) as Arc<dyn IpInfoStorage>)
        }
        CacheKind::Lsm => {
            LsmIpStorage::open(&cfg.cache_path, ttl).map(|s| Arc::new(s) as Arc<dyn IpInfoStorage>)
        }
    };

    match opened {
        Ok(storage) => Some(storage),
        Err(e) => {
            tracing::error!(
                "failed to open {} cache at {}, continuing without cache: {}",
                cfg.cache,
                cfg.cache_path,
                e
            );
            None
        }
    }
}
