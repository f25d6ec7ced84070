//! Resolve Service - Main application use case
//!
//! Runs a lookup batch: resolves every name through the active resolver,
//! enriches every distinct address through the cache and the resumer,
//! then correlates both by address identity.

use crate::domain::entities::{Report, ResolutionResult, ResumeAboutIP};
use crate::domain::errors::{BatchError, ResumeError};
use crate::domain::ports::{IpInfoStorage, Resolver, Resumer};
use crate::domain::services;
use crate::domain::value_objects::NameKind;
use crate::infrastructure::{clamp_workers, BatchContext, TicketPool};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::Instrument;

const CANCELLED: &str = "cancelled";
const INVALID_IPV4: &str = "invalid IPv4 literal";
const TASK_FAILED: &str = "lookup task failed";

/// Resolve service - main application use case.
///
/// Each stage (resolution, enrichment) gets its own ticket pool so that at
/// most `workers` tasks of that stage do I/O at the same time.
pub struct ResolveService {
    resolver: Arc<dyn Resolver>,
    resumer: Arc<dyn Resumer>,
    storage: Option<Arc<dyn IpInfoStorage>>,
    workers: usize,
    map_links: bool,
}

impl ResolveService {
    /// Create a new resolve service.
    ///
    /// `requested_workers` is clamped to `[1, available_parallelism]`.
    pub fn new(
        resolver: Arc<dyn Resolver>,
        resumer: Arc<dyn Resumer>,
        storage: Option<Arc<dyn IpInfoStorage>>,
        requested_workers: i64,
        available_parallelism: usize,
    ) -> Self {
        let workers = clamp_workers(requested_workers, available_parallelism);
        if workers as i64 != requested_workers {
            tracing::debug!("workers clamped from {} to {}", requested_workers, workers);
        }
        Self {
            resolver,
            resumer,
            storage,
            workers,
            map_links: false,
        }
    }

    /// Attach map links to every successful resume.
    pub fn with_map_links(mut self, enabled: bool) -> Self {
        self.map_links = enabled;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn resolver_name(&self) -> &'static str {
        self.resolver.provider()
    }

    /// Resolve addresses and name servers for every distinct name.
    ///
    /// Names are trimmed and deduplicated; blank names are dropped. The
    /// result has exactly one entry per remaining name.
    pub async fn resolve_dns(
        &self,
        ctx: &BatchContext,
        names: &[String],
    ) -> Result<HashMap<String, ResolutionResult>, BatchError> {
        if ctx.is_cancelled() {
            return Err(BatchError::Cancelled);
        }
        let names = normalize_names(names);
        if names.is_empty() {
            return Err(BatchError::EmptyInput);
        }

        let started = Instant::now();
        let pool = Arc::new(TicketPool::new(self.workers));
        let results: Arc<DashMap<String, ResolutionResult>> = Arc::new(DashMap::new());
        let mut tasks = JoinSet::new();

        for name in &names {
            let name = name.clone();
            let resolver = self.resolver.clone();
            let pool = pool.clone();
            let results = results.clone();
            let ctx = ctx.clone();

            let task = async move {
                let dispatched = Instant::now();
                let mut result = resolve_one(&ctx, resolver.as_ref(), &pool, &name).await;
                result.duration_ms = dispatched.elapsed().as_millis() as u64;
                results.insert(name, result);
            };
            tasks.spawn(task.in_current_span());
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("resolution task failed: {}", e);
            }
        }
        pool.close();

        let mut resolved: HashMap<String, ResolutionResult> = results
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        for name in names {
            resolved.entry(name).or_insert_with(|| ResolutionResult {
                ip_error: Some(TASK_FAILED.to_string()),
                ns_error: Some(TASK_FAILED.to_string()),
                ..ResolutionResult::default()
            });
        }

        let failed = resolved.values().filter(|r| r.is_total_failure()).count();
        tracing::info!(
            "resolved {} names ({} failed) via {} in {:?}",
            resolved.len(),
            failed,
            self.resolver.provider(),
            started.elapsed()
        );

        Ok(resolved)
    }

    /// Fetch geolocation metadata for every distinct address.
    ///
    /// A fresh cache entry is used when present; otherwise the resumer is
    /// called and its result written back. Cache failures are logged and
    /// never fail an item.
    pub async fn fetch_about_ip(
        &self,
        ctx: &BatchContext,
        ips: &[IpAddr],
    ) -> Result<Vec<ResumeAboutIP>, BatchError> {
        if ctx.is_cancelled() {
            return Err(BatchError::Cancelled);
        }

        let mut seen = HashSet::with_capacity(ips.len());
        let distinct: Vec<IpAddr> = ips.iter().copied().filter(|ip| seen.insert(*ip)).collect();
        if distinct.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let pool = Arc::new(TicketPool::new(self.workers));
        let results: Arc<Mutex<Vec<ResumeAboutIP>>> =
            Arc::new(Mutex::new(Vec::with_capacity(distinct.len())));
        let mut tasks = JoinSet::new();

        for ip in &distinct {
            let ip = *ip;
            let resumer = self.resumer.clone();
            let storage = self.storage.clone();
            let pool = pool.clone();
            let results = results.clone();
            let ctx = ctx.clone();
            let map_links = self.map_links;

            let task = async move {
                let mut resume = match pool.acquire_until_cancelled(&ctx).await {
                    Some(ticket) => {
                        let resume =
                            resume_one(&ctx, resumer.as_ref(), storage.as_deref(), ip).await;
                        ticket.release();
                        resume
                    }
                    None => ResumeAboutIP::failure(ip, CANCELLED),
                };
                if map_links {
                    resume.attach_map_links();
                }
                results.lock().push(resume);
            };
            tasks.spawn(task.in_current_span());
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("enrichment task failed: {}", e);
            }
        }
        pool.close();

        let mut resumes = std::mem::take(&mut *results.lock());
        let finished: HashSet<IpAddr> = resumes.iter().map(|r| r.request_ip).collect();
        for ip in distinct {
            if !finished.contains(&ip) {
                resumes.push(ResumeAboutIP::failure(ip, TASK_FAILED));
            }
        }
        resumes.sort_by_key(|r| r.request_ip);

        let cached = resumes.iter().filter(|r| r.from_cache).count();
        let failed = resumes.iter().filter(|r| r.error.is_some()).count();
        tracing::info!(
            "enriched {} addresses ({} cached, {} failed) in {:?}",
            resumes.len(),
            cached,
            failed,
            started.elapsed()
        );

        Ok(resumes)
    }

    /// Join resolution output with enrichment output by address.
    pub fn correlate(
        &self,
        resolutions: &HashMap<String, ResolutionResult>,
        resumes: &[ResumeAboutIP],
    ) -> HashMap<String, Report> {
        services::correlate(resolutions, resumes)
    }

    /// Run the whole pipeline for `names`.
    pub async fn lookup(
        &self,
        ctx: &BatchContext,
        names: &[String],
    ) -> Result<HashMap<String, Report>, BatchError> {
        let resolutions = self.resolve_dns(ctx, names).await?;

        let mut keys: Vec<&String> = resolutions.keys().collect();
        keys.sort();
        let ips: Vec<IpAddr> = keys
            .into_iter()
            .flat_map(|name| resolutions[name].ips.iter().copied())
            .collect();

        let resumes = if ctx.is_cancelled() {
            ips.iter()
                .map(|ip| ResumeAboutIP::failure(*ip, CANCELLED))
                .collect()
        } else {
            self.fetch_about_ip(ctx, &ips).await?
        };

        Ok(self.correlate(&resolutions, &resumes))
    }
}

/// Trim, drop blanks and deduplicate while keeping first-seen order.
fn normalize_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(names.len());
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty() && seen.insert(*name))
        .map(str::to_string)
        .collect()
}

async fn resolve_one(
    ctx: &BatchContext,
    resolver: &dyn Resolver,
    pool: &TicketPool,
    name: &str,
) -> ResolutionResult {
    match NameKind::classify(name) {
        NameKind::Ipv4Literal(Some(ip)) => ResolutionResult::literal(IpAddr::V4(ip)),
        NameKind::Ipv6Literal(ip) => ResolutionResult::literal(IpAddr::V6(ip)),
        NameKind::Ipv4Literal(None) => ResolutionResult {
            ip_error: Some(INVALID_IPV4.to_string()),
            ..ResolutionResult::default()
        },
        NameKind::Host => {
            let Some(ticket) = pool.acquire_until_cancelled(ctx).await else {
                return ResolutionResult {
                    ip_error: Some(CANCELLED.to_string()),
                    ns_error: Some(CANCELLED.to_string()),
                    ..ResolutionResult::default()
                };
            };

            tracing::debug!("resolving {} via {}", name, resolver.provider());
            let (ips, name_servers) =
                tokio::join!(resolver.resolve_ip(ctx, name), resolver.resolve_ns(ctx, name));
            ticket.release();

            let mut result = ResolutionResult::default();
            match ips {
                Ok(ips) => result.ips = ips,
                Err(e) => {
                    tracing::debug!("{}: address lookup failed: {}", name, e);
                    result.ip_error = Some(e.to_string());
                }
            }
            match name_servers {
                Ok(ns) => result.name_servers = ns,
                Err(e) => {
                    tracing::debug!("{}: name server lookup failed: {}", name, e);
                    result.ns_error = Some(e.to_string());
                }
            }
            result
        }
    }
}

async fn resume_one(
    ctx: &BatchContext,
    resumer: &dyn Resumer,
    storage: Option<&dyn IpInfoStorage>,
    ip: IpAddr,
) -> ResumeAboutIP {
    if let Some(storage) = storage {
        match storage.get(ctx, ip).await {
            Ok(Some(record)) => return ResumeAboutIP::success(ip, record, true),
            Ok(None) => {}
            Err(e) => tracing::warn!("cache read for {} failed, treating as miss: {}", ip, e),
        }
    }

    let record = match ctx.run(resumer.resume_ip(ip)).await {
        None => return ResumeAboutIP::failure(ip, ResumeError::Cancelled.to_string()),
        Some(Err(e)) => {
            tracing::debug!("resume for {} failed: {}", ip, e);
            return ResumeAboutIP::failure(ip, e.to_string());
        }
        Some(Ok(record)) => record,
    };

    if let Some(storage) = storage {
        if let Err(e) = storage.save(ctx, ip, &record).await {
            tracing::warn!("cache write for {} failed: {}", ip, e);
        }
    }

    ResumeAboutIP::success(ip, record, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::GeoRecord;
    use crate::domain::errors::{ResolveError, ResumeError, StorageError};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tracing_test::traced_test;

    // ===== Mock Implementations =====

    #[derive(Default)]
    struct MockResolver {
        addresses: HashMap<String, Vec<IpAddr>>,
        name_servers: HashMap<String, Vec<String>>,
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockResolver {
        fn with_host(mut self, name: &str, ips: &[&str], ns: &[&str]) -> Self {
            self.addresses.insert(
                name.to_string(),
                ips.iter().map(|s| s.parse().unwrap()).collect(),
            );
            self.name_servers
                .insert(name.to_string(), ns.iter().map(|s| s.to_string()).collect());
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl Resolver for MockResolver {
        fn provider(&self) -> &'static str {
            "mock"
        }

        async fn resolve_ip(&self, ctx: &BatchContext, name: &str) -> Result<Vec<IpAddr>, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let slept = ctx.run(tokio::time::sleep(self.delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            slept.ok_or(ResolveError::Cancelled)?;

            match self.addresses.get(name) {
                Some(ips) if !ips.is_empty() => Ok(ips.clone()),
                _ => Err(ResolveError::NoAddresses {
                    name: name.to_string(),
                }),
            }
        }

        async fn resolve_ns(&self, ctx: &BatchContext, name: &str) -> Result<Vec<String>, ResolveError> {
            ctx.run(tokio::time::sleep(self.delay))
                .await
                .ok_or(ResolveError::Cancelled)?;
            self.name_servers
                .get(name)
                .cloned()
                .ok_or(ResolveError::Upstream {
                    provider: "mock",
                    status: crate::domain::value_objects::DnsStatus::NXDOMAIN,
                })
        }
    }

    #[derive(Default)]
    struct MockResumer {
        calls: AtomicUsize,
        failing: Vec<IpAddr>,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl Resumer for MockResumer {
        async fn resume_ip(&self, ip: IpAddr) -> Result<GeoRecord, ResumeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&ip) {
                return Err(ResumeError::Upstream("private range".to_string()));
            }
            Ok(GeoRecord {
                status: "success".to_string(),
                country: format!("country-of-{ip}"),
                lat: 52.52,
                lon: 13.405,
                fetched_at: Utc::now(),
                ..GeoRecord::default()
            })
        }
    }

    #[derive(Default)]
    struct MockStorage {
        records: Mutex<HashMap<IpAddr, GeoRecord>>,
        broken: bool,
    }

    #[async_trait]
    impl IpInfoStorage for MockStorage {
        async fn get(&self, _ctx: &BatchContext, ip: IpAddr) -> Result<Option<GeoRecord>, StorageError> {
            if self.broken {
                return Err(StorageError::Codec(
                    serde_json::from_str::<GeoRecord>("not json").unwrap_err(),
                ));
            }
            Ok(self.records.lock().get(&ip).cloned())
        }

        async fn save(&self, _ctx: &BatchContext, ip: IpAddr, record: &GeoRecord) -> Result<(), StorageError> {
            if self.broken {
                return Err(StorageError::Cancelled);
            }
            self.records.lock().insert(ip, record.clone());
            Ok(())
        }
    }

    fn service(resolver: Arc<MockResolver>, workers: i64) -> ResolveService {
        ResolveService::new(resolver, Arc::new(MockResumer::default()), None, workers, 8)
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    // ===== resolve_dns Tests =====

    #[tokio::test]
    async fn test_one_result_per_distinct_name() {
        let resolver = Arc::new(
            MockResolver::default()
                .with_host("example.com", &["93.184.216.34"], &["a.iana-servers.net."])
                .with_host("example.org", &["93.184.215.14"], &["b.iana-servers.net."]),
        );
        let svc = service(resolver.clone(), 4);

        let results = svc
            .resolve_dns(
                &BatchContext::new(),
                &names(&["example.com", " example.com ", "", "example.org", "   "]),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results["example.com"].ips, vec![ip("93.184.216.34")]);
        assert_eq!(
            results["example.org"].name_servers,
            vec!["b.iana-servers.net.".to_string()]
        );
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ipv4_literal_skips_resolver() {
        let resolver = Arc::new(MockResolver::default());
        let svc = service(resolver.clone(), 2);

        let results = svc
            .resolve_dns(&BatchContext::new(), &names(&["8.8.8.8"]))
            .await
            .unwrap();

        let result = &results["8.8.8.8"];
        assert_eq!(result.ips, vec![ip("8.8.8.8")]);
        assert!(result.name_servers.is_empty());
        assert!(result.ip_error.is_none());
        assert!(result.ns_error.is_none());
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ipv6_literal_skips_resolver() {
        let resolver = Arc::new(MockResolver::default());
        let svc = service(resolver.clone(), 2);

        let results = svc
            .resolve_dns(&BatchContext::new(), &names(&["2001:4860:4860::8888"]))
            .await
            .unwrap();

        assert_eq!(
            results["2001:4860:4860::8888"].ips,
            vec![ip("2001:4860:4860::8888")]
        );
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_quad_is_flagged() {
        let resolver = Arc::new(MockResolver::default());
        let svc = service(resolver.clone(), 2);

        let results = svc
            .resolve_dns(&BatchContext::new(), &names(&["999.999.999.999"]))
            .await
            .unwrap();

        let result = &results["999.999.999.999"];
        assert!(result.ips.is_empty());
        assert_eq!(result.ip_error.as_deref(), Some("invalid IPv4 literal"));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_input_is_error() {
        let svc = service(Arc::new(MockResolver::default()), 2);
        let ctx = BatchContext::new();

        assert_eq!(svc.resolve_dns(&ctx, &[]).await, Err(BatchError::EmptyInput));
        assert_eq!(
            svc.resolve_dns(&ctx, &names(&["", "  "])).await,
            Err(BatchError::EmptyInput)
        );
    }

    #[tokio::test]
    async fn test_ip_failure_keeps_name_servers() {
        let resolver = Arc::new(MockResolver::default().with_host(
            "mail-only.example",
            &[],
            &["ns1.example.", "ns2.example."],
        ));
        let svc = service(resolver, 2);

        let results = svc
            .resolve_dns(&BatchContext::new(), &names(&["mail-only.example"]))
            .await
            .unwrap();

        let result = &results["mail-only.example"];
        assert!(result.ips.is_empty());
        assert!(result.ip_error.as_deref().is_some_and(|e| !e.is_empty()));
        assert_eq!(result.name_servers.len(), 2);
        assert!(result.ns_error.is_none());
    }

    #[tokio::test]
    async fn test_concurrency_bounded_by_workers() {
        let mut resolver = MockResolver::default().with_delay(Duration::from_millis(20));
        let hosts: Vec<String> = (0..12).map(|i| format!("host{i}.example")).collect();
        for host in &hosts {
            resolver = resolver.with_host(host, &["10.0.0.1"], &["ns.example."]);
        }
        let resolver = Arc::new(resolver);
        let svc = service(resolver.clone(), 3);

        let results = svc.resolve_dns(&BatchContext::new(), &hosts).await.unwrap();

        assert_eq!(results.len(), 12);
        let max = resolver.max_in_flight.load(Ordering::SeqCst);
        assert!(max >= 1 && max <= 3, "max in flight was {max}");
    }

    #[tokio::test]
    async fn test_workers_clamped() {
        let svc = ResolveService::new(
            Arc::new(MockResolver::default()),
            Arc::new(MockResumer::default()),
            None,
            0,
            4,
        );
        assert_eq!(svc.workers(), 1);

        let svc = ResolveService::new(
            Arc::new(MockResolver::default()),
            Arc::new(MockResumer::default()),
            None,
            64,
            4,
        );
        assert_eq!(svc.workers(), 4);
    }

    #[tokio::test]
    async fn test_already_cancelled_batch_fails() {
        let svc = service(Arc::new(MockResolver::default()), 2);
        let ctx = BatchContext::new();
        ctx.cancel();

        assert_eq!(
            svc.resolve_dns(&ctx, &names(&["example.com"])).await,
            Err(BatchError::Cancelled)
        );
        assert_eq!(
            svc.fetch_about_ip(&ctx, &[ip("1.1.1.1")]).await,
            Err(BatchError::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_cancel_mid_batch_marks_items_cancelled() {
        let mut resolver = MockResolver::default().with_delay(Duration::from_secs(30));
        for host in ["a.example", "b.example", "c.example"] {
            resolver = resolver.with_host(host, &["10.0.0.1"], &["ns.example."]);
        }
        let svc = service(Arc::new(resolver), 1);
        let ctx = BatchContext::new();
        ctx.cancel_after(Duration::from_millis(50));

        let results = tokio::time::timeout(
            Duration::from_secs(5),
            svc.resolve_dns(&ctx, &names(&["a.example", "b.example", "c.example"])),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(results.len(), 3);
        for result in results.values() {
            assert_eq!(result.ip_error.as_deref(), Some("cancelled"));
            assert_eq!(result.ns_error.as_deref(), Some("cancelled"));
        }
    }

    // ===== fetch_about_ip Tests =====

    #[tokio::test]
    async fn test_fetch_empty_list() {
        let svc = service(Arc::new(MockResolver::default()), 2);
        let resumes = svc.fetch_about_ip(&BatchContext::new(), &[]).await.unwrap();
        assert!(resumes.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_deduplicates_and_reports_failures() {
        let resumer = Arc::new(MockResumer {
            failing: vec![ip("10.0.0.1")],
            ..MockResumer::default()
        });
        let svc = ResolveService::new(
            Arc::new(MockResolver::default()),
            resumer.clone(),
            None,
            2,
            8,
        );

        let resumes = svc
            .fetch_about_ip(
                &BatchContext::new(),
                &[ip("8.8.8.8"), ip("10.0.0.1"), ip("8.8.8.8")],
            )
            .await
            .unwrap();

        assert_eq!(resumes.len(), 2);
        assert_eq!(resumer.calls.load(Ordering::SeqCst), 2);
        let private = resumes.iter().find(|r| r.request_ip == ip("10.0.0.1")).unwrap();
        assert_eq!(
            private.error.as_deref(),
            Some("ip information error: private range")
        );
        assert!(private.resume.is_none());
    }

    #[tokio::test]
    async fn test_enrichment_concurrency_bounded_by_workers() {
        let resumer = Arc::new(MockResumer {
            delay: Duration::from_millis(20),
            ..MockResumer::default()
        });
        let svc = ResolveService::new(
            Arc::new(MockResolver::default()),
            resumer.clone(),
            None,
            3,
            8,
        );
        let ips: Vec<IpAddr> = (1..=12).map(|i| ip(&format!("10.0.1.{i}"))).collect();

        let resumes = svc.fetch_about_ip(&BatchContext::new(), &ips).await.unwrap();

        assert_eq!(resumes.len(), 12);
        assert_eq!(resumer.calls.load(Ordering::SeqCst), 12);
        let max = resumer.max_in_flight.load(Ordering::SeqCst);
        assert!(max >= 1 && max <= 3, "max in flight was {max}");
    }

    #[tokio::test]
    async fn test_fetch_cancelled_mid_batch_marks_items_cancelled() {
        let resumer = Arc::new(MockResumer {
            delay: Duration::from_secs(30),
            ..MockResumer::default()
        });
        let svc = ResolveService::new(
            Arc::new(MockResolver::default()),
            resumer,
            None,
            1,
            8,
        );
        let ctx = BatchContext::new();
        ctx.cancel_after(Duration::from_millis(50));

        let resumes = tokio::time::timeout(
            Duration::from_secs(5),
            svc.fetch_about_ip(&ctx, &[ip("10.0.2.1"), ip("10.0.2.2")]),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(resumes.len(), 2);
        for resume in &resumes {
            assert_eq!(resume.error.as_deref(), Some("cancelled"));
        }
    }

    #[test]
    fn test_normalize_names_keeps_first_seen_order() {
        assert_eq!(
            normalize_names(&names(&["b.example", " a.example", "b.example ", "", "a.example"])),
            vec!["b.example", "a.example"]
        );
    }

    #[tokio::test]
    async fn test_cache_miss_then_hit() {
        let resumer = Arc::new(MockResumer::default());
        let storage = Arc::new(MockStorage::default());
        let svc = ResolveService::new(
            Arc::new(MockResolver::default()),
            resumer.clone(),
            Some(storage.clone()),
            2,
            8,
        );
        let ctx = BatchContext::new();

        let first = svc.fetch_about_ip(&ctx, &[ip("1.1.1.1")]).await.unwrap();
        assert!(!first[0].from_cache);
        assert!(storage.records.lock().contains_key(&ip("1.1.1.1")));

        let second = svc.fetch_about_ip(&ctx, &[ip("1.1.1.1")]).await.unwrap();
        assert!(second[0].from_cache);
        assert_eq!(second[0].resume, first[0].resume);
        assert_eq!(resumer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_cache_errors_are_treated_as_miss() {
        let resumer = Arc::new(MockResumer::default());
        let storage = Arc::new(MockStorage {
            broken: true,
            ..MockStorage::default()
        });
        let svc = ResolveService::new(
            Arc::new(MockResolver::default()),
            resumer.clone(),
            Some(storage),
            2,
            8,
        );

        let resumes = svc
            .fetch_about_ip(&BatchContext::new(), &[ip("9.9.9.9")])
            .await
            .unwrap();

        assert!(resumes[0].resume.is_some());
        assert!(resumes[0].error.is_none());
        assert_eq!(resumer.calls.load(Ordering::SeqCst), 1);
        assert!(logs_contain("cache read for 9.9.9.9 failed"));
        assert!(logs_contain("cache write for 9.9.9.9 failed"));
    }

    #[tokio::test]
    async fn test_map_links_attached_when_enabled() {
        let svc = service(Arc::new(MockResolver::default()), 2).with_map_links(true);

        let resumes = svc
            .fetch_about_ip(&BatchContext::new(), &[ip("8.8.4.4")])
            .await
            .unwrap();

        assert!(resumes[0].map_links.contains_key("osm"));
        assert_eq!(resumes[0].map_links.len(), 4);
    }

    // ===== lookup Tests =====

    #[tokio::test]
    async fn test_lookup_correlates_shared_addresses() {
        let resolver = Arc::new(
            MockResolver::default()
                .with_host("a.example", &["1.1.1.1", "2.2.2.2"], &["ns.example."])
                .with_host("b.example", &["2.2.2.2"], &["ns.example."]),
        );
        let resumer = Arc::new(MockResumer::default());
        let svc = ResolveService::new(resolver, resumer.clone(), None, 4, 8);

        let reports = svc
            .lookup(&BatchContext::new(), &names(&["a.example", "b.example", "3.3.3.3"]))
            .await
            .unwrap();

        assert_eq!(reports.len(), 3);
        assert_eq!(reports["a.example"].resumes.len(), 2);
        assert_eq!(reports["b.example"].resumes.len(), 1);
        assert_eq!(reports["b.example"].resumes[0].request_ip, ip("2.2.2.2"));
        assert_eq!(reports["3.3.3.3"].resumes.len(), 1);
        // 1.1.1.1, 2.2.2.2 and 3.3.3.3 each fetched once
        assert_eq!(resumer.calls.load(Ordering::SeqCst), 3);
    }
}
