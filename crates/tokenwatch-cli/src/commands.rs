use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use tokenwatch_core::format::{format_currency, format_date, format_date_time, format_number};
use tokenwatch_core::hash::HashManifest;
use tokenwatch_core::{
    install, installed, AppConfig, CapturingTransport, CostCalculator, Database,
    HealthCheckService, ProviderTag, ReqwestTransport, Transport, UsageNotifier, UsageRecord,
};

use crate::output::{self, Format};

pub struct RecordFilter {
    pub provider: Option<String>,
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub limit: Option<usize>,
}

pub fn parse_provider(s: &str) -> Result<ProviderTag> {
    s.parse::<ProviderTag>().map_err(|e| anyhow!("{e}"))
}

pub fn records(db: &Database, filter: RecordFilter, fmt: Format) -> Result<()> {
    let mut records = match (filter.since, filter.until) {
        (None, None) => db.get_all_usage_records()?,
        (since, until) => db.get_usage_records_by_date_range(
            since.unwrap_or(i64::MIN),
            until.unwrap_or(i64::MAX),
        )?,
    };
    if let Some(provider) = filter.provider.as_deref() {
        let provider = parse_provider(provider)?;
        records.retain(|r| r.provider == provider);
    }
    if let Some(limit) = filter.limit {
        records.truncate(limit);
    }

    let costs = db.get_cost_config()?;
    let calculator = CostCalculator::new(&costs);
    output::emit(
        fmt,
        &records,
        &["Time", "Provider", "Model", "Input", "Output", "Total", "Status", "Cost"],
        |records| {
            records
                .iter()
                .map(|r| {
                    let cost = calculator
                        .calculate(r)
                        .map(|c| format_currency(c.total_cost))
                        .unwrap_or_else(|| "-".to_string());
                    vec![
                        format_date_time(r.timestamp),
                        r.provider.to_string(),
                        r.model.clone(),
                        format_number(r.request_tokens),
                        format_number(r.response_tokens),
                        format_number(r.total_tokens),
                        r.status_code.to_string(),
                        cost,
                    ]
                })
                .collect()
        },
    )
}

pub fn summary(db: &Database, since: Option<i64>, until: Option<i64>, fmt: Format) -> Result<()> {
    let summary = db.get_usage_summary(since, until)?;
    output::emit(fmt, &summary, &["Metric", "Value"], |s| {
        vec![
            vec!["Requests".into(), format_number(s.total_requests)],
            vec!["Input tokens".into(), format_number(s.total_input_tokens)],
            vec!["Output tokens".into(), format_number(s.total_output_tokens)],
            vec!["Total tokens".into(), format_number(s.total_tokens)],
            vec!["Cost".into(), format_currency(s.total_cost)],
            vec![
                "Success rate".into(),
                format!("{:.1}%", s.success_rate * 100.0),
            ],
        ]
    })
}

pub fn providers(db: &Database, fmt: Format) -> Result<()> {
    let stats = db.get_provider_stats(None, None)?;
    output::emit(
        fmt,
        &stats,
        &["Provider", "Requests", "Tokens", "Cost", "Success"],
        |stats| {
            stats
                .iter()
                .map(|s| {
                    vec![
                        s.provider.to_string(),
                        format_number(s.request_count),
                        format_number(s.total_tokens),
                        format_currency(s.total_cost),
                        format!("{:.1}%", s.success_rate * 100.0),
                    ]
                })
                .collect()
        },
    )
}

pub fn models(db: &Database, fmt: Format) -> Result<()> {
    let stats = db.get_model_stats(None, None)?;
    output::emit(
        fmt,
        &stats,
        &["Provider", "Model", "Requests", "Tokens", "Cost", "Avg/Request"],
        |stats| {
            stats
                .iter()
                .map(|s| {
                    vec![
                        s.provider.to_string(),
                        s.model.clone(),
                        format_number(s.request_count),
                        format_number(s.total_tokens),
                        format_currency(s.total_cost),
                        format_currency(s.avg_cost_per_request),
                    ]
                })
                .collect()
        },
    )
}

pub fn daily(db: &Database, fmt: Format) -> Result<()> {
    let stats = db.get_daily_stats(None, None)?;
    output::emit(fmt, &stats, &["Date", "Requests", "Tokens", "Cost"], |stats| {
        stats
            .iter()
            .map(|s| {
                vec![
                    s.date.clone(),
                    format_number(s.request_count),
                    format_number(s.total_tokens),
                    format_currency(s.total_cost),
                ]
            })
            .collect()
    })
}

pub fn clear(db: &Database, force: bool) -> Result<()> {
    if !force {
        let count = db.get_all_usage_records()?.len();
        bail!("Refusing to delete {count} usage records without --force");
    }
    let removed = db.clear_all_usage_records()?;
    println!("Deleted {removed} usage records");
    Ok(())
}

pub fn health(db: &Database, config: &AppConfig, check: bool, fmt: Format) -> Result<()> {
    let results = if check {
        let runtime = tokio::runtime::Runtime::new()?;
        let service = HealthCheckService::new(config.health.clone());
        runtime.block_on(service.check_all(db))?
    } else {
        db.get_all_health_check_results()?
    };

    output::emit(
        fmt,
        &results,
        &["Provider", "Status", "Latency", "Checked", "Error"],
        |results| {
            results
                .iter()
                .map(|r| {
                    vec![
                        r.provider.to_string(),
                        r.status.to_string(),
                        format!("{} ms", r.response_time),
                        format_date_time(r.timestamp),
                        r.error.clone().unwrap_or_default(),
                    ]
                })
                .collect()
        },
    )
}

pub fn costs(db: &Database, fmt: Format) -> Result<()> {
    let config = db.get_cost_config()?;
    output::emit(
        fmt,
        &config,
        &["Provider", "Model", "Input $/1M", "Output $/1M"],
        |config| {
            config
                .providers
                .iter()
                .flat_map(|(provider, models)| {
                    models.iter().map(move |(model, pricing)| {
                        vec![
                            provider.to_string(),
                            model.clone(),
                            format_currency(pricing.input),
                            format_currency(pricing.output),
                        ]
                    })
                })
                .collect()
        },
    )
}

/// Sidecar manifest for an exported file: `<file>.manifest.json`.
pub fn manifest_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".manifest.json");
    path.with_file_name(name)
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("'{}' has no file name", path.display()))
}

/// Write every usage record as JSON plus its hash manifest.
pub fn export(db: &Database, path: &Path) -> Result<PathBuf> {
    let records: Vec<UsageRecord> = db.get_all_usage_records()?;
    let bytes = serde_json::to_vec_pretty(&records)?;
    std::fs::write(path, &bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let mut manifest = HashManifest::default();
    manifest.insert(file_name(path)?, &bytes);
    let sidecar = manifest_path(path);
    manifest.save(&sidecar)?;
    log::info!("[Export] {} records to {}", records.len(), path.display());
    Ok(sidecar)
}

/// Check an export against its manifest.
pub fn verify(path: &Path) -> Result<bool> {
    let sidecar = manifest_path(path);
    let manifest = HashManifest::load(&sidecar)
        .with_context(|| format!("Failed to read manifest {}", sidecar.display()))?;
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(manifest.verify(&file_name(path)?, &bytes)?)
}

pub fn config(config: &AppConfig, init: bool, fmt: Format) -> Result<()> {
    if init {
        let path = tokenwatch_core::config::get_config_path();
        if path.exists() {
            println!("Config already exists at {}", path.display());
        } else {
            let written = config.save()?;
            println!("Wrote default config to {}", written.display());
        }
        return Ok(());
    }

    output::emit(fmt, config, &["Setting", "Value"], |c| {
        let mut rows = vec![
            vec![
                "database_path".into(),
                c.database_path().display().to_string(),
            ],
            vec!["notify_capacity".into(), c.notify_capacity.to_string()],
            vec![
                "proxy_url".into(),
                c.proxy_url
                    .as_deref()
                    .map(tokenwatch_core::http_client::mask_url)
                    .unwrap_or_else(|| "(direct)".into()),
            ],
            vec![
                "proxy_url (active)".into(),
                active_proxy_display(tokenwatch_core::http_client::get_current_proxy_url()),
            ],
            vec![
                "health.timeout_secs".into(),
                c.health.timeout_secs.to_string(),
            ],
            vec![
                "health.degraded_threshold_ms".into(),
                c.health.degraded_threshold_ms.to_string(),
            ],
        ];
        for provider in ProviderTag::known() {
            rows.push(vec![
                format!("health.endpoints.{provider}"),
                c.health.endpoint_for(provider).unwrap_or_default(),
            ]);
        }
        rows
    })
}

fn active_proxy_display(url: Option<String>) -> String {
    url.as_deref()
        .map(tokenwatch_core::http_client::mask_url)
        .unwrap_or_else(|| "(direct)".into())
}

/// Install capture, GET each URL through it and print what gets recorded.
pub fn watch(db: Arc<Database>, config: &AppConfig, urls: &[String], wait: Duration) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        install(db, UsageNotifier::new(config.notify_capacity));
        let context = installed().context("Usage capture could not be installed")?;
        let mut rx = context.notifier().subscribe();

        let transport = CapturingTransport::new(ReqwestTransport::new());
        for url in urls {
            match transport.fetch(url.as_str().into()).await {
                Ok(response) => println!(
                    "GET {url} -> {} ({} bytes)",
                    response.status(),
                    response.bytes().len()
                ),
                Err(e) => println!("GET {url} -> {e}"),
            }
        }

        loop {
            match tokio::time::timeout(wait, rx.recv()).await {
                Ok(Ok(record)) => println!(
                    "recorded {} {} tokens={} ({} / {}) on {}",
                    record.provider,
                    record.model,
                    format_number(record.total_tokens),
                    format_number(record.request_tokens),
                    format_number(record.response_tokens),
                    format_date(record.timestamp)
                ),
                Ok(Err(RecvError::Lagged(skipped))) => {
                    log::warn!("[Watch] Skipped {skipped} notifications");
                }
                Ok(Err(RecvError::Closed)) | Err(_) => break,
            }
        }
        Ok(())
    })
}
