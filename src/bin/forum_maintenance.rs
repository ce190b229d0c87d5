use anyhow::{Context, Result, bail};
use chrono::Utc;
use forum_core::domain::entities::{BackupOutcome, BackupRecord, BackupType, LogStats};
use forum_core::{AppConfig, AppState, MirrorStatus};
use std::env;
use tokio::runtime::Runtime;

#[derive(Debug, Clone, Default)]
struct CliOptions {
    backup: bool,
    export_logs: bool,
    stats: bool,
    auto_backup: Option<bool>,
    pretty: bool,
}

impl CliOptions {
    fn has_work(&self) -> bool {
        self.backup || self.export_logs || self.stats || self.auto_backup.is_some()
    }
}

#[derive(Debug, serde::Serialize)]
struct StatsReport {
    audit: LogStats,
    backups: Vec<BackupRecord>,
    mirror: MirrorStatus,
    rate_limit_keys: usize,
}

#[derive(Debug, Default, serde::Serialize)]
struct MaintenanceReport {
    generated_at_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    auto_backup_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    backup: Option<BackupOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exported_logs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<StatsReport>,
}

fn usage() -> &'static str {
    "Usage: forum_maintenance [--backup] [--export-logs] [--stats] [--auto-backup <on|off>] [--pretty]"
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_args(args)?;
    if !options.has_work() {
        bail!("Nothing to do\n{}", usage());
    }

    forum_core::init_logging();
    let config = AppConfig::from_env();
    let rt = Runtime::new().context("Failed to create Tokio runtime")?;
    let report = rt.block_on(run(config, &options))?;

    let payload = if options.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{payload}");

    if report.backup.as_ref().is_some_and(|outcome| !outcome.success) {
        bail!("Backup failed");
    }
    Ok(())
}

async fn run(config: AppConfig, options: &CliOptions) -> Result<MaintenanceReport> {
    let state = AppState::new(config)
        .await
        .context("Failed to initialize application state")?;
    let mut report = MaintenanceReport {
        generated_at_ms: Utc::now().timestamp_millis(),
        ..Default::default()
    };

    if let Some(enabled) = options.auto_backup {
        state
            .backups
            .set_auto_backup_enabled(enabled)
            .await
            .context("Failed to update auto backup setting")?;
        report.auto_backup_enabled = Some(enabled);
    }

    if options.backup {
        report.backup = Some(state.backups.create_backup(BackupType::Manual).await);
    }

    if options.export_logs {
        let path = state
            .audit
            .export_logs()
            .await
            .context("Failed to export audit logs")?;
        report.exported_logs = Some(path.display().to_string());
    }

    // 統計の前にミラーを吐き出しておく
    state.mirror.flush().await;

    if options.stats {
        report.stats = Some(StatsReport {
            audit: state.audit.get_stats().await,
            backups: state.backups.list_backups().await,
            mirror: state.mirror.status(),
            rate_limit_keys: state.rate_limits.tracked_keys().await,
        });
        if report.auto_backup_enabled.is_none() {
            report.auto_backup_enabled = Some(state.backups.is_auto_backup_enabled().await);
        }
    }

    Ok(report)
}

fn parse_args<I>(args: I) -> Result<CliOptions>
where
    I: IntoIterator<Item = String>,
{
    let mut options = CliOptions::default();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--backup" => options.backup = true,
            "--export-logs" => options.export_logs = true,
            "--stats" => options.stats = true,
            "--pretty" => options.pretty = true,
            "--auto-backup" => {
                let value = iter.next().ok_or_else(|| {
                    anyhow::anyhow!("--auto-backup requires a value\n{}", usage())
                })?;
                options.auto_backup = Some(parse_switch(&value)?);
            }
            "-h" | "--help" => {
                println!("{}", usage());
                std::process::exit(0);
            }
            other => {
                bail!("Unknown argument: {other}\n{}", usage());
            }
        }
    }
    Ok(options)
}

fn parse_switch(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => bail!("Unknown switch value: {other}. Expected 'on' or 'off'."),
    }
}
