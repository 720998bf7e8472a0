//! Report orchestration: one-shot runs, retries, the daily schedule and the
//! volume profile push loop.

pub mod assemble;
pub mod schedule;

pub use assemble::{assemble_dashboard, dashboard_caption, dashboard_file_name};
pub use schedule::Schedule;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Datelike, FixedOffset, Utc, Weekday};
use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::notify::{Placement, TelegramClient};
use crate::persistence::LatestManifest;
use crate::report::{self, breadth::Market, ReportArtifact};
use crate::sources::YahooClient;

/// Manifest key of the assembled dashboard
pub const DASHBOARD_KEY: &str = "dashboard";

/// Result of one generation run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub dashboard: PathBuf,
    pub local_time: DateTime<FixedOffset>,
    pub sections: Vec<String>,
    pub skipped: Vec<String>,
}

impl RunOutcome {
    pub fn file_name(&self) -> String {
        self.dashboard
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn schedule_offset(cfg: &AppConfig) -> Result<FixedOffset> {
    FixedOffset::east_opt(cfg.schedule.utc_offset_hours * 3600)
        .with_context(|| format!("Invalid UTC offset {}h", cfg.schedule.utc_offset_hours))
}

/// Await an optional section; failures are logged and recorded as skipped
async fn optional_section<F>(name: &str, fut: F, sections: &mut Vec<ReportArtifact>, skipped: &mut Vec<String>)
where
    F: Future<Output = Result<ReportArtifact>>,
{
    match fut.await {
        Ok(artifact) => {
            info!(section = name, "✅ Section ready");
            sections.push(artifact);
        }
        Err(e) => {
            warn!(section = name, error = %e, "Section skipped");
            skipped.push(name.to_string());
        }
    }
}

/// Generate every dashboard section, write each report and the assembled
/// dashboard, and update the latest manifest. The heatmap is mandatory.
pub async fn run_generation_pipeline(cfg: &AppConfig, run_time: DateTime<Utc>) -> Result<RunOutcome> {
    let run_id = Uuid::new_v4();
    let span = info_span!("pipeline", run_id = %run_id);
    async move {
        let yahoo = YahooClient::new(&cfg.sources)?;
        let out_dir = cfg.output_dir();
        fs::create_dir_all(&out_dir).with_context(|| format!("Failed creating {}", out_dir.display()))?;

        let heatmap = report::heatmap::generate(cfg, &yahoo)
            .await
            .context("Sector heatmap is required")?;
        let mut sections = vec![heatmap];
        let mut skipped = Vec::new();

        optional_section(Market::HangSeng.key(), report::breadth::generate(cfg, &yahoo, Market::HangSeng), &mut sections, &mut skipped).await;
        optional_section(Market::Nasdaq100.key(), report::breadth::generate(cfg, &yahoo, Market::Nasdaq100), &mut sections, &mut skipped).await;
        optional_section(report::spx_vix::KEY, report::spx_vix::generate(cfg, &yahoo), &mut sections, &mut skipped).await;
        optional_section(report::true_range::KEY, report::true_range::generate(cfg, &yahoo), &mut sections, &mut skipped).await;
        optional_section(report::intraday::KEY, report::intraday::generate(cfg, &yahoo), &mut sections, &mut skipped).await;
        optional_section(report::implied::KEY, report::implied::generate(cfg, &yahoo), &mut sections, &mut skipped).await;

        let fx = report::usdhkd::latest_rate(&yahoo).await;

        let mut manifest = LatestManifest::load(&out_dir);
        for section in &sections {
            let path = section.write_to(&out_dir)?;
            manifest.record(&section.key, &section.title, &path, run_time);
        }

        let local_time = run_time.with_timezone(&schedule_offset(cfg)?);
        let html = assemble_dashboard(&sections, &report::usdhkd::banner(fx), local_time);
        let dashboard = out_dir.join(dashboard_file_name(&cfg.output.dashboard_prefix, local_time));
        fs::write(&dashboard, html).with_context(|| format!("Failed writing {}", dashboard.display()))?;
        manifest.record(DASHBOARD_KEY, "Market Dashboard", &dashboard, run_time);
        manifest.save(&out_dir)?;

        info!(
            path = %dashboard.display(),
            sections = sections.len(),
            skipped = ?skipped,
            "💾 Dashboard saved"
        );

        Ok(RunOutcome {
            run_id,
            dashboard,
            local_time,
            sections: sections.into_iter().map(|s| s.key).collect(),
            skipped,
        })
    }
    .instrument(span)
    .await
}

/// Timestamp a run attempt is filed under: the scheduled slot when there is
/// one, so retries keep the slot's name, otherwise the attempt start.
pub fn attempt_time(slot: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    slot.unwrap_or(now)
}

/// Retry the whole run, then optionally push the dashboard to Telegram.
///
/// `slot` is the scheduled time being served; ad-hoc runs pass `None`.
pub async fn run_pipeline_with_retries(cfg: &AppConfig, slot: Option<DateTime<Utc>>, push: bool) -> Result<RunOutcome> {
    let attempts = cfg.schedule.max_attempts.max(1);
    let delay = Duration::from_secs(cfg.schedule.retry_delay_secs);
    let mut last_err = None;

    for attempt in 1..=attempts {
        info!(attempt, max_attempts = attempts, "🚀 Starting dashboard run");
        match run_generation_pipeline(cfg, attempt_time(slot, Utc::now())).await {
            Ok(outcome) => {
                if push {
                    push_dashboard(cfg, &outcome).await?;
                }
                return Ok(outcome);
            }
            Err(e) => {
                warn!(attempt, error = %e, "Dashboard run failed");
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    let err = last_err.unwrap_or_else(|| anyhow!("Dashboard run did not start"));
    Err(err.context(format!("Dashboard run failed after {} attempts", attempts)))
}

async fn push_dashboard(cfg: &AppConfig, outcome: &RunOutcome) -> Result<()> {
    let telegram = TelegramClient::new(&cfg.telegram)?;
    if !cfg.telegram.enabled || !telegram.is_enabled() {
        info!("Telegram disabled, dashboard not pushed");
        return Ok(());
    }
    let caption = dashboard_caption(outcome.local_time, &outcome.file_name());
    let placement = Placement {
        thread_id: cfg.telegram.message_thread_id,
        reply_to: None,
    };
    if telegram.send_document(&outcome.dashboard, &caption, placement).await? {
        info!(file = %outcome.file_name(), "📤 Dashboard pushed");
    } else {
        warn!(file = %outcome.file_name(), "Dashboard push failed");
    }
    Ok(())
}

/// Run at every scheduled time until Ctrl-C
pub async fn run_scheduler(cfg: &AppConfig) -> Result<()> {
    let schedule = Schedule::from_config(&cfg.schedule)?;
    info!(config = %cfg.digest(), "📅 Scheduler started");

    loop {
        let next = schedule
            .next_run_after(Utc::now())
            .context("No scheduled run within the next 8 days")?;
        info!(next = %next.format("%Y-%m-%d %H:%M %:z"), "⏳ Next run");

        tokio::select! {
            _ = schedule.sleep_until(next) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                return Ok(());
            }
        }

        if let Err(e) = run_pipeline_with_retries(cfg, Some(next.with_timezone(&Utc)), true).await {
            error!(error = %e, "Scheduled run failed");
            notify_failure(cfg, &e).await;
        }
    }
}

async fn notify_failure(cfg: &AppConfig, err: &anyhow::Error) {
    if !cfg.telegram.enabled {
        return;
    }
    let text = format!("⚠️ Dashboard run failed\n{:#}", err);
    let placement = Placement {
        thread_id: cfg.telegram.message_thread_id,
        reply_to: None,
    };
    match TelegramClient::new(&cfg.telegram) {
        Ok(telegram) => {
            if let Err(e) = telegram.send_message(&text, placement).await {
                warn!(error = %e, "Failure notice not sent");
            }
        }
        Err(e) => warn!(error = %e, "Failure notice not sent"),
    }
}

/// Volume profile pushes are paused on Sundays (UTC), when most markets are shut
pub fn should_push_volume_profile(now: DateTime<Utc>) -> bool {
    now.weekday() != Weekday::Sun
}

/// Build the volume profile dashboard once, optionally pushing it
pub async fn run_volume_profile(cfg: &AppConfig, send: bool) -> Result<PathBuf> {
    let yahoo = YahooClient::new(&cfg.sources)?;
    let artifact = report::volume_profile::generate(cfg, &yahoo).await?;
    let out_dir = cfg.output_dir();
    let path = artifact.write_to(&out_dir)?;

    let now = Utc::now();
    let mut manifest = LatestManifest::load(&out_dir);
    manifest.record(&artifact.key, &artifact.title, &path, now);
    manifest.save(&out_dir)?;
    info!(path = %path.display(), "💾 Volume profile dashboard saved");

    if send {
        let telegram = TelegramClient::new(&cfg.telegram)?.raise_on_error(true);
        if telegram.is_enabled() {
            let local = now.with_timezone(&schedule_offset(cfg)?);
            let caption = format!("📊 Volume Profile Dashboard\nUpdated: {} UTC+8", local.format("%Y-%m-%d %H:%M"));
            let placement = Placement {
                thread_id: cfg.telegram.message_thread_id,
                reply_to: cfg.telegram.reply_to_message_id,
            };
            telegram.send_document(&path, &caption, placement).await?;
        } else {
            warn!("Telegram credentials missing, volume profile not sent");
        }
    }
    Ok(path)
}

/// Rebuild and push every `push_every_hours`, skipping Sundays, until Ctrl-C
pub async fn run_volume_profile_loop(cfg: &AppConfig) -> Result<()> {
    let every = Duration::from_secs(cfg.volume_profile.push_every_hours.max(1) * 3600);
    info!(every_hours = cfg.volume_profile.push_every_hours, "📅 Volume profile loop started");
    loop {
        let now = Utc::now();
        if should_push_volume_profile(now) {
            if let Err(e) = run_volume_profile(cfg, true).await {
                error!(error = %e, "Volume profile run failed");
            }
        } else {
            info!("Sunday (UTC), volume profile push skipped");
        }

        tokio::select! {
            _ = tokio::time::sleep(every) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sunday_push_skipped() {
        let sunday = Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap();
        let monday = Utc.with_ymd_and_hms(2025, 3, 10, 0, 30, 0).unwrap();
        assert!(!should_push_volume_profile(sunday));
        assert!(should_push_volume_profile(monday));
    }

    #[test]
    fn test_retries_keep_the_scheduled_slot() {
        let hkt = FixedOffset::east_opt(8 * 3600).unwrap();
        let slot = hkt.with_ymd_and_hms(2025, 3, 3, 22, 30, 0).unwrap().with_timezone(&Utc);
        let late_retry = slot + chrono::Duration::minutes(7);

        let filed = attempt_time(Some(slot), late_retry).with_timezone(&hkt);
        assert_eq!(dashboard_file_name("Market_Dashboard", filed), "Market_Dashboard20250303_2230.html");
        assert_eq!(attempt_time(None, late_retry), late_retry);
    }

    #[test]
    fn test_outcome_file_name() {
        let outcome = RunOutcome {
            run_id: Uuid::nil(),
            dashboard: PathBuf::from("reports/Market_Dashboard20250303_2230.html"),
            local_time: FixedOffset::east_opt(8 * 3600).unwrap().with_ymd_and_hms(2025, 3, 3, 22, 30, 0).unwrap(),
            sections: vec!["etf_heatmap".into()],
            skipped: Vec::new(),
        };
        assert_eq!(outcome.file_name(), "Market_Dashboard20250303_2230.html");
    }
}
