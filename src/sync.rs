//! Catch-up synchronization.
//!
//! One pass per invocation: read the newest ledger date, list the remote
//! catalog, work out which days are missing, and fetch them oldest-first.
//! Only the newest day is handed to the presenter. Every error aborts the
//! run; records appended before the error stay in the ledger, so the next
//! run simply resumes from them.

use crate::catalog;
use crate::config::SiteProfile;
use crate::detail;
use crate::fetch::{self, FetchOutcome};
use crate::http::Transport;
use crate::ledger::Ledger;
use crate::model::{DatedItem, ListedItem, ResolvedWallpaper, RunDates, WallpaperRecord};
use crate::paths::AppPaths;
use crate::presentation::Presenter;
use crate::{Result, SyncError};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// The ledger already holds today; nothing was fetched.
    UpToDate,
    /// The listing had no day newer than the ledger.
    NothingNew,
    Synced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub outcome: SyncOutcome,
    pub last_recorded: Option<NaiveDate>,
    pub baseline: NaiveDate,
    pub candidates_seen: usize,
    pub skipped_future: Vec<NaiveDate>,
    pub skipped_unordered: Vec<NaiveDate>,
    /// Oldest first.
    pub backfilled: Vec<WallpaperRecord>,
    pub head: Option<WallpaperRecord>,
    pub unverified_writes: usize,
}

/// Items newer than the baseline and not after today, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatchUpWindow {
    pub items: Vec<DatedItem>,
    pub skipped_future: Vec<NaiveDate>,
    /// Repeated or out-of-order dates that were dropped to keep the ledger
    /// strictly newest-first with one record per day.
    pub skipped_unordered: Vec<NaiveDate>,
    /// False when every listed item was newer than the baseline, i.e. the
    /// listing page may not reach back far enough.
    pub reached_baseline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPreview {
    pub last_recorded: Option<NaiveDate>,
    pub baseline: NaiveDate,
    pub up_to_date: bool,
    pub candidates_seen: usize,
    pub window: Option<CatchUpWindow>,
}

/// Scans newest-first `candidates` and stops at the first date that is not
/// after `baseline`. Dates after `today` are skipped but do not stop the scan.
/// A date that is not strictly older than the previously accepted one is
/// skipped too. Only accepted items need a detail link.
pub fn plan_catch_up(
    candidates: &[ListedItem],
    baseline: NaiveDate,
    today: NaiveDate,
) -> Result<CatchUpWindow> {
    let mut items: Vec<DatedItem> = Vec::new();
    let mut skipped_future = Vec::new();
    let mut skipped_unordered = Vec::new();
    let mut reached_baseline = false;

    for candidate in candidates {
        if candidate.date <= baseline {
            reached_baseline = true;
            break;
        }
        // Sites publish tomorrow's entry early; its detail page 404s.
        if candidate.date > today {
            skipped_future.push(candidate.date);
            continue;
        }
        if items.last().is_some_and(|prev| candidate.date >= prev.date) {
            skipped_unordered.push(candidate.date);
            continue;
        }
        let detail_url = candidate.detail_url.clone().ok_or_else(|| {
            SyncError::Parse(format!(
                "could not find detail link for {}",
                candidate.date.format("%Y%m%d")
            ))
        })?;
        items.push(DatedItem {
            date: candidate.date,
            detail_url,
        });
    }

    items.reverse();
    Ok(CatchUpWindow {
        items,
        skipped_future,
        skipped_unordered,
        reached_baseline,
    })
}

pub fn run_sync<T, P, FLog>(
    paths: &AppPaths,
    site: &SiteProfile,
    transport: &T,
    presenter: &mut P,
    dates: RunDates,
    mut log_line: FLog,
) -> Result<SyncSummary>
where
    T: Transport + ?Sized,
    P: Presenter + ?Sized,
    FLog: FnMut(&str, &str, serde_json::Value) -> Result<()>,
{
    let ledger = Ledger::new(paths.ledger_path());
    let last_recorded = ledger.read_last_date()?;
    log_line(
        "info",
        "sync_started",
        json!({
            "today": dates.today,
            "last_recorded": last_recorded,
            "ledger": ledger.path().to_string_lossy(),
        }),
    )?;

    let mut summary = SyncSummary {
        outcome: SyncOutcome::UpToDate,
        last_recorded,
        baseline: last_recorded.unwrap_or(dates.yesterday),
        candidates_seen: 0,
        skipped_future: Vec::new(),
        skipped_unordered: Vec::new(),
        backfilled: Vec::new(),
        head: None,
        unverified_writes: 0,
    };

    match last_recorded {
        Some(last) if last >= dates.today => {
            log_line("info", "up_to_date", json!({ "last_recorded": last }))?;
            return Ok(summary);
        }
        Some(_) => {}
        None => ledger.ensure_exists()?,
    }

    let candidates = catalog::list_candidates(transport, site)?;
    summary.candidates_seen = candidates.len();
    let window = plan_catch_up(&candidates, summary.baseline, dates.today)?;
    summary.skipped_future = window.skipped_future.clone();
    summary.skipped_unordered = window.skipped_unordered.clone();

    if !window.skipped_future.is_empty() {
        log_line(
            "info",
            "future_items_skipped",
            json!({ "dates": window.skipped_future }),
        )?;
    }
    if !window.skipped_unordered.is_empty() {
        log_line(
            "warn",
            "duplicate_or_unordered_item",
            json!({ "dates": window.skipped_unordered }),
        )?;
    }
    if !window.reached_baseline {
        log_line(
            "warn",
            "catch_up_may_be_partial",
            json!({
                "baseline": summary.baseline,
                "oldest_listed": candidates.last().map(|c| c.date),
            }),
        )?;
    }

    let Some((head, backfill)) = window.items.split_last() else {
        summary.outcome = SyncOutcome::NothingNew;
        log_line("info", "nothing_new", json!({ "baseline": summary.baseline }))?;
        return Ok(summary);
    };

    std::fs::create_dir_all(paths.images_dir())?;

    for item in backfill {
        let (resolved, _) = resolve_and_fetch(paths, site, transport, item, &mut log_line)?;
        let record = resolved.record();
        if !append_record(&ledger, &record, &mut log_line)? {
            summary.unverified_writes += 1;
        }
        summary.backfilled.push(record);
    }

    let (resolved, fetched) = resolve_and_fetch(paths, site, transport, head, &mut log_line)?;
    presenter.present(fetched.path(), &resolved)?;
    log_line(
        "info",
        "presented",
        json!({ "date": resolved.date, "path": fetched.path().to_string_lossy() }),
    )?;
    let record = resolved.record();
    if !append_record(&ledger, &record, &mut log_line)? {
        summary.unverified_writes += 1;
    }
    summary.head = Some(record);
    summary.outcome = SyncOutcome::Synced;

    log_line(
        "info",
        "sync_finished",
        json!({
            "backfilled": summary.backfilled.len(),
            "head": summary.head.as_ref().map(|r| r.date),
        }),
    )?;
    Ok(summary)
}

/// The catch-up window a sync would process right now, without downloading,
/// presenting or touching the ledger.
pub fn preview_sync<T: Transport + ?Sized>(
    paths: &AppPaths,
    site: &SiteProfile,
    transport: &T,
    dates: RunDates,
) -> Result<SyncPreview> {
    let ledger = Ledger::new(paths.ledger_path());
    let last_recorded = ledger.read_last_date()?;
    let baseline = last_recorded.unwrap_or(dates.yesterday);

    if last_recorded.is_some_and(|last| last >= dates.today) {
        return Ok(SyncPreview {
            last_recorded,
            baseline,
            up_to_date: true,
            candidates_seen: 0,
            window: None,
        });
    }

    let candidates = catalog::list_candidates(transport, site)?;
    Ok(SyncPreview {
        last_recorded,
        baseline,
        up_to_date: false,
        candidates_seen: candidates.len(),
        window: Some(plan_catch_up(&candidates, baseline, dates.today)?),
    })
}

fn resolve_and_fetch<T, FLog>(
    paths: &AppPaths,
    site: &SiteProfile,
    transport: &T,
    item: &DatedItem,
    log_line: &mut FLog,
) -> Result<(ResolvedWallpaper, FetchOutcome)>
where
    T: Transport + ?Sized,
    FLog: FnMut(&str, &str, serde_json::Value) -> Result<()>,
{
    let resolved = detail::resolve(transport, site, &item.detail_url)?;
    if resolved.date != item.date {
        return Err(SyncError::Parse(format!(
            "detail page {} is dated {} but the listing says {}",
            item.detail_url, resolved.date, item.date
        )));
    }

    let fetched = fetch::fetch_image(
        transport,
        &resolved.image_url,
        &paths.images_dir(),
        &resolved.filename,
    )?;
    match &fetched {
        FetchOutcome::Downloaded { path, bytes } => log_line(
            "info",
            "image_downloaded",
            json!({
                "date": resolved.date,
                "url": resolved.image_url.as_str(),
                "path": path.to_string_lossy(),
                "bytes": bytes,
            }),
        )?,
        FetchOutcome::AlreadyPresent { path } => log_line(
            "info",
            "image_already_present",
            json!({ "date": resolved.date, "path": path.to_string_lossy() }),
        )?,
    }
    Ok((resolved, fetched))
}

fn append_record<FLog>(ledger: &Ledger, record: &WallpaperRecord, log_line: &mut FLog) -> Result<bool>
where
    FLog: FnMut(&str, &str, serde_json::Value) -> Result<()>,
{
    let write = ledger.append(record)?;
    if write.verified {
        log_line(
            "info",
            "ledger_appended",
            json!({ "date": record.date, "filename": record.filename }),
        )?;
    } else {
        log_line(
            "warn",
            "ledger_self_check_failed",
            json!({ "date": record.date, "expected_line": write.line }),
        )?;
    }
    Ok(write.verified)
}
