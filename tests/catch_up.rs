use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use dailywall::config::SiteProfile;
use dailywall::http::Transport;
use dailywall::ledger::Ledger;
use dailywall::model::{ResolvedWallpaper, RunDates};
use dailywall::paths::AppPaths;
use dailywall::presentation::Presenter;
use dailywall::sync::{self, SyncOutcome, SyncSummary};
use dailywall::{Result, SyncError};
use url::Url;

const BASE: &str = "https://bing.gifposter.com";

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("ymd")
}

fn slug(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

fn filename(date: NaiveDate) -> String {
    format!("Wall{}_1920x1080.jpg", slug(date))
}

fn description(date: NaiveDate) -> String {
    format!("Scenery for {}", date.format("%B %-d"))
}

/// Serves a fake listing site out of memory and records every request.
#[derive(Default)]
struct FakeSite {
    pages: HashMap<String, String>,
    images: HashMap<String, Vec<u8>>,
    requests: RefCell<Vec<String>>,
}

impl FakeSite {
    fn with_listing(dates: &[NaiveDate]) -> Self {
        let mut site = Self::default();
        let mut listing = String::from("<html><body>");
        for &date in dates {
            listing.push_str(&format!(
                r#"<article class="thumb"><a href="/wallpaper-{s}.html"><img src="/thumb/{s}.jpg"></a><time class="date">{d}</time></article>"#,
                s = slug(date),
                d = date.format("%b %-d, %Y"),
            ));
            site.add_detail(date, &description(date));
        }
        listing.push_str("</body></html>");
        site.pages.insert(format!("{BASE}/"), listing);
        site
    }

    /// Appends a card that carries a date but no link, like a promo tile.
    fn append_unlinked_card(&mut self, date: NaiveDate) {
        let key = format!("{BASE}/");
        let card = format!(
            r#"<article class="thumb promo"><time class="date">{}</time></article></body>"#,
            date.format("%b %-d, %Y"),
        );
        let listing = self.pages[&key].replacen("</body>", &card, 1);
        self.pages.insert(key, listing);
    }

    fn add_detail(&mut self, date: NaiveDate, description: &str) {
        let page = format!(
            r#"<html><body>
            <img id="bing_wallpaper" src="/bingImages/{f}">
            <div class="detail"><time itemprop="date">{d}</time><div class="description">{desc}</div></div>
            </body></html>"#,
            f = filename(date),
            d = date.format("%b %-d, %Y"),
            desc = description,
        );
        self.pages
            .insert(format!("{BASE}/wallpaper-{}.html", slug(date)), page);
        self.images.insert(
            format!("{BASE}/bingImages/{}", filename(date)),
            format!("jpeg:{}", slug(date)).into_bytes(),
        );
    }

    fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }

    fn not_found(url: &Url) -> SyncError {
        SyncError::Fetch {
            url: url.to_string(),
            detail: "http 404".to_string(),
        }
    }
}

impl Transport for FakeSite {
    fn get_text(&self, url: &Url) -> Result<String> {
        self.requests.borrow_mut().push(url.to_string());
        self.pages
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| Self::not_found(url))
    }

    fn get_stream(&self, url: &Url) -> Result<Box<dyn Read>> {
        self.requests.borrow_mut().push(url.to_string());
        let body = self
            .images
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| Self::not_found(url))?;
        Ok(Box::new(Cursor::new(body)))
    }
}

#[derive(Default)]
struct RecordingPresenter {
    shown: Vec<(PathBuf, NaiveDate, String)>,
}

impl Presenter for RecordingPresenter {
    fn present(&mut self, image_path: &Path, wallpaper: &ResolvedWallpaper) -> Result<()> {
        assert!(image_path.exists(), "presented before download");
        self.shown.push((
            image_path.to_path_buf(),
            wallpaper.date,
            wallpaper.description.clone(),
        ));
        Ok(())
    }
}

/// Stands in for a background setter that exits non-zero.
struct FailingPresenter;

impl Presenter for FailingPresenter {
    fn present(&mut self, _image_path: &Path, _wallpaper: &ResolvedWallpaper) -> Result<()> {
        Err(SyncError::ExternalToolFailed {
            tool: "fbsetbg".to_string(),
            code: Some(1),
            stderr: "cannot open display".to_string(),
        })
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    paths: AppPaths,
    site: SiteProfile,
    events: Vec<String>,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().join("walls"));
        Self {
            _dir: dir,
            paths,
            site: SiteProfile::default(),
            events: Vec::new(),
        }
    }

    fn ledger(&self) -> Ledger {
        Ledger::new(self.paths.ledger_path())
    }

    fn seed_ledger(&self, contents: &str) {
        std::fs::create_dir_all(&self.paths.base_dir).expect("mkdir");
        std::fs::write(self.paths.ledger_path(), contents).expect("seed");
    }

    fn ledger_text(&self) -> String {
        std::fs::read_to_string(self.paths.ledger_path()).expect("ledger")
    }

    fn run(
        &mut self,
        remote: &FakeSite,
        presenter: &mut dyn Presenter,
        today: NaiveDate,
    ) -> Result<SyncSummary> {
        let events = &mut self.events;
        sync::run_sync(
            &self.paths,
            &self.site,
            remote,
            presenter,
            RunDates::for_today(today),
            |_level, event, _data| {
                events.push(event.to_string());
                Ok(())
            },
        )
    }

    fn ledger_dates(&self) -> Vec<NaiveDate> {
        self.ledger()
            .records()
            .expect("records")
            .into_iter()
            .map(|r| r.date)
            .collect()
    }
}

#[test]
fn first_run_records_only_today() {
    let mut h = Harness::new();
    let remote = FakeSite::with_listing(&[ymd(2024, 1, 15), ymd(2024, 1, 14)]);
    let mut presenter = RecordingPresenter::default();

    let summary = h
        .run(&remote, &mut presenter, ymd(2024, 1, 15))
        .expect("sync");

    assert_eq!(summary.outcome, SyncOutcome::Synced);
    assert_eq!(summary.baseline, ymd(2024, 1, 14));
    assert!(summary.backfilled.is_empty());
    assert_eq!(
        h.ledger_text(),
        format!(
            "20240115 {} {}\n\n",
            filename(ymd(2024, 1, 15)),
            description(ymd(2024, 1, 15))
        )
    );
    assert_eq!(presenter.shown.len(), 1);
    assert_eq!(presenter.shown[0].1, ymd(2024, 1, 15));
    assert_eq!(
        std::fs::read(h.paths.image_path(&filename(ymd(2024, 1, 15)))).expect("image"),
        b"jpeg:20240115"
    );
    assert!(!h.paths.image_path(&filename(ymd(2024, 1, 14))).exists());
}

#[test]
fn catch_up_backfills_oldest_first_and_presents_newest_once() {
    let mut h = Harness::new();
    h.seed_ledger("20240110 Old.jpg Older scenery\n");
    let remote = FakeSite::with_listing(&[
        ymd(2024, 1, 15),
        ymd(2024, 1, 14),
        ymd(2024, 1, 13),
        ymd(2024, 1, 12),
        ymd(2024, 1, 11),
        ymd(2024, 1, 10),
        ymd(2024, 1, 9),
    ]);
    let mut presenter = RecordingPresenter::default();

    let summary = h
        .run(&remote, &mut presenter, ymd(2024, 1, 14))
        .expect("sync");

    let backfilled: Vec<_> = summary.backfilled.iter().map(|r| r.date).collect();
    assert_eq!(
        backfilled,
        vec![ymd(2024, 1, 11), ymd(2024, 1, 12), ymd(2024, 1, 13)]
    );
    assert_eq!(summary.head.as_ref().map(|r| r.date), Some(ymd(2024, 1, 14)));
    assert_eq!(summary.skipped_future, vec![ymd(2024, 1, 15)]);

    assert_eq!(
        h.ledger_dates(),
        vec![
            ymd(2024, 1, 14),
            ymd(2024, 1, 13),
            ymd(2024, 1, 12),
            ymd(2024, 1, 11),
            ymd(2024, 1, 10),
        ]
    );
    let records = h.ledger().records().expect("records");
    assert_eq!(records[0].filename, filename(ymd(2024, 1, 14)));
    assert_eq!(records[0].description, description(ymd(2024, 1, 14)));

    assert_eq!(presenter.shown.len(), 1);
    assert_eq!(presenter.shown[0].1, ymd(2024, 1, 14));

    // The future entry's detail page is never requested.
    assert!(!remote
        .requests
        .borrow()
        .iter()
        .any(|u| u.contains("20240115")));
    // Detail pages are visited oldest first.
    let detail_order: Vec<String> = remote
        .requests
        .borrow()
        .iter()
        .filter(|u| u.contains("/wallpaper-"))
        .cloned()
        .collect();
    assert_eq!(
        detail_order,
        vec![
            format!("{BASE}/wallpaper-20240111.html"),
            format!("{BASE}/wallpaper-20240112.html"),
            format!("{BASE}/wallpaper-20240113.html"),
            format!("{BASE}/wallpaper-20240114.html"),
        ]
    );
    assert!(h.events.iter().any(|e| e == "future_items_skipped"));
    assert!(h.events.iter().all(|e| e != "catch_up_may_be_partial"));
}

#[test]
fn repeated_runs_are_idempotent() {
    let mut h = Harness::new();
    let remote = FakeSite::with_listing(&[ymd(2024, 1, 15), ymd(2024, 1, 14)]);
    let mut presenter = RecordingPresenter::default();
    h.run(&remote, &mut presenter, ymd(2024, 1, 15))
        .expect("first");
    let after_first = h.ledger_text();
    let requests_after_first = remote.request_count();

    let summary = h
        .run(&remote, &mut presenter, ymd(2024, 1, 15))
        .expect("second");
    assert_eq!(summary.outcome, SyncOutcome::UpToDate);
    assert_eq!(remote.request_count(), requests_after_first);
    assert_eq!(h.ledger_text(), after_first);
    assert_eq!(presenter.shown.len(), 1);

    // Next day, nothing published yet: one listing request, no writes.
    let summary = h
        .run(&remote, &mut presenter, ymd(2024, 1, 16))
        .expect("third");
    assert_eq!(summary.outcome, SyncOutcome::NothingNew);
    assert_eq!(remote.request_count(), requests_after_first + 1);
    assert_eq!(h.ledger_text(), after_first);
    assert_eq!(presenter.shown.len(), 1);
}

#[test]
fn failure_mid_run_keeps_earlier_records_and_next_run_resumes() {
    let mut h = Harness::new();
    h.seed_ledger("20240110 Old.jpg Older scenery\n");
    let dates = [
        ymd(2024, 1, 14),
        ymd(2024, 1, 13),
        ymd(2024, 1, 12),
        ymd(2024, 1, 11),
        ymd(2024, 1, 10),
    ];
    let mut broken = FakeSite::with_listing(&dates);
    broken
        .images
        .remove(&format!("{BASE}/bingImages/{}", filename(ymd(2024, 1, 13))));
    let mut presenter = RecordingPresenter::default();

    let err = h
        .run(&broken, &mut presenter, ymd(2024, 1, 14))
        .expect_err("image 404");
    assert!(matches!(err, SyncError::Fetch { .. }), "err={err:?}");
    assert_eq!(
        h.ledger_dates(),
        vec![ymd(2024, 1, 12), ymd(2024, 1, 11), ymd(2024, 1, 10)]
    );
    assert!(presenter.shown.is_empty());
    assert!(!h
        .paths
        .image_path(&format!("{}.part", filename(ymd(2024, 1, 13))))
        .exists());

    let fixed = FakeSite::with_listing(&dates);
    let summary = h
        .run(&fixed, &mut presenter, ymd(2024, 1, 14))
        .expect("resume");
    let backfilled: Vec<_> = summary.backfilled.iter().map(|r| r.date).collect();
    assert_eq!(backfilled, vec![ymd(2024, 1, 13)]);
    assert_eq!(
        h.ledger_dates(),
        vec![
            ymd(2024, 1, 14),
            ymd(2024, 1, 13),
            ymd(2024, 1, 12),
            ymd(2024, 1, 11),
            ymd(2024, 1, 10),
        ]
    );
    assert_eq!(presenter.shown.len(), 1);
}

#[test]
fn head_image_already_on_disk_is_reused() {
    let mut h = Harness::new();
    let remote = FakeSite::with_listing(&[ymd(2024, 1, 15)]);
    std::fs::create_dir_all(h.paths.images_dir()).expect("mkdir");
    let existing = h.paths.image_path(&filename(ymd(2024, 1, 15)));
    std::fs::write(&existing, b"kept").expect("seed image");
    let mut presenter = RecordingPresenter::default();

    h.run(&remote, &mut presenter, ymd(2024, 1, 15))
        .expect("sync");

    assert_eq!(std::fs::read(&existing).expect("image"), b"kept");
    assert_eq!(presenter.shown[0].0, existing);
    assert_eq!(h.ledger_dates(), vec![ymd(2024, 1, 15)]);
    assert!(h.events.iter().any(|e| e == "image_already_present"));
}

#[test]
fn reserved_characters_survive_a_full_sync() {
    let mut h = Harness::new();
    let mut remote = FakeSite::with_listing(&[ymd(2024, 1, 15)]);
    remote.add_detail(ymd(2024, 1, 15), "Rock &amp; roll; it's\nloud");
    let mut presenter = RecordingPresenter::default();

    h.run(&remote, &mut presenter, ymd(2024, 1, 15))
        .expect("sync");

    let text = h.ledger_text();
    assert_eq!(text.lines().count(), 2, "text={text:?}");
    assert!(text.starts_with("20240115 "));
    let records = h.ledger().records().expect("records");
    assert_eq!(records[0].description, "Rock & roll; it's\nloud");
    assert_eq!(presenter.shown[0].2, "Rock & roll; it's\nloud");
}

#[test]
fn detail_date_disagreeing_with_listing_aborts() {
    let mut h = Harness::new();
    let mut remote = FakeSite::with_listing(&[ymd(2024, 1, 15)]);
    let detail_url = format!("{BASE}/wallpaper-{}.html", slug(ymd(2024, 1, 15)));
    let misdated = remote.pages[&detail_url].replace("Jan 15, 2024", "Jan 14, 2024");
    remote.pages.insert(detail_url, misdated);
    let mut presenter = RecordingPresenter::default();

    let err = h
        .run(&remote, &mut presenter, ymd(2024, 1, 15))
        .expect_err("mismatch");
    assert!(matches!(err, SyncError::Parse(_)), "err={err:?}");
    assert!(h.ledger_dates().is_empty());
}

#[test]
fn corrupt_ledger_stops_before_any_request() {
    let mut h = Harness::new();
    h.seed_ledger("garbage line\n");
    let remote = FakeSite::with_listing(&[ymd(2024, 1, 15)]);
    let mut presenter = RecordingPresenter::default();

    let err = h
        .run(&remote, &mut presenter, ymd(2024, 1, 15))
        .expect_err("corrupt");
    assert!(matches!(err, SyncError::CorruptLedger { .. }), "err={err:?}");
    assert_eq!(remote.request_count(), 0);
}

#[test]
fn listing_that_skips_the_baseline_warns_about_partial_catch_up() {
    let mut h = Harness::new();
    h.seed_ledger("20240101 Old.jpg Older scenery\n");
    let remote = FakeSite::with_listing(&[ymd(2024, 1, 15), ymd(2024, 1, 14)]);
    let mut presenter = RecordingPresenter::default();

    h.run(&remote, &mut presenter, ymd(2024, 1, 15))
        .expect("sync");

    assert!(h.events.iter().any(|e| e == "catch_up_may_be_partial"));
    assert_eq!(
        h.ledger_dates(),
        vec![ymd(2024, 1, 15), ymd(2024, 1, 14), ymd(2024, 1, 1)]
    );
}

#[test]
fn preview_has_no_side_effects() {
    let h = Harness::new();
    let remote = FakeSite::with_listing(&[ymd(2024, 1, 16), ymd(2024, 1, 15), ymd(2024, 1, 14)]);

    let preview = sync::preview_sync(&h.paths, &h.site, &remote, RunDates::for_today(ymd(2024, 1, 15)))
        .expect("preview");

    assert_eq!(preview.last_recorded, None);
    assert_eq!(preview.baseline, ymd(2024, 1, 14));
    let window = preview.window.expect("window");
    assert_eq!(window.skipped_future, vec![ymd(2024, 1, 16)]);
    assert_eq!(
        window.items.iter().map(|i| i.date).collect::<Vec<_>>(),
        vec![ymd(2024, 1, 15)]
    );
    assert_eq!(remote.request_count(), 1);
    assert!(!h.paths.ledger_path().exists());
}

#[test]
fn presenter_failure_leaves_head_unrecorded_until_next_run() {
    let mut h = Harness::new();
    h.seed_ledger("20240112 Old.jpg Older scenery\n");
    let remote = FakeSite::with_listing(&[ymd(2024, 1, 14), ymd(2024, 1, 13), ymd(2024, 1, 12)]);

    let err = h
        .run(&remote, &mut FailingPresenter, ymd(2024, 1, 14))
        .expect_err("setter failed");
    assert!(matches!(err, SyncError::ExternalToolFailed { .. }), "err={err:?}");
    assert_eq!(h.ledger_dates(), vec![ymd(2024, 1, 13), ymd(2024, 1, 12)]);
    assert!(h.paths.image_path(&filename(ymd(2024, 1, 14))).exists());
    assert!(h.events.iter().all(|e| e != "presented"));

    h.events.clear();
    let requests_before = remote.request_count();
    let mut presenter = RecordingPresenter::default();
    let summary = h
        .run(&remote, &mut presenter, ymd(2024, 1, 14))
        .expect("retry");

    assert!(summary.backfilled.is_empty());
    assert_eq!(summary.head.as_ref().map(|r| r.date), Some(ymd(2024, 1, 14)));
    assert_eq!(
        h.ledger_dates(),
        vec![ymd(2024, 1, 14), ymd(2024, 1, 13), ymd(2024, 1, 12)]
    );
    assert_eq!(presenter.shown.len(), 1);
    assert!(h.events.iter().any(|e| e == "image_already_present"));
    // Listing and detail page only; the image is not downloaded again.
    assert_eq!(remote.request_count(), requests_before + 2);
}

#[test]
fn repeated_listing_date_is_recorded_once() {
    let mut h = Harness::new();
    h.seed_ledger("20240114 Old.jpg Older scenery\n");
    let remote = FakeSite::with_listing(&[ymd(2024, 1, 15), ymd(2024, 1, 15), ymd(2024, 1, 14)]);
    let mut presenter = RecordingPresenter::default();

    let summary = h
        .run(&remote, &mut presenter, ymd(2024, 1, 15))
        .expect("sync");

    assert!(summary.backfilled.is_empty());
    assert_eq!(summary.skipped_unordered, vec![ymd(2024, 1, 15)]);
    assert_eq!(h.ledger_dates(), vec![ymd(2024, 1, 15), ymd(2024, 1, 14)]);
    assert!(h.events.iter().any(|e| e == "duplicate_or_unordered_item"));
    assert_eq!(presenter.shown.len(), 1);
}

#[test]
fn out_of_order_listing_keeps_ledger_newest_first() {
    let mut h = Harness::new();
    h.seed_ledger("20240111 Old.jpg Older scenery\n");
    let remote = FakeSite::with_listing(&[
        ymd(2024, 1, 14),
        ymd(2024, 1, 12),
        ymd(2024, 1, 13),
        ymd(2024, 1, 11),
    ]);
    let mut presenter = RecordingPresenter::default();

    let summary = h
        .run(&remote, &mut presenter, ymd(2024, 1, 14))
        .expect("sync");

    assert_eq!(summary.skipped_unordered, vec![ymd(2024, 1, 13)]);
    let dates = h.ledger_dates();
    assert_eq!(dates, vec![ymd(2024, 1, 14), ymd(2024, 1, 12), ymd(2024, 1, 11)]);
    assert!(dates.windows(2).all(|w| w[0] > w[1]), "dates={dates:?}");
    assert!(h.events.iter().any(|e| e == "duplicate_or_unordered_item"));
}

#[test]
fn unlinked_card_below_the_baseline_does_not_block_sync() {
    let mut h = Harness::new();
    h.seed_ledger("20240114 Old.jpg Older scenery\n");
    let mut remote = FakeSite::with_listing(&[ymd(2024, 1, 15), ymd(2024, 1, 14)]);
    remote.append_unlinked_card(ymd(2024, 1, 13));
    let mut presenter = RecordingPresenter::default();

    let summary = h
        .run(&remote, &mut presenter, ymd(2024, 1, 15))
        .expect("sync");

    assert_eq!(summary.candidates_seen, 3);
    assert_eq!(h.ledger_dates(), vec![ymd(2024, 1, 15), ymd(2024, 1, 14)]);
}

#[test]
fn unlinked_card_inside_the_window_aborts_before_downloading() {
    let mut h = Harness::new();
    h.seed_ledger("20240112 Old.jpg Older scenery\n");
    let mut remote = FakeSite::with_listing(&[ymd(2024, 1, 15), ymd(2024, 1, 14)]);
    remote.append_unlinked_card(ymd(2024, 1, 13));
    let mut presenter = RecordingPresenter::default();

    let err = h
        .run(&remote, &mut presenter, ymd(2024, 1, 15))
        .expect_err("missing link");
    assert!(matches!(err, SyncError::Parse(_)), "err={err:?}");
    assert_eq!(remote.request_count(), 1);
    assert_eq!(h.ledger_dates(), vec![ymd(2024, 1, 12)]);
}
