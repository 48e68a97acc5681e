use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use url::Url;

/// One card on the listing page. The link is only required once the card
/// falls inside the catch-up window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedItem {
    pub date: NaiveDate,
    pub detail_url: Option<Url>,
}

/// A listing entry: the day it was published and where its detail page is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedItem {
    pub date: NaiveDate,
    pub detail_url: Url,
}

/// Everything the detail page told us about one day's wallpaper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWallpaper {
    pub date: NaiveDate,
    pub image_url: Url,
    pub title: Option<String>,
    /// Already prefixed with the title when the site exposes one.
    pub description: String,
    pub filename: String,
}

impl ResolvedWallpaper {
    pub fn record(&self) -> WallpaperRecord {
        WallpaperRecord {
            date: self.date,
            filename: self.filename.clone(),
            description: self.description.clone(),
        }
    }
}

/// One ledger line, unescaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallpaperRecord {
    pub date: NaiveDate,
    pub filename: String,
    pub description: String,
}

/// "Today" and "yesterday" for one run, fixed at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunDates {
    pub today: NaiveDate,
    pub yesterday: NaiveDate,
}

impl RunDates {
    pub fn for_today(today: NaiveDate) -> Self {
        Self {
            today,
            yesterday: today.pred_opt().unwrap_or(today),
        }
    }

    /// Local calendar day, with no time component.
    pub fn local() -> Self {
        Self::for_today(chrono::Local::now().date_naive())
    }
}
