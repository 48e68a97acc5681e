use crate::paths::AppPaths;
use crate::{Result, SyncError};
use chrono::NaiveDate;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use url::Url;

const DEFAULT_BASE_URL: &str = "https://bing.gifposter.com";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36";

/// Markup coupling for one wallpaper site. Changing the site's HTML should
/// only ever mean editing this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    pub base_url: String,
    /// Path (or absolute URL) of the newest-first listing page.
    pub listing_path: String,
    pub listing_item: String,
    pub listing_date: String,
    pub listing_link: String,
    /// chrono format used for the listing dates, e.g. `%b %d, %Y`.
    pub date_format: String,
    /// Falls back to `date_format` when unset.
    pub detail_date_format: Option<String>,
    pub detail_date: String,
    pub detail_title: Option<String>,
    pub detail_description: String,
    pub detail_image: String,
    pub image_attr: String,
    pub http_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            listing_path: "/".to_string(),
            listing_item: "article.thumb".to_string(),
            listing_date: "time.date".to_string(),
            listing_link: "a".to_string(),
            date_format: "%b %d, %Y".to_string(),
            detail_date_format: None,
            detail_date: ".detail time[itemprop='date']".to_string(),
            detail_title: None,
            detail_description: ".detail .description".to_string(),
            detail_image: "#bing_wallpaper".to_string(),
            image_attr: "src".to_string(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl SiteProfile {
    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(self.base_url.trim()).map_err(|e| {
            SyncError::InvalidConfig(format!("base_url {:?} is not a url: {e}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SyncError::InvalidConfig(format!(
                "base_url must be http(s), got {}",
                url.scheme()
            )));
        }
        Ok(url)
    }

    pub fn listing_url(&self) -> Result<Url> {
        self.resolve(&self.listing_path)
    }

    /// Joins a root-relative or absolute reference onto the base url.
    pub fn resolve(&self, reference: &str) -> Result<Url> {
        let base = self.base_url()?;
        let reference = reference.trim();
        let mut joined = base.join(reference).map_err(|e| {
            SyncError::Parse(format!("cannot resolve {reference:?} against {base}: {e}"))
        })?;
        joined.set_fragment(None);
        Ok(joined)
    }

    pub fn parse_listing_date(&self, raw: &str) -> Result<NaiveDate> {
        parse_remote_date(raw, &self.date_format)
    }

    pub fn parse_detail_date(&self, raw: &str) -> Result<NaiveDate> {
        let format = self
            .detail_date_format
            .as_deref()
            .unwrap_or(&self.date_format);
        parse_remote_date(raw, format)
    }

    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        self.listing_url()?;
        let mut selectors = vec![
            &self.listing_item,
            &self.listing_date,
            &self.listing_link,
            &self.detail_date,
            &self.detail_description,
            &self.detail_image,
        ];
        if let Some(title) = &self.detail_title {
            selectors.push(title);
        }
        for raw in selectors {
            compile_selector(raw)?;
        }
        if self.image_attr.trim().is_empty() {
            return Err(SyncError::InvalidConfig("image_attr is empty".to_string()));
        }
        if self.date_format.trim().is_empty() {
            return Err(SyncError::InvalidConfig("date_format is empty".to_string()));
        }
        Ok(())
    }
}

pub(crate) fn compile_selector(raw: &str) -> Result<Selector> {
    Selector::parse(raw)
        .map_err(|e| SyncError::InvalidConfig(format!("bad css selector {raw:?}: {e}")))
}

fn parse_remote_date(raw: &str, format: &str) -> Result<NaiveDate> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDate::parse_from_str(&collapsed, format).map_err(|e| {
        SyncError::Parse(format!(
            "date {collapsed:?} does not match format {format:?}: {e}"
        ))
    })
}

/// External programs for the presentation sink. Every argument may carry
/// `{path}`, `{title}`, `{description}` or `{date}`; an empty list turns the
/// step off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    pub background_command: Vec<String>,
    pub notify_command: Vec<String>,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            background_command: vec!["fbsetbg".into(), "-f".into(), "{path}".into()],
            notify_command: vec![
                "zenity".into(),
                "--info".into(),
                "--width=600".into(),
                "--height=400".into(),
                "--title".into(),
                "{title}".into(),
                "--text".into(),
                "{description}".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub site: SiteProfile,
    pub presentation: PresentationConfig,
}

pub fn load_agent_config(paths: &AppPaths) -> Result<AgentConfig> {
    let path = paths.config_path();
    if !path.exists() {
        return Ok(AgentConfig::default());
    }
    let bytes = std::fs::read(&path)?;
    let parsed: AgentConfig = serde_json::from_slice(&bytes).map_err(|e| {
        SyncError::InvalidConfig(format!(
            "failed to parse {}: {e}",
            path.to_string_lossy()
        ))
    })?;
    parsed.site.validate()?;
    Ok(parsed)
}

pub fn save_agent_config(paths: &AppPaths, config: &AgentConfig) -> Result<()> {
    let path = paths.config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, format!("{json}\n"))?;
    Ok(())
}
