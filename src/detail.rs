use crate::config::{compile_selector, SiteProfile};
use crate::http::Transport;
use crate::model::ResolvedWallpaper;
use crate::{Result, SyncError};
use scraper::{ElementRef, Html};
use url::Url;

pub fn resolve<T: Transport + ?Sized>(
    transport: &T,
    site: &SiteProfile,
    detail_url: &Url,
) -> Result<ResolvedWallpaper> {
    let html = transport.get_text(detail_url)?;
    parse_detail(&html, site, detail_url)
}

pub fn parse_detail(html: &str, site: &SiteProfile, detail_url: &Url) -> Result<ResolvedWallpaper> {
    let document = Html::parse_document(html);

    let date_text = select_text(&document, &site.detail_date)?
        .ok_or_else(|| missing(&site.detail_date, detail_url))?;
    let date = site.parse_detail_date(&date_text)?;

    let description = select_text(&document, &site.detail_description)?
        .ok_or_else(|| missing(&site.detail_description, detail_url))?;
    let description = description.trim().to_string();

    let title = match site.detail_title.as_deref() {
        Some(selector) => select_text(&document, selector)?
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()),
        None => None,
    };

    let description = match &title {
        Some(title) => format!("{title}.  {description}"),
        None => description,
    };

    let image_selector = compile_selector(&site.detail_image)?;
    let src = document
        .select(&image_selector)
        .next()
        .and_then(|img| img.value().attr(&site.image_attr))
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .ok_or_else(|| {
            SyncError::Parse(format!(
                "could not find img {} on url {detail_url}",
                site.image_attr
            ))
        })?;
    let image_url = site.resolve(src)?;
    let filename = filename_from_url(&image_url)?;

    Ok(ResolvedWallpaper {
        date,
        image_url,
        title,
        description,
        filename,
    })
}

/// The last path segment of the image url. Query and fragment never leak
/// into the name.
pub fn filename_from_url(url: &Url) -> Result<String> {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");

    let invalid = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\'])
        || segment.chars().any(char::is_whitespace);
    if invalid {
        return Err(SyncError::Parse(format!(
            "cannot derive a file name from image url {url}"
        )));
    }
    Ok(segment.to_string())
}

fn select_text(document: &Html, selector: &str) -> Result<Option<String>> {
    let compiled = compile_selector(selector)?;
    Ok(document
        .select(&compiled)
        .next()
        .map(|el: ElementRef<'_>| el.text().collect::<String>()))
}

fn missing(selector: &str, detail_url: &Url) -> SyncError {
    SyncError::Parse(format!("missing element {selector:?} on url {detail_url}"))
}
