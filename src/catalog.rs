use crate::config::{compile_selector, SiteProfile};
use crate::http::Transport;
use crate::model::ListedItem;
use crate::{Result, SyncError};
use scraper::Html;

/// Fetches the listing page and returns its items newest-first.
///
/// Only one page is read. If more days are missing than the page shows, the
/// oldest of them are never seen here.
pub fn list_candidates<T: Transport + ?Sized>(
    transport: &T,
    site: &SiteProfile,
) -> Result<Vec<ListedItem>> {
    let listing_url = site.listing_url()?;
    let html = transport.get_text(&listing_url)?;
    parse_listing(&html, site)
}

/// Items are returned in document order, which the site keeps newest-first.
/// A card without a usable link is kept with `detail_url: None`; whether
/// that matters is decided by the catch-up window.
pub fn parse_listing(html: &str, site: &SiteProfile) -> Result<Vec<ListedItem>> {
    let item_selector = compile_selector(&site.listing_item)?;
    let date_selector = compile_selector(&site.listing_date)?;
    let link_selector = compile_selector(&site.listing_link)?;

    let document = Html::parse_document(html);
    let mut items = Vec::new();

    for (index, item) in document.select(&item_selector).enumerate() {
        let date_text = item
            .select(&date_selector)
            .next()
            .map(|el| el.text().collect::<String>())
            .ok_or_else(|| {
                SyncError::Parse(format!(
                    "listing item #{index} has no {:?} element",
                    site.listing_date
                ))
            })?;
        let date = site.parse_listing_date(&date_text)?;

        let detail_url = item
            .select(&link_selector)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .and_then(|href| site.resolve(href).ok());

        items.push(ListedItem { date, detail_url });
    }

    if items.is_empty() {
        return Err(SyncError::Parse(format!(
            "listing page has no {:?} items",
            site.listing_item
        )));
    }

    Ok(items)
}
