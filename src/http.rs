use crate::config::SiteProfile;
use crate::{Result, SyncError};
use std::io::Read;
use std::time::Duration;
use url::Url;

/// The network side of a sync run. Everything the engine fetches goes
/// through here, which keeps the catch-up logic testable offline.
pub trait Transport {
    /// GETs a page and returns its body; non-2xx is a `Fetch` error.
    fn get_text(&self, url: &Url) -> Result<String>;

    /// GETs a binary resource and hands back a reader over its body.
    fn get_stream(&self, url: &Url) -> Result<Box<dyn Read>>;
}

pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(site: &SiteProfile) -> Self {
        Self {
            agent: build_http_agent(site.http_timeout_secs, &site.user_agent),
        }
    }

    fn call(&self, url: &Url) -> Result<ureq::http::Response<ureq::Body>> {
        let response = self
            .agent
            .get(url.as_str())
            .call()
            .map_err(|err| fetch_error(url, format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_error(url, format!("http {}", status.as_u16())));
        }
        Ok(response)
    }
}

impl Transport for HttpTransport {
    fn get_text(&self, url: &Url) -> Result<String> {
        log::debug!("GET {url}");
        let mut response = self.call(url)?;
        response
            .body_mut()
            .read_to_string()
            .map_err(|err| fetch_error(url, format!("failed reading response body: {err}")))
    }

    fn get_stream(&self, url: &Url) -> Result<Box<dyn Read>> {
        log::debug!("GET {url} (stream)");
        let response = self.call(url)?;
        Ok(Box::new(response.into_body().into_reader()))
    }
}

/// Status codes are left to `call`, which turns a non-2xx into a `Fetch`
/// error naming the url; ureq's own status error would not. The timeout
/// covers the whole exchange, body included, so a stalled image download
/// cannot hang a scheduled run.
fn build_http_agent(timeout_secs: u64, user_agent: &str) -> ureq::Agent {
    let mut config = ureq::Agent::config_builder();
    config = config
        .http_status_as_error(false)
        .timeout_global(Some(Duration::from_secs(timeout_secs.max(1))))
        .user_agent(user_agent);
    config.build().into()
}

pub(crate) fn fetch_error(url: &Url, detail: impl Into<String>) -> SyncError {
    SyncError::Fetch {
        url: url.to_string(),
        detail: detail.into(),
    }
}
