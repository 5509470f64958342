//! Streaming checks. Each runs once; none retries.

use reqwest::header::{ACCEPT_LANGUAGE, LOCATION, USER_AGENT};
use reqwest::StatusCode;
use tracing::debug;

use super::geo::{embedded_field, PageField};
use super::{Found, ProbeError, ProbeSession, DESKTOP_UA};

pub const NETFLIX_FULL: &str = "Full";
pub const NETFLIX_ORIGINALS: &str = "Originals Only";
pub const YOUTUBE_PREMIUM: &str = "Premium Available";

const NETFLIX_FULL_KEYWORD: &str = "Breaking Bad";
const NETFLIX_ORIGINALS_KEYWORD: &str = "Squid Game";
/// Generic player marker present on any playable title page.
const NETFLIX_WATCH_MARKER: &str = "watch-video";
/// Final URLs Netflix lands on when a title is not in the local catalog.
const NETFLIX_DENY_PATHS: &[&str] = &["/browse/genre/", "NotAvailable"];

const DISNEY_DENY_PATHS: &[&str] = &["/preview", "/unavailable"];

const MAX_DENY: &[&str] = &["Not Available in your region", "GeoBlock"];

/// Outcome of loading one Netflix title page.
struct TitlePage {
    playable: bool,
    region: Option<String>,
}

impl ProbeSession {
    /// Two-tier catalog detection: a licensed title means the full catalog,
    /// an original alone means originals only.
    pub(crate) async fn check_netflix(&self) -> Result<Found, ProbeError> {
        let mut region = None;

        let tiers = [
            (&self.endpoints.netflix_full, NETFLIX_FULL_KEYWORD, NETFLIX_FULL),
            (
                &self.endpoints.netflix_originals,
                NETFLIX_ORIGINALS_KEYWORD,
                NETFLIX_ORIGINALS,
            ),
        ];

        for (url, keyword, tier) in tiers {
            let page = self.netflix_title(url, keyword).await;
            if page.region.is_some() {
                region = page.region;
            }
            if page.playable {
                if region.is_none() {
                    region = self.country_by_ip().await;
                }
                return Ok(Found {
                    region,
                    detail: Some(tier.to_string()),
                });
            }
        }

        Err(ProbeError::Unavailable { region })
    }

    async fn netflix_title(&self, url: &str, keyword: &str) -> TitlePage {
        let mut page = TitlePage {
            playable: false,
            region: None,
        };

        let resp = match self.client.get(url).header(USER_AGENT, DESKTOP_UA).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(%url, error = %e, "netflix title request failed");
                return page;
            }
        };
        if resp.status() != StatusCode::OK {
            return page;
        }
        let final_url = resp.url().to_string();
        if NETFLIX_DENY_PATHS.iter().any(|p| final_url.contains(p)) {
            return page;
        }

        let body = match resp.text().await {
            Ok(b) => b,
            Err(_) => return page,
        };
        page.region = embedded_field(&body, PageField::CurrentCountry);
        page.playable = body.contains(keyword) || body.contains(NETFLIX_WATCH_MARKER);
        page
    }

    /// The landing page redirects to a localized home in supported regions
    /// and to a preview/unavailable page elsewhere.
    pub(crate) async fn check_disney(&self) -> Result<Found, ProbeError> {
        let resp = self
            .no_redirect
            .get(&self.endpoints.disney_home)
            .header(USER_AGENT, DESKTOP_UA)
            .send()
            .await?;
        let code = resp.status();

        if code == StatusCode::MOVED_PERMANENTLY || code == StatusCode::FOUND {
            let location = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if DISNEY_DENY_PATHS.iter().any(|p| location.contains(p)) {
                return Err(ProbeError::UnsupportedRegion("redirected to preview/unavailable"));
            }
            return Ok(Found::in_region(self.country_by_ip().await));
        }
        if code == StatusCode::OK {
            return Ok(Found::in_region(self.country_by_ip().await));
        }
        if code == StatusCode::FORBIDDEN {
            return Err(ProbeError::Blocked { status: 403 });
        }
        Err(ProbeError::UnexpectedStatus(code.as_u16()))
    }

    pub(crate) async fn check_youtube(&self) -> Result<Found, ProbeError> {
        let resp = self
            .client
            .get(&self.endpoints.youtube_home)
            .header(USER_AGENT, DESKTOP_UA)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(ProbeError::UnexpectedStatus(resp.status().as_u16()));
        }

        let body = resp.text().await?;
        let mut region = embedded_field(&body, PageField::CountryCode)
            .or_else(|| embedded_field(&body, PageField::IsoCountryCode));
        if region.is_none() {
            region = self.country_by_ip().await;
        }

        Ok(Found {
            region,
            detail: body
                .contains("Premium")
                .then(|| YOUTUBE_PREMIUM.to_string()),
        })
    }

    pub(crate) async fn check_max(&self) -> Result<Found, ProbeError> {
        let resp = self
            .client
            .get(&self.endpoints.max_home)
            .header(USER_AGENT, DESKTOP_UA)
            .send()
            .await?;
        let code = resp.status();

        if code == StatusCode::FORBIDDEN || code == StatusCode::METHOD_NOT_ALLOWED {
            return Err(ProbeError::Blocked {
                status: code.as_u16(),
            });
        }
        if code != StatusCode::OK {
            return Err(ProbeError::UnexpectedStatus(code.as_u16()));
        }

        let body = resp.text().await?;
        if MAX_DENY.iter().any(|kw| body.contains(kw)) {
            return Err(ProbeError::UnsupportedRegion("geo blocked"));
        }
        Ok(Found::in_region(self.country_by_ip().await))
    }
}
