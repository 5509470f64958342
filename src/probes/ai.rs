//! API-style checks: trace token, redirect inspection, page keywords.

use reqwest::header::{LOCATION, USER_AGENT};
use reqwest::StatusCode;

use super::{Found, ProbeError, ProbeSession, DESKTOP_UA, MAC_UA};

/// Redirect targets that mean the app is reachable but wants a login.
const GEMINI_ALLOW: &[&str] = &["accounts.google.com"];

/// Page texts served instead of the login page in unsupported regions.
const CLAUDE_DENY: &[&str] = &[
    "app unavailable",
    "unavailable in your country",
    "coming soon",
];

impl ProbeSession {
    /// Cloudflare trace: the body must carry a `loc=` line.
    pub(crate) async fn check_openai(&self, status: &mut Option<u16>) -> Result<Found, ProbeError> {
        let resp = self
            .client
            .get(&self.endpoints.openai_trace)
            .header(USER_AGENT, DESKTOP_UA)
            .send()
            .await?;
        *status = Some(resp.status().as_u16());

        match resp.status() {
            StatusCode::OK => {}
            StatusCode::FORBIDDEN => return Err(ProbeError::Blocked { status: 403 }),
            other => return Err(ProbeError::UnexpectedStatus(other.as_u16())),
        }

        let body = resp.text().await?;
        trace_location(&body)
            .map(|loc| Found::in_region(Some(loc)))
            .ok_or(ProbeError::MarkerNotFound("trace location"))
    }

    /// The app page either loads, or redirects to the account login when the
    /// region is supported. Any other redirect is a regional refusal.
    pub(crate) async fn check_gemini(&self, status: &mut Option<u16>) -> Result<Found, ProbeError> {
        let resp = self
            .no_redirect
            .get(&self.endpoints.gemini_app)
            .header(USER_AGENT, MAC_UA)
            .send()
            .await?;
        let code = resp.status();
        *status = Some(code.as_u16());

        if code == StatusCode::OK {
            return Ok(Found::in_region(self.country_by_ip().await));
        }
        if code == StatusCode::MOVED_PERMANENTLY || code == StatusCode::FOUND {
            let location = resp
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if GEMINI_ALLOW.iter().any(|p| location.contains(p)) {
                return Ok(Found::in_region(self.country_by_ip().await));
            }
            return Err(ProbeError::UnsupportedRegion("redirected to unsupported page"));
        }
        if code == StatusCode::FORBIDDEN || code == StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS {
            return Err(ProbeError::RegionBlocked {
                status: code.as_u16(),
            });
        }
        Err(ProbeError::UnexpectedStatus(code.as_u16()))
    }

    /// Login page must load without any of the regional-refusal texts.
    pub(crate) async fn check_claude(&self, status: &mut Option<u16>) -> Result<Found, ProbeError> {
        let resp = self
            .client
            .get(&self.endpoints.claude_login)
            .header(USER_AGENT, MAC_UA)
            .send()
            .await?;
        *status = Some(resp.status().as_u16());

        match resp.status() {
            StatusCode::OK => {}
            StatusCode::FORBIDDEN => return Err(ProbeError::Blocked { status: 403 }),
            other => return Err(ProbeError::UnexpectedStatus(other.as_u16())),
        }

        let body = resp.text().await?.to_lowercase();
        if CLAUDE_DENY.iter().any(|kw| body.contains(kw)) {
            return Err(ProbeError::UnsupportedRegion("service not offered here"));
        }
        Ok(Found::in_region(self.country_by_ip().await))
    }
}

fn trace_location(body: &str) -> Option<String> {
    body.lines()
        .find_map(|line| line.trim().strip_prefix("loc="))
        .map(|loc| loc.trim().to_string())
        .filter(|loc| !loc.is_empty())
}
