//! Country lookup helpers shared by the checks.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::ProbeSession;

#[derive(Deserialize)]
struct GeoIp {
    #[serde(rename = "countryCode", default)]
    country_code: String,
}

/// Country fields that pages embed in inline JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageField {
    /// Netflix `"current_country"`.
    CurrentCountry,
    /// YouTube `"countryCode"`.
    CountryCode,
    /// YouTube `"ISO_COUNTRY_CODE"`, the older spelling.
    IsoCountryCode,
}

impl PageField {
    fn pattern(self) -> &'static Regex {
        static CURRENT_COUNTRY: OnceLock<Regex> = OnceLock::new();
        static COUNTRY_CODE: OnceLock<Regex> = OnceLock::new();
        static ISO_COUNTRY_CODE: OnceLock<Regex> = OnceLock::new();

        let (cell, name) = match self {
            PageField::CurrentCountry => (&CURRENT_COUNTRY, "current_country"),
            PageField::CountryCode => (&COUNTRY_CODE, "countryCode"),
            PageField::IsoCountryCode => (&ISO_COUNTRY_CODE, "ISO_COUNTRY_CODE"),
        };
        cell.get_or_init(|| Regex::new(&format!(r#""{name}":"(.*?)""#)).expect("static regex"))
    }
}

/// First non-empty capture of a `"<field>":"<value>"` pair embedded in a page.
pub fn embedded_field(body: &str, field: PageField) -> Option<String> {
    field
        .pattern()
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty())
}

impl ProbeSession {
    /// Ask the geolocation endpoint, through the same proxy, where the exit
    /// lives. Failures are swallowed: the region is best effort.
    pub(crate) async fn country_by_ip(&self) -> Option<String> {
        let resp = match self.client.get(&self.endpoints.geo_ip).send().await {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "geo lookup failed");
                return None;
            }
        };
        match resp.json::<GeoIp>().await {
            Ok(geo) if !geo.country_code.is_empty() => Some(geo.country_code),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "geo lookup returned unreadable body");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::tests::session_for;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_embedded_field() {
        let body = r#"<script>{"foo":1,"current_country":"JP","countryCode":"SG"}</script>"#;
        assert_eq!(embedded_field(body, PageField::CurrentCountry).as_deref(), Some("JP"));
        assert_eq!(embedded_field(body, PageField::CountryCode).as_deref(), Some("SG"));
        assert_eq!(embedded_field(body, PageField::IsoCountryCode), None);
        assert_eq!(
            embedded_field(r#"{"ISO_COUNTRY_CODE":"DE"}"#, PageField::IsoCountryCode).as_deref(),
            Some("DE")
        );
    }

    #[test]
    fn test_empty_embedded_field_is_none() {
        assert_eq!(embedded_field(r#"{"countryCode":""}"#, PageField::CountryCode), None);
    }

    #[tokio::test]
    async fn test_country_by_ip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"countryCode": "HK"})))
            .mount(&server)
            .await;

        assert_eq!(session_for(&server).country_by_ip().await.as_deref(), Some("HK"));
    }

    #[tokio::test]
    async fn test_country_by_ip_tolerates_garbage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/geo"))
            .respond_with(ResponseTemplate::new(200).set_body_string("rate limited"))
            .mount(&server)
            .await;

        assert_eq!(session_for(&server).country_by_ip().await, None);
    }
}
