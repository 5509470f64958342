//! Per-worker mihomo configuration file.

use std::path::Path;

use serde::Serialize;

use crate::core::CoreError;
use crate::source::Route;

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct MihomoConfig<'a> {
    port: u16,
    socks_port: u16,
    allow_lan: bool,
    mode: &'static str,
    log_level: &'static str,
    external_controller: String,
    proxies: &'a [Route],
    proxy_groups: [ProxyGroup<'a>; 1],
    rules: [String; 1],
}

#[derive(Serialize)]
struct ProxyGroup<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    proxies: Vec<&'a str>,
}

/// Render the config: every route, one `select` group listing them all, and
/// a catch-all rule through that group.
pub fn render(routes: &[Route], group: &str, port: u16, api_port: u16) -> Result<String, serde_yaml::Error> {
    let config = MihomoConfig {
        port,
        socks_port: port.saturating_add(1),
        allow_lan: false,
        mode: "global",
        log_level: "silent",
        external_controller: format!("127.0.0.1:{}", api_port),
        proxies: routes,
        proxy_groups: [ProxyGroup {
            name: group,
            kind: "select",
            proxies: routes.iter().map(|r| r.name.as_str()).collect(),
        }],
        rules: [format!("MATCH,{}", group)],
    };
    serde_yaml::to_string(&config)
}

/// Render and write the config for one worker.
pub fn write_config(
    routes: &[Route],
    path: &Path,
    group: &str,
    port: u16,
    api_port: u16,
) -> Result<(), CoreError> {
    let rendered = render(routes, group, port, api_port).map_err(|e| CoreError::ConfigWrite {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    std::fs::write(path, rendered).map_err(|e| CoreError::ConfigWrite {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes() -> Vec<Route> {
        crate::source::parse(
            br#"
proxies:
  - {name: a, type: ss, server: a.example.com, port: 8388, cipher: aes-128-gcm, password: p}
  - {name: b, type: trojan, server: b.example.com, port: 443, password: q, sni: b.example.com}
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_render_layout() {
        let yaml = render(&routes(), "GLOBAL", 7900, 9091).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(doc["port"].as_u64(), Some(7900));
        assert_eq!(doc["socks-port"].as_u64(), Some(7901));
        assert_eq!(doc["allow-lan"].as_bool(), Some(false));
        assert_eq!(doc["mode"].as_str(), Some("global"));
        assert_eq!(doc["external-controller"].as_str(), Some("127.0.0.1:9091"));

        let group = &doc["proxy-groups"][0];
        assert_eq!(group["name"].as_str(), Some("GLOBAL"));
        assert_eq!(group["type"].as_str(), Some("select"));
        let members: Vec<&str> = group["proxies"]
            .as_sequence()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(members, vec!["a", "b"]);

        assert_eq!(doc["rules"][0].as_str(), Some("MATCH,GLOBAL"));
        assert_eq!(doc["proxies"][1]["sni"].as_str(), Some("b.example.com"));
    }

    #[test]
    fn test_write_config_to_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("worker.yaml");
        let err = write_config(&routes(), &path, "GLOBAL", 7890, 9090).unwrap_err();
        assert!(matches!(err, CoreError::ConfigWrite { .. }));
    }
}
