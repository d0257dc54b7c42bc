use axum::http::{header, HeaderMap};

/// Resolves the externally visible origin for install links.
///
/// A configured base URL always wins. Otherwise the scheme comes from the
/// `x-forwarded-proto` header (or the connection itself), the host from the
/// literal `Host` header with unexpected characters stripped, and the port
/// from a numeric `x-forwarded-port` unless it is the scheme default or the
/// host already names one. Forwarded host headers are deliberately ignored;
/// only the proxy-facing Host value is trusted.
pub fn resolve_base_url(configured: &str, headers: &HeaderMap, secure: bool) -> String {
    let configured = configured.trim().trim_end_matches('/');
    if !configured.is_empty() {
        return configured.to_string();
    }

    let forwarded_https = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or("").trim() == "https")
        .unwrap_or(false);
    let scheme = if secure || forwarded_https {
        "https"
    } else {
        "http"
    };

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(sanitize_host)
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());

    let mut base = format!("{scheme}://{host}");

    if !host.contains(':') {
        if let Some(port) = forwarded_port(headers) {
            let is_default = (scheme == "https" && port == "443") || (scheme == "http" && port == "80");
            if !is_default {
                base.push(':');
                base.push_str(&port);
            }
        }
    }
    base
}

/// Keeps only the characters a hostname (with optional port) can contain.
fn sanitize_host(host: &str) -> String {
    host.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'))
        .collect()
}

fn forwarded_port(headers: &HeaderMap) -> Option<String> {
    let port = headers
        .get("x-forwarded-port")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim();
    if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(port.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn configured_override_wins() {
        let h = headers(&[("host", "internal:3000"), ("x-forwarded-proto", "http")]);
        assert_eq!(
            resolve_base_url("https://pkg.example.com/", &h, false),
            "https://pkg.example.com"
        );
    }

    #[test]
    fn plain_host_over_http() {
        let h = headers(&[("host", "example.com")]);
        assert_eq!(resolve_base_url("", &h, false), "http://example.com");
    }

    #[test]
    fn forwarded_proto_upgrades_scheme() {
        let h = headers(&[("host", "example.com"), ("x-forwarded-proto", "https")]);
        assert_eq!(resolve_base_url("", &h, false), "https://example.com");
    }

    #[test]
    fn secure_connection_upgrades_scheme() {
        let h = headers(&[("host", "example.com")]);
        assert_eq!(resolve_base_url("", &h, true), "https://example.com");
    }

    #[test]
    fn host_with_port_is_kept_verbatim() {
        let h = headers(&[("host", "example.com:8443"), ("x-forwarded-proto", "https")]);
        assert_eq!(resolve_base_url("", &h, false), "https://example.com:8443");
    }

    #[test]
    fn forwarded_port_is_appended() {
        let h = headers(&[
            ("host", "example.com"),
            ("x-forwarded-proto", "https"),
            ("x-forwarded-port", "8443"),
        ]);
        assert_eq!(resolve_base_url("", &h, false), "https://example.com:8443");
    }

    #[test]
    fn default_ports_are_omitted() {
        let https = headers(&[
            ("host", "example.com"),
            ("x-forwarded-proto", "https"),
            ("x-forwarded-port", "443"),
        ]);
        assert_eq!(resolve_base_url("", &https, false), "https://example.com");

        let http = headers(&[("host", "example.com"), ("x-forwarded-port", "80")]);
        assert_eq!(resolve_base_url("", &http, false), "http://example.com");
    }

    #[test]
    fn host_port_is_not_overridden_by_forwarded_port() {
        let h = headers(&[("host", "example.com:9000"), ("x-forwarded-port", "8443")]);
        assert_eq!(resolve_base_url("", &h, false), "http://example.com:9000");
    }

    #[test]
    fn non_numeric_forwarded_port_is_ignored() {
        let h = headers(&[("host", "example.com"), ("x-forwarded-port", "eight")]);
        assert_eq!(resolve_base_url("", &h, false), "http://example.com");
    }

    #[test]
    fn host_markup_is_stripped() {
        let h = headers(&[("host", "example.com/<script>")]);
        assert_eq!(resolve_base_url("", &h, false), "http://example.comscript");
    }

    #[test]
    fn missing_host_falls_back_to_localhost() {
        let h = headers(&[]);
        assert_eq!(resolve_base_url("", &h, false), "http://localhost");
    }
}
