use anyhow::Context;
use axum::http::{HeaderMap, HeaderName};

use crate::progress::model::CallerIdentity;

/// Resolves the verified caller of a request, if any.
pub trait IdentityProvider: Send + Sync {
    fn identify(&self, headers: &HeaderMap) -> Option<CallerIdentity>;
}

/// Trusts a header set by the authenticating gateway in front of this
/// service. The gateway verifies the caller's token and must strip any
/// client-supplied copy of the header.
pub struct GatewayHeaderIdentity {
    header: HeaderName,
}

impl GatewayHeaderIdentity {
    pub fn new(header: &str) -> anyhow::Result<Self> {
        let header = HeaderName::from_bytes(header.to_ascii_lowercase().as_bytes())
            .with_context(|| format!("invalid identity header name: {header}"))?;
        Ok(Self { header })
    }
}

impl IdentityProvider for GatewayHeaderIdentity {
    fn identify(&self, headers: &HeaderMap) -> Option<CallerIdentity> {
        let value = headers.get(&self.header)?.to_str().ok()?.trim();
        if value.is_empty() {
            return None;
        }
        Some(CallerIdentity::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn provider() -> GatewayHeaderIdentity {
        GatewayHeaderIdentity::new("X-Verified-User-Id").unwrap()
    }

    #[test]
    fn reads_the_configured_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-verified-user-id", HeaderValue::from_static(" u1 "));

        assert_eq!(provider().identify(&headers), Some(CallerIdentity::new("u1")));
    }

    #[test]
    fn absent_or_blank_header_is_anonymous() {
        assert_eq!(provider().identify(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert("x-verified-user-id", HeaderValue::from_static("   "));
        assert_eq!(provider().identify(&headers), None);
    }

    #[test]
    fn non_utf8_header_is_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-verified-user-id",
            HeaderValue::from_bytes(&[0xff, 0xfe]).unwrap(),
        );
        assert_eq!(provider().identify(&headers), None);
    }

    #[test]
    fn rejects_invalid_header_names() {
        assert!(GatewayHeaderIdentity::new("bad header").is_err());
    }
}
