//! Optional shared-secret authentication for the proxy endpoints.

use axum::http::HeaderMap;

/// Header carrying the caller's API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// API key gate. With no key configured every caller is admitted.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyAuth {
    required: Option<String>,
}

impl ApiKeyAuth {
    /// An empty key is treated the same as no key.
    pub fn new(key: Option<String>) -> Self {
        Self {
            required: key.filter(|k| !k.is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.required.is_some()
    }

    pub fn check(&self, headers: &HeaderMap) -> bool {
        let Some(required) = &self.required else {
            return true;
        };
        let provided = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        provided == required
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_open_access_without_key() {
        assert!(ApiKeyAuth::new(None).check(&HeaderMap::new()));
        assert!(ApiKeyAuth::new(Some(String::new())).check(&HeaderMap::new()));
        assert!(!ApiKeyAuth::new(Some(String::new())).is_enabled());
    }

    #[test]
    fn test_key_must_match() {
        let auth = ApiKeyAuth::new(Some("s3cret".into()));
        let mut headers = HeaderMap::new();
        assert!(!auth.check(&headers));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("wrong"));
        assert!(!auth.check(&headers));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("s3cret"));
        assert!(auth.check(&headers));
    }
}
