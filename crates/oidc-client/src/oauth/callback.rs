//! Read-only view of the inbound redirect from the provider.

use url::Url;

/// Accessors the client needs from the inbound HTTP request.
///
/// Implemented by whatever server framework receives the redirect; the client
/// only ever reads from it.
pub trait CallbackRequest {
    /// Value of a query parameter, if present.
    fn query_param(&self, name: &str) -> Option<String>;

    /// Request scheme (`http` or `https`).
    fn scheme(&self) -> &str;

    /// Request host, including a non-default port.
    fn host(&self) -> Option<&str>;

    /// `scheme://host` of the request, used to complete path-only redirect URIs.
    fn origin(&self) -> Option<Url> {
        let host = self.host()?;
        Url::parse(&format!("{}://{}", self.scheme(), host)).ok()
    }
}

/// A callback request reconstructed from its full URL.
#[derive(Debug, Clone)]
pub struct CallbackUrl {
    url: Url,
    host: Option<String>,
}

impl CallbackUrl {
    /// Parse a full callback URL such as `https://app.example.com/cb?code=..&state=..`.
    ///
    /// # Errors
    ///
    /// Returns error if the URL does not parse.
    pub fn parse(raw: &str) -> Result<Self, url::ParseError> {
        Ok(Self::from(Url::parse(raw)?))
    }

    /// The underlying URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

impl From<Url> for CallbackUrl {
    fn from(url: Url) -> Self {
        let host = url.host_str().map(|h| match url.port() {
            Some(port) => format!("{h}:{port}"),
            None => h.to_string(),
        });
        Self { url, host }
    }
}

impl CallbackRequest for CallbackUrl {
    fn query_param(&self, name: &str) -> Option<String> {
        self.url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.into_owned())
    }

    fn scheme(&self) -> &str {
        self.url.scheme()
    }

    fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params_are_decoded() {
        let cb = CallbackUrl::parse("https://app.example.com/cb?code=a%2Fb&state=xyz&empty=").unwrap();
        assert_eq!(cb.query_param("code").as_deref(), Some("a/b"));
        assert_eq!(cb.query_param("state").as_deref(), Some("xyz"));
        assert_eq!(cb.query_param("empty").as_deref(), Some(""));
        assert_eq!(cb.query_param("missing"), None);
    }

    #[test]
    fn test_origin_keeps_port() {
        let cb = CallbackUrl::parse("http://localhost:8080/auth/cb?code=1").unwrap();
        assert_eq!(cb.scheme(), "http");
        assert_eq!(cb.host(), Some("localhost:8080"));
        assert_eq!(cb.origin().unwrap().as_str(), "http://localhost:8080/");
    }

    #[test]
    fn test_default_port_is_omitted() {
        let cb = CallbackUrl::parse("https://app.example.com:443/cb").unwrap();
        assert_eq!(cb.host(), Some("app.example.com"));
    }
}
