use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use rustc_hash::FxHashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::error::CatalogError;

pub(crate) const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Base HTTP state shared by catalog backends.
///
/// Each instance carries its own default headers and cookie store; every
/// request built through [`Extractor::request`] gets both attached.
#[derive(Debug, Clone)]
pub struct Extractor {
    /// Human readable backend name, used in logs.
    pub platform_name: String,
    pub client: Client,
    platform_headers: HeaderMap,
    pub cookies: FxHashMap<String, String>,
}

impl Extractor {
    pub fn new(platform_name: impl Into<String>, client: Client) -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static(DEFAULT_UA),
        );
        default_headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        default_headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );

        Self {
            platform_name: platform_name.into(),
            client,
            platform_headers: default_headers,
            cookies: FxHashMap::default(),
        }
    }

    /// Set `Origin` and `Referer` to the catalog web origin.
    pub fn set_origin_and_referer(&mut self, origin: &str) {
        self.add_header(reqwest::header::ORIGIN.as_str(), origin);
        self.add_header(reqwest::header::REFERER.as_str(), format!("{origin}/"));
    }

    /// Insert an arbitrary header. Invalid names or values are skipped.
    pub fn add_header<K: AsRef<str>, V: AsRef<str>>(&mut self, key: K, value: V) {
        match HeaderName::from_str(key.as_ref()) {
            Ok(name) => match HeaderValue::from_str(value.as_ref()) {
                Ok(value) => {
                    self.platform_headers.insert(name, value);
                }
                Err(e) => {
                    debug!(error = %e, "Invalid header value; skipping");
                }
            },
            Err(e) => {
                debug!(error = %e, "Invalid header name; skipping");
            }
        }
    }

    pub fn get_cookie(&self, name: &str) -> Option<&String> {
        self.cookies.get(name)
    }

    /// Set cookies from a cookie string (format: "name1=value1; name2=value2").
    pub fn set_cookies_from_string(&mut self, cookie_string: &str) {
        // Accept common separators: ';' from Cookie headers and '\n' from copy/paste.
        for part in cookie_string.split(&[';', '\n'][..]).map(str::trim) {
            if part.is_empty() {
                continue;
            }

            let Some((name, value)) = part.split_once('=') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() || value.is_empty() {
                continue;
            }

            self.cookies.insert(name.to_owned(), value.to_owned());
        }
    }

    /// Load cookies from a Netscape `cookies.txt` export, keeping only entries
    /// whose domain matches `domain_suffix`.
    ///
    /// Returns the number of cookies stored.
    pub async fn load_netscape_cookies(
        &mut self,
        path: &Path,
        domain_suffix: &str,
    ) -> Result<usize, CatalogError> {
        let content = tokio::fs::read_to_string(path).await?;
        let cookies = parse_netscape_cookies(&content, domain_suffix);
        let count = cookies.len();
        self.cookies.extend(cookies);
        debug!(
            platform = %self.platform_name,
            path = %path.display(),
            count,
            "Loaded cookies file"
        );
        Ok(count)
    }

    fn build_cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }

        let mut cookie_string = String::with_capacity(
            self.cookies
                .iter()
                .map(|(k, v)| k.len() + 1 + v.len() + 2)
                .sum(),
        );

        for (name, value) in &self.cookies {
            if !cookie_string.is_empty() {
                cookie_string.push_str("; ");
            }
            cookie_string.push_str(name);
            cookie_string.push('=');
            cookie_string.push_str(value);
        }

        Some(cookie_string)
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Create an HTTP request with the platform headers and stored cookies attached.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut headers = self.platform_headers.clone();

        if let Some(cookie_header) = self.build_cookie_header() {
            match HeaderValue::from_str(&cookie_header) {
                Ok(value) => {
                    headers.insert(reqwest::header::COOKIE, value);
                }
                Err(e) => {
                    debug!(error = %e, "Failed to build Cookie header");
                }
            }
        }

        self.client.request(method, url).headers(headers)
    }
}

/// Parse the tab separated Netscape cookie format.
///
/// Lines are `domain  flag  path  secure  expiry  name  value`. Comment lines
/// are skipped except for the `#HttpOnly_` domain prefix curl writes.
pub fn parse_netscape_cookies(content: &str, domain_suffix: &str) -> FxHashMap<String, String> {
    let mut cookies = FxHashMap::default();

    for line in content.lines() {
        let line = line.trim_end_matches(['\r', '\n']);
        let line = match line.strip_prefix("#HttpOnly_") {
            Some(rest) => rest,
            None if line.starts_with('#') || line.trim().is_empty() => continue,
            None => line,
        };

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 7 {
            continue;
        }

        let domain = fields[0].trim_start_matches('.');
        let suffix = domain_suffix.trim_start_matches('.');
        if !suffix.is_empty() && domain != suffix && !domain.ends_with(&format!(".{suffix}")) {
            continue;
        }

        let name = fields[5].trim();
        let value = fields[6].trim();
        if name.is_empty() {
            continue;
        }
        cookies.insert(name.to_owned(), value.to_owned());
    }

    cookies
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOKIES: &str = "# Netscape HTTP Cookie File\n\
        .apple.com\tTRUE\t/\tTRUE\t1999999999\tmedia-user-token\tabc123\n\
        #HttpOnly_.music.apple.com\tTRUE\t/\tTRUE\t0\titspod\t42\n\
        .example.org\tTRUE\t/\tFALSE\t0\tother\tzzz\n\
        malformed line\n";

    #[test]
    fn netscape_cookies_filtered_by_domain() {
        let cookies = parse_netscape_cookies(COOKIES, "apple.com");
        assert_eq!(cookies.get("media-user-token").map(String::as_str), Some("abc123"));
        assert_eq!(cookies.get("itspod").map(String::as_str), Some("42"));
        assert!(!cookies.contains_key("other"));
        assert_eq!(cookies.len(), 2);
    }

    #[test]
    fn empty_suffix_keeps_every_cookie() {
        let cookies = parse_netscape_cookies(COOKIES, "");
        assert_eq!(cookies.len(), 3);
    }

    #[test]
    fn cookie_string_is_split_on_separators() {
        let mut extractor = Extractor::new("Test", crate::client::default_client(None).unwrap());
        extractor.set_cookies_from_string("a=1; b=2\nc=3; broken; d=");
        assert_eq!(extractor.get_cookie("a").map(String::as_str), Some("1"));
        assert_eq!(extractor.get_cookie("c").map(String::as_str), Some("3"));
        assert!(extractor.get_cookie("d").is_none());
        assert_eq!(extractor.cookies.len(), 3);
    }

    #[tokio::test]
    async fn load_cookies_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        tokio::fs::write(&path, COOKIES).await.unwrap();

        let mut extractor = Extractor::new("Test", crate::client::default_client(None).unwrap());
        let count = extractor
            .load_netscape_cookies(&path, "apple.com")
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert!(extractor.get_cookie("media-user-token").is_some());
    }

    #[tokio::test]
    async fn missing_cookie_file_is_io_error() {
        let mut extractor = Extractor::new("Test", crate::client::default_client(None).unwrap());
        let err = extractor
            .load_netscape_cookies(Path::new("/definitely/not/here.txt"), "apple.com")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::IoError(_)));
    }
}
