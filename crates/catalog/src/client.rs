use std::sync::OnceLock;
use std::time::Duration;

use reqwest::ClientBuilder;
use tracing::debug;

use crate::extractor::DEFAULT_UA;

/// Install the aws-lc-rs rustls provider exactly once per process.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Base client builder used by every catalog backend.
///
/// `timeout` of `None` or zero leaves the request timeout unset.
pub fn create_client_builder(timeout: Option<Duration>) -> ClientBuilder {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder()
        .user_agent(DEFAULT_UA)
        .connect_timeout(Duration::from_secs(15))
        .pool_idle_timeout(Duration::from_secs(90));

    if let Some(timeout) = timeout.filter(|t| !t.is_zero()) {
        builder = builder.timeout(timeout);
    }

    builder
}

/// Build a ready client with the given request timeout.
pub fn default_client(timeout: Option<Duration>) -> Result<reqwest::Client, reqwest::Error> {
    create_client_builder(timeout).build()
}
