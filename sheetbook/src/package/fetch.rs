//! Package bytes from an HTTP(S) URL

use crate::config::EngineConfig;
use crate::error::{Error, Result};

#[cfg(feature = "remote")]
pub(crate) fn fetch(url: &str, config: &EngineConfig) -> Result<Vec<u8>> {
    use reqwest::blocking::Client;

    let unavailable = |e: reqwest::Error| Error::SourceUnavailable(format!("{}: {}", url, e));
    let client = Client::builder()
        .timeout(config.url_timeout())
        .build()
        .map_err(unavailable)?;
    let response = client.get(url).send().map_err(unavailable)?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::SourceUnavailable(format!("{}: HTTP {}", url, status)));
    }
    let bytes = response.bytes().map_err(unavailable)?;
    log::debug!("fetched {} bytes from {}", bytes.len(), url);
    Ok(bytes.to_vec())
}

#[cfg(not(feature = "remote"))]
pub(crate) fn fetch(url: &str, _config: &EngineConfig) -> Result<Vec<u8>> {
    Err(Error::SourceUnavailable(format!(
        "{}: built without the `remote` feature",
        url
    )))
}
