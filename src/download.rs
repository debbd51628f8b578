use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::encoder;
use crate::error::{FluxError, Result};
use crate::http;
use crate::types::{ApiKey, ImageLocator};

/// Materialize a locator into image bytes.
///
/// Inline data is decoded locally. Remote URLs are downloaded; result URLs
/// are typically pre-signed, the key is only attached when given.
pub async fn fetch_image(
    client: &Client,
    locator: &ImageLocator,
    key: Option<&ApiKey>,
) -> Result<Vec<u8>> {
    let url = match locator {
        ImageLocator::Base64(data) => return encoder::decode(data),
        ImageLocator::Url(url) => url,
    };

    let mut request = client.get(url).timeout(Duration::from_secs(120));
    if let Some(key) = key {
        request = request.header("x-key", key.expose());
    }
    let resp = http::send(request, "Failed to download generated image").await?;

    if !resp.status().is_success() {
        let (status, message) = http::failure(resp).await;
        return Err(FluxError::Download { status, message });
    }

    let bytes = resp.bytes().await.map_err(|e| FluxError::Network {
        context: "Failed to read image bytes".into(),
        source: e,
    })?;
    debug!(bytes = bytes.len(), "downloaded generated image");
    Ok(bytes.to_vec())
}
