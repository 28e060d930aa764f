//! URL validation for signal delivery endpoints.

use crate::error::DemuxError;

/// Validate a signal delivery URL.
///
/// Checks:
/// 1. URL is parseable
/// 2. Scheme is HTTPS (or HTTP if `allow_http` is true for dev/test)
/// 3. URL has a host
pub fn validate_signal_url(url: &str, allow_http: bool) -> Result<(), DemuxError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| DemuxError::InvalidUrl(format!("invalid URL format: {e}")))?;

    match parsed.scheme() {
        "https" => {}
        "http" if allow_http => {}
        "http" => {
            return Err(DemuxError::InvalidUrl(
                "signal URLs must use HTTPS".to_string(),
            ));
        }
        scheme => {
            return Err(DemuxError::InvalidUrl(format!(
                "unsupported URL scheme: {scheme}"
            )));
        }
    }

    parsed
        .host_str()
        .ok_or_else(|| DemuxError::InvalidUrl("URL must have a host".to_string()))?;

    Ok(())
}
