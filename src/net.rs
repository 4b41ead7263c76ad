use std::time::Duration;

/// Bound for release-feed API calls.
pub const API_TIMEOUT: Duration = Duration::from_secs(30);
/// Bound for binary and archive downloads.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

pub fn client(timeout: Duration) -> reqwest::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .user_agent(format!("cngt-cli/{}", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()
}

/// GET `url` and return the body; non-2xx statuses are errors.
pub fn download(url: &str) -> reqwest::Result<Vec<u8>> {
    let response = client(DOWNLOAD_TIMEOUT)?
        .get(url)
        .send()?
        .error_for_status()?;
    Ok(response.bytes()?.to_vec())
}
