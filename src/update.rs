use semver::Version;
use serde::Deserialize;
use tracing::debug;

use crate::CLIENT_NAME;

const GITHUB_OWNER: &str = "awssopilot";
const GITHUB_REPO: &str = "awssopilot";

/// A newer published release.
#[derive(Debug)]
pub struct UpdateNotice {
    /// The latest released version.
    pub latest: Version,

    /// Where to read about and download the release.
    pub url: String,
}

#[derive(Deserialize)]
struct LatestRelease {
    tag_name: String,
    html_url: String,
}

/// Check whether a newer release has been published.
///
/// Best-effort: any network or parse failure is logged at debug level and
/// treated as "no update", so an offline machine can still sign in.
pub async fn check() -> Option<UpdateNotice> {
    match fetch_latest().await {
        Ok(notice) => notice,
        Err(error) => {
            debug!("update check failed: {error}");
            None
        }
    }
}

async fn fetch_latest() -> Result<Option<UpdateNotice>, String> {
    let current =
        Version::parse(env!("CARGO_PKG_VERSION")).map_err(|error| error.to_string())?;

    let client = reqwest::Client::builder()
        .user_agent(CLIENT_NAME)
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .map_err(|error| error.to_string())?;

    let release: LatestRelease = client
        .get(format!(
            "https://api.github.com/repos/{GITHUB_OWNER}/{GITHUB_REPO}/releases/latest"
        ))
        .header("Accept", "application/vnd.github.v3+json")
        .send()
        .await
        .map_err(|error| error.to_string())?
        .error_for_status()
        .map_err(|error| error.to_string())?
        .json()
        .await
        .map_err(|error| error.to_string())?;

    let latest = Version::parse(release.tag_name.trim_start_matches('v'))
        .map_err(|error| format!("invalid release tag '{}': {error}", release.tag_name))?;

    Ok((latest > current).then_some(UpdateNotice {
        latest,
        url: release.html_url,
    }))
}
