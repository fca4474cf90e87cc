use std::io;

use tokio::io::{AsyncBufRead, Lines};
use tracing::debug;
use url::Url;

/// Consume `lines` until the first authorization URL, discarding the rest.
///
/// The device-authorization CLI prints a one-time URL carrying a `user_code`
/// query parameter; everything else it prints is noise. Scanning stops at
/// the first match, leaving the subprocess running and later lines unread.
///
/// Returns `Ok(None)` when the sequence ends without a match (the process
/// exited): that is not an error, the caller simply moves on.
///
/// # Errors
///
/// Fails if reading the underlying stream fails.
pub async fn first_authorization_url<R>(lines: &mut Lines<R>) -> io::Result<Option<Url>>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(line) = lines.next_line().await? {
        if let Some(url) = match_authorization_url(&line) {
            return Ok(Some(url));
        }
        debug!("discarding line: {line}");
    }

    Ok(None)
}

fn match_authorization_url(line: &str) -> Option<Url> {
    let line = line.trim();
    if !line.starts_with("https://") {
        return None;
    }

    let url: Url = line.parse().ok()?;
    url.query_pairs()
        .any(|(key, _)| key == "user_code")
        .then_some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncBufReadExt, BufReader};

    fn lines(content: &str) -> Lines<BufReader<&[u8]>> {
        BufReader::new(content.as_bytes()).lines()
    }

    #[tokio::test]
    async fn finds_the_first_authorization_url() {
        let mut lines = lines(
            "Attempting to automatically open the SSO authorization page\n\
             If the browser does not open, open the following URL:\n\
             https://device.example/auth?user_code=ABC-123\n",
        );

        let url = first_authorization_url(&mut lines).await.unwrap().unwrap();
        assert_eq!(url.as_str(), "https://device.example/auth?user_code=ABC-123");
    }

    #[tokio::test]
    async fn stops_consuming_after_the_match() {
        let mut lines = lines(
            "https://device.example/auth?user_code=ABC-123\n\
             only read after the match\n",
        );

        first_authorization_url(&mut lines).await.unwrap().unwrap();
        assert_eq!(
            lines.next_line().await.unwrap().as_deref(),
            Some("only read after the match")
        );
    }

    #[tokio::test]
    async fn exhaustion_without_a_match_is_not_an_error() {
        let mut lines = lines("no URLs here\nnor here\n");
        assert!(first_authorization_url(&mut lines).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ignores_urls_without_a_user_code() {
        let mut lines = lines(
            "https://device.example/start\n\
             https://device.example/auth?user_code=ABC-123\n",
        );

        let url = first_authorization_url(&mut lines).await.unwrap().unwrap();
        assert!(url.query_pairs().any(|(key, _)| key == "user_code"));
    }

    #[tokio::test]
    async fn ignores_non_https_lines_mentioning_user_code() {
        let mut lines = lines("enter user_code ABC-123 when prompted\n");
        assert!(first_authorization_url(&mut lines).await.unwrap().is_none());
    }
}
