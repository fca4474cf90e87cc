use std::{fmt, time::Duration};

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, Lines};
use tracing::{debug, info};

use crate::{
    browser::{SessionError, UiSession},
    chromium::ChromiumSession,
    login::{LoginError, LoginFlow},
    process::{self, ProcessError, ToolProcess, CREDENTIAL_SYNC_TOOL, DEVICE_AUTH_TOOL},
    scanner, Config,
};

/// Pause between browser approval and killing the device-authorization CLI,
/// so the CLI's idle polling can pick up the approval and persist its token
/// cache before it dies.
const SYNC_GRACE: Duration = Duration::from_secs(3);

/// Provider of browser sessions, one per discovered authorization URL.
///
/// The orchestration only opens a session once a URL has turned up, and
/// hands it back on every path out of the flow, success or not.
#[async_trait]
trait SessionSource {
    type Session: UiSession + Sync;

    async fn open(&self) -> Result<Self::Session, SessionError>;

    async fn close(&self, session: Self::Session);
}

struct ChromiumLauncher;

#[async_trait]
impl SessionSource for ChromiumLauncher {
    type Session = ChromiumSession;

    async fn open(&self) -> Result<ChromiumSession, SessionError> {
        ChromiumSession::launch().await
    }

    async fn close(&self, session: ChromiumSession) {
        session.close().await;
    }
}

/// Process each selected profile in order.
///
/// Strictly sequential: the browser session and the OS credential cache are
/// shared resources, so no two profile iterations ever overlap. A profile
/// whose device-authorization CLI exits without printing an authorization
/// URL is skipped silently; any other failure aborts the remaining
/// profiles.
///
/// # Errors
///
/// Fails on the first unrecovered error in any profile's iteration. The
/// failing profile's subprocess and browser are released before the error
/// propagates; there is no retry.
pub async fn run(config: &Config, profiles: &[String], skip_sync: bool) -> Result<(), RunError> {
    for profile in profiles {
        info!("setting profile: {profile}");
        run_profile(config, profile, skip_sync).await?;
    }
    Ok(())
}

async fn run_profile(config: &Config, profile: &str, skip_sync: bool) -> Result<(), RunError> {
    let mut process = ToolProcess::spawn(
        DEVICE_AUTH_TOOL,
        &["sso", "login", "--profile", profile, "--no-browser"],
    )?;

    // The reader owns the child's stdout pipe. It lives until the process
    // has been terminated, so the CLI can keep writing after approval
    // without hitting a closed pipe while it persists its token cache.
    let mut lines = process.lines();

    let approved = match authorize(config, &ChromiumLauncher, &mut lines).await {
        Ok(approved) => approved,
        Err(error) => {
            process.terminate().await;
            return Err(error);
        }
    };

    if !approved {
        // The CLI exited without printing an authorization URL; nothing to
        // approve, nothing to sync.
        debug!("no authorization URL for profile {profile}; moving on");
        process.terminate().await;
        return Ok(());
    }

    info!("awaiting graceful time...");
    tokio::time::sleep(SYNC_GRACE).await;
    process.terminate().await;

    if !skip_sync {
        info!("executing yawsso...");
        process::run_to_completion(
            CREDENTIAL_SYNC_TOOL,
            &["-p", &format!("{profile}:{profile}-iam")],
        )
        .await?;
    }

    println!("{}", banner(profile));
    Ok(())
}

/// Scan for the authorization URL and drive a browser through it.
///
/// Returns `Ok(false)` when the subprocess output ended without a URL; no
/// session is opened in that case. A session, once opened, is given back
/// to its source on every path.
async fn authorize<S, R>(
    config: &Config,
    source: &S,
    lines: &mut Lines<R>,
) -> Result<bool, RunError>
where
    S: SessionSource,
    R: AsyncBufRead + Unpin,
{
    let Some(url) = scanner::first_authorization_url(lines)
        .await
        .map_err(|error| ProcessError::new(format!("failed to read subprocess output: {error}")))?
    else {
        return Ok(false);
    };

    info!("loading url: {url}");
    let session = source.open().await?;
    let outcome = LoginFlow::new(&session, config).run(&url).await;
    source.close(session).await;
    outcome?;

    Ok(true)
}

fn banner(profile: &str) -> String {
    let message = format!("    IAM profile '{profile}-iam' configured ");
    let rule = "-".repeat(message.len());
    format!("{rule}\n    SSO profile '{profile}' token renewed\n{message}\n{rule}")
}

/// An error that aborted the run during a profile's iteration.
#[derive(Debug)]
pub enum RunError {
    /// A subprocess could not be started, read, or run to completion.
    Process(ProcessError),

    /// The browser could not be launched or failed outside the flow.
    Session(SessionError),

    /// The sign-in flow failed in the browser.
    Login(LoginError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Process(error) => error.fmt(f),
            Self::Session(error) => error.fmt(f),
            Self::Login(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Process(error) => Some(error),
            Self::Session(error) => Some(error),
            Self::Login(error) => Some(error),
        }
    }
}

impl From<ProcessError> for RunError {
    fn from(error: ProcessError) -> Self {
        Self::Process(error)
    }
}

impl From<SessionError> for RunError {
    fn from(error: SessionError) -> Self {
        Self::Session(error)
    }
}

impl From<LoginError> for RunError {
    fn from(error: LoginError) -> Self {
        Self::Login(error)
    }
}
