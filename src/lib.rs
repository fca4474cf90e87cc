#![warn(missing_docs, clippy::pedantic)]

//! Hands-free AWS SSO device-authorization sign-in.
//!
//! The pipeline per profile: spawn `aws sso login --no-browser` and scan its
//! stdout for the one-time authorization URL, then drive a headless browser
//! through the identity provider's sign-in UI (credentials, MFA, consent,
//! access approval) until the device-code flow completes, and finally run
//! `yawsso` to turn the fresh SSO session into an IAM-style profile.
//!
//! The orchestration core is [`LoginFlow`], a state machine over the
//! [`UiSession`] capability interface; [`run`] sequences everything else.
//! Provider-specific selectors live in a single locator table so a UI
//! change stays a data change.

mod browser;
mod chromium;
mod config;
mod login;
mod process;
mod runner;
mod scanner;
mod update;

use std::fmt;

pub use crate::{
    browser::{Locator, SessionError, UiSession, WaitOpts},
    chromium::ChromiumSession,
    config::{
        default_path as default_config_path, load as load_config, select_profiles, Config,
        ConfigError, InvalidProfileError, MfaType, CONFIG_FILE_NAME,
    },
    login::{LoginError, LoginFlow, Stage},
    process::{
        version_check, ProcessError, ToolMissingError, ToolProcess, CREDENTIAL_SYNC_TOOL,
        DEVICE_AUTH_TOOL,
    },
    runner::{run, RunError},
    scanner::first_authorization_url,
    update::{check as check_for_update, UpdateNotice},
};

const _: () = assert!(
    const_str::equal!(env!("CARGO_PKG_VERSION_MAJOR"), "0"),
    "client naming scheme needs updated for 1.0"
);
const CLIENT_NAME: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "@",
    "0.",
    env!("CARGO_PKG_VERSION_MINOR")
);

/// Any error that aborts a run.
///
/// Every fatal condition surfaces here: it is logged once at the top level
/// and causes a non-zero exit. Scanner exhaustion (subprocess output ending
/// without an authorization URL) is deliberately not represented; it is not
/// an error.
#[derive(Debug)]
pub enum PilotError {
    /// The configuration file was unreadable or invalid.
    Config(ConfigError),

    /// Requested profile names are absent from the configuration.
    Profiles(InvalidProfileError),

    /// A required external tool is not installed.
    ToolMissing(ToolMissingError),

    /// A profile's iteration failed.
    Run(RunError),
}

impl fmt::Display for PilotError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Config(error) => error.fmt(f),
            Self::Profiles(error) => error.fmt(f),
            Self::ToolMissing(error) => error.fmt(f),
            Self::Run(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for PilotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(error) => Some(error),
            Self::Profiles(error) => Some(error),
            Self::ToolMissing(error) => Some(error),
            Self::Run(error) => Some(error),
        }
    }
}

impl From<ConfigError> for PilotError {
    fn from(error: ConfigError) -> Self {
        Self::Config(error)
    }
}

impl From<InvalidProfileError> for PilotError {
    fn from(error: InvalidProfileError) -> Self {
        Self::Profiles(error)
    }
}

impl From<ToolMissingError> for PilotError {
    fn from(error: ToolMissingError) -> Self {
        Self::ToolMissing(error)
    }
}

impl From<RunError> for PilotError {
    fn from(error: RunError) -> Self {
        Self::Run(error)
    }
}
