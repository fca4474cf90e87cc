use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tokio::fs;

/// Name of the configuration file, looked up in the user's home directory.
pub const CONFIG_FILE_NAME: &str = "awssopilot.config";

/// Settings for a run, read once at startup.
///
/// The configuration is immutable for the process lifetime: it is owned by
/// the run loop and passed by reference into the sign-in flow.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// The identity provider account to sign in with.
    pub email: String,

    /// The account's password.
    pub password: String,

    /// Which MFA method the account uses.
    #[serde(rename = "type")]
    pub mfa: MfaType,

    /// Last digits of the phone number, as shown in the provider's masked
    /// phone-call option. Required when `mfa` is [`MfaType::Call`].
    #[serde(default)]
    pub phone: Option<String>,

    /// The SSO profiles to process, in order. Names must be unique.
    pub profiles: Vec<String>,

    /// Skip the credential-sync step and its preflight check.
    #[serde(rename = "skipYawsso", default)]
    pub skip_yawsso: bool,
}

/// How the account's sign-in is confirmed out of band.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MfaType {
    /// An automated phone call to a configured number.
    Call,

    /// A numeric code confirmed in an authenticator app.
    App,
}

impl Config {
    fn validate(self) -> Result<Self, ConfigError> {
        if self.mfa == MfaType::Call {
            match &self.phone {
                Some(phone) if !phone.is_empty() && phone.chars().all(|c| c.is_ascii_digit()) => {}
                Some(_) => {
                    return Err(ConfigError::new("'phone' must contain only digits"));
                }
                None => {
                    return Err(ConfigError::new(
                        "'phone' is required when 'type' is \"call\"",
                    ));
                }
            }
        }

        if self.profiles.is_empty() {
            return Err(ConfigError::new("'profiles' must not be empty"));
        }
        for (index, name) in self.profiles.iter().enumerate() {
            if self.profiles[..index].contains(name) {
                return Err(ConfigError::new(format!(
                    "duplicate profile name '{name}' in 'profiles'"
                )));
            }
        }

        Ok(self)
    }
}

// The password never appears in Debug output.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Config")
            .field("email", &self.email)
            .field("password", &"_")
            .field("mfa", &self.mfa)
            .field("phone", &self.phone)
            .field("profiles", &self.profiles)
            .field("skip_yawsso", &self.skip_yawsso)
            .finish()
    }
}

/// Location of the configuration file under the user's home directory.
///
/// # Errors
///
/// Fails if the home directory cannot be determined.
pub fn default_path() -> Result<PathBuf, ConfigError> {
    let mut path = dirs_next::home_dir()
        .ok_or_else(|| ConfigError::new("could not determine home directory"))?;
    path.push(CONFIG_FILE_NAME);
    Ok(path)
}

/// Read and validate the configuration file at `path`.
///
/// # Errors
///
/// Fails if the file is unreadable, is not valid JSON, or is missing
/// required settings (e.g. `phone` for the `call` MFA type).
pub async fn load(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path).await.map_err(|error| {
        ConfigError::new(format!(
            "unable to read config file {}: {error}",
            path.display()
        ))
    })?;

    parse(&content).map_err(|error| {
        ConfigError::new(format!("invalid config file {}: {error}", path.display()))
    })
}

fn parse(content: &str) -> Result<Config, ConfigError> {
    let config: Config =
        serde_json::from_str(content).map_err(|error| ConfigError::new(error.to_string()))?;
    config.validate()
}

/// Resolve the profiles to process from the command line's positional names.
///
/// An empty `requested` selects every configured profile. Otherwise the
/// result is the configured names that were requested, in the configuration's
/// original order.
///
/// # Errors
///
/// Fails before any subprocess is spawned if any requested name is not
/// configured, listing every invalid name exactly once.
pub fn select_profiles(config: &Config, requested: &[String]) -> Result<Vec<String>, InvalidProfileError> {
    if requested.is_empty() {
        return Ok(config.profiles.clone());
    }

    let mut invalid = Vec::new();
    for name in requested {
        if !config.profiles.contains(name) && !invalid.contains(name) {
            invalid.push(name.clone());
        }
    }
    if !invalid.is_empty() {
        return Err(InvalidProfileError { names: invalid });
    }

    Ok(config
        .profiles
        .iter()
        .filter(|name| requested.contains(name))
        .cloned()
        .collect())
}

/// An error indicating a missing or invalid configuration file.
///
/// The error message should be sufficient to aid end-user debugging.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug)]
pub struct ConfigError(String);

impl ConfigError {
    fn new(error: impl Into<String>) -> Self {
        Self(error.into())
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ConfigError {}

/// An error indicating that requested profile names are not configured.
#[derive(Debug)]
pub struct InvalidProfileError {
    /// The requested names with no matching configuration, in request order.
    pub names: Vec<String>,
}

impl fmt::Display for InvalidProfileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "unknown profile name(s): {}",
            self.names.join(", ")
        )
    }
}

impl std::error::Error for InvalidProfileError {}
