//! awssopilot - hands-free AWS SSO device-authorization sign-in.

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use aws_sso_pilot::{
    check_for_update, default_config_path, load_config, run, select_profiles, version_check,
    PilotError, CREDENTIAL_SYNC_TOOL, DEVICE_AUTH_TOOL,
};

/// Renew SSO tokens and IAM profiles without clicking through the browser.
#[derive(Debug, Parser)]
#[command(name = "awssopilot", version, disable_version_flag = true)]
struct Cli {
    /// Profile names to process (defaults to every configured profile)
    profiles: Vec<String>,

    /// Print version
    #[arg(short = 'v', short_alias = 'V', long, action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Skip the update check
    #[arg(long)]
    skip_update: bool,

    /// Skip the yawsso credential sync and its presence check
    #[arg(long)]
    skip_yawsso: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if !cli.skip_update {
        if let Some(notice) = check_for_update().await {
            println!(
                "A new version is available: {} -> {}",
                env!("CARGO_PKG_VERSION"),
                notice.latest
            );
            println!("Get it at {}", notice.url);
            return;
        }
    }

    if let Err(error) = init(cli).await {
        error!("{error}");
        std::process::exit(1);
    }
}

async fn init(cli: Cli) -> Result<(), PilotError> {
    let path = default_config_path()?;
    let config = load_config(&path).await?;

    let skip_yawsso = cli.skip_yawsso || config.skip_yawsso;
    let profiles = select_profiles(&config, &cli.profiles)?;

    version_check(DEVICE_AUTH_TOOL).await?;
    if !skip_yawsso {
        version_check(CREDENTIAL_SYNC_TOOL).await?;
    }

    run(&config, &profiles, skip_yawsso).await?;
    Ok(())
}
