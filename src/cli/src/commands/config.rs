//! `kp config` commands.

use clap::{Args, Subcommand};
use kp_core::config::KpConfig;
use kp_core::error::{KpError, Result};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show or set the repository artifacts are relocated into
    DefaultRepository(DefaultRepositoryArgs),
    /// Show or set the service account that pulls from the default repository
    DefaultServiceAccount(DefaultServiceAccountArgs),
}

#[derive(Args)]
pub struct DefaultRepositoryArgs {
    /// New default repository (e.g. "kpackcr.org/somepath")
    pub repository: Option<String>,
}

#[derive(Args)]
pub struct DefaultServiceAccountArgs {
    /// New default service account
    pub service_account: Option<String>,
}

pub fn execute(cmd: ConfigCommand) -> Result<()> {
    let path = KpConfig::default_path()?;
    let mut config = KpConfig::load(&path)?;

    match cmd {
        ConfigCommand::DefaultRepository(args) => match args.repository {
            Some(repo) => {
                config.default_repository = Some(validate(repo, "repository")?);
                config.save(&path)?;
                println!("Kp default repository updated");
            }
            None => println!("{}", config.require_default_repository()?),
        },
        ConfigCommand::DefaultServiceAccount(args) => match args.service_account {
            Some(account) => {
                config.default_service_account = Some(validate(account, "service account")?);
                config.save(&path)?;
                println!("Kp default service account updated");
            }
            None => println!(
                "{}",
                config.default_service_account.as_deref().unwrap_or("default")
            ),
        },
    }
    Ok(())
}

fn validate(value: String, what: &str) -> Result<String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(KpError::ConfigurationError(format!(
            "default {} must not be empty",
            what
        )));
    }
    Ok(value)
}
