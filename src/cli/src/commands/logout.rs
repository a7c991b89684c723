//! `kp logout` command: remove stored registry credentials.

use clap::Args;
use kp_core::error::Result;

use crate::credentials::CredentialStore;

#[derive(Args)]
pub struct LogoutArgs {
    /// Registry server (default: index.docker.io)
    pub server: Option<String>,
}

pub fn execute(args: LogoutArgs) -> Result<()> {
    let server = args.server.unwrap_or_else(|| "index.docker.io".to_string());

    if CredentialStore::default_path()?.remove(&server)? {
        println!("Removing login credentials for {}", server);
    } else {
        println!("Not logged in to {}", server);
    }
    Ok(())
}
