//! `kp login` command: store registry credentials.

use clap::Args;
use kp_core::error::{KpError, Result};

use crate::credentials::CredentialStore;

#[derive(Args)]
pub struct LoginArgs {
    /// Registry server (default: index.docker.io)
    pub server: Option<String>,

    /// Username
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password
    #[arg(short, long)]
    pub password: Option<String>,

    /// Read password from stdin
    #[arg(long)]
    pub password_stdin: bool,
}

pub fn execute(args: LoginArgs) -> Result<()> {
    let server = args.server.unwrap_or_else(|| "index.docker.io".to_string());

    let username = match args.username {
        Some(u) => u,
        None => prompt("Username: ")?,
    };
    let password = match (args.password_stdin, args.password) {
        (true, _) => prompt("")?,
        (false, Some(p)) => p,
        (false, None) => prompt("Password: ")?,
    };

    if username.is_empty() || password.is_empty() {
        return Err(KpError::ConfigurationError(
            "Username and password are required".to_string(),
        ));
    }

    CredentialStore::default_path()?.store(&server, &username, &password)?;
    println!("Login Succeeded");
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    if !label.is_empty() {
        eprint!("{}", label);
    }
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}
