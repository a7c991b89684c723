//! `kp source` commands.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use kp_core::error::Result;
use kp_registry::upload_source;

use crate::session::{ModeArgs, RegistryArgs, Session};

#[derive(Subcommand)]
pub enum SourceCommand {
    /// Package a directory or zip file and push it as an image
    Upload(UploadArgs),
}

#[derive(Args)]
pub struct UploadArgs {
    /// Source directory or .zip/.jar file
    pub path: PathBuf,

    #[command(flatten)]
    pub registry: RegistryArgs,

    #[command(flatten)]
    pub mode: ModeArgs,
}

pub async fn execute(cmd: SourceCommand) -> Result<()> {
    match cmd {
        SourceCommand::Upload(args) => {
            let session = Session::open(&args.registry, &args.mode)?;
            let repository = args.registry.repository(&session.config)?;
            session.upload_header(&repository);
            let reference =
                upload_source(&session.engine, &session.keychain, &repository, args.path).await?;
            println!("{}", reference);
            Ok(())
        }
    }
}
