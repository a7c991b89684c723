//! `kp buildpackage` commands.

use clap::{Args, Subcommand};
use kp_core::error::Result;
use kp_registry::BuildpackageUploader;

use crate::session::{ModeArgs, RegistryArgs, Session};

#[derive(Subcommand)]
pub enum BuildpackageCommand {
    /// Relocate a buildpackage into the repository
    Upload(UploadArgs),
    /// Print the reference a buildpackage would be relocated to
    Ref(RefArgs),
}

#[derive(Args)]
pub struct UploadArgs {
    /// Buildpackage location: registry reference or local .cnb/.tar/.tgz bundle
    pub source: String,

    #[command(flatten)]
    pub registry: RegistryArgs,

    #[command(flatten)]
    pub mode: ModeArgs,
}

#[derive(Args)]
pub struct RefArgs {
    /// Buildpackage location: registry reference or local .cnb/.tar/.tgz bundle
    pub source: String,

    #[command(flatten)]
    pub registry: RegistryArgs,
}

pub async fn execute(cmd: BuildpackageCommand) -> Result<()> {
    match cmd {
        BuildpackageCommand::Upload(args) => {
            let session = Session::open(&args.registry, &args.mode)?;
            let repository = args.registry.repository(&session.config)?;
            session.upload_header(&repository);
            let reference = BuildpackageUploader::new(&session.engine)
                .upload_buildpackage(&session.keychain, &args.source, &repository)
                .await?;
            println!("{}", reference);
        }
        BuildpackageCommand::Ref(args) => {
            let session = Session::open(&args.registry, &ModeArgs::default())?;
            let repository = args.registry.repository(&session.config)?;
            let reference = BuildpackageUploader::new(&session.engine)
                .uploaded_buildpackage_ref(&session.keychain, &args.source, &repository)
                .await?;
            println!("{}", reference);
        }
    }
    Ok(())
}
