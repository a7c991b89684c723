//! `kp lifecycle` commands.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use kp_core::error::Result;
use kp_core::resource::{load_document, LifecycleImage};
use kp_registry::update_lifecycle;

use crate::session::{ModeArgs, RegistryArgs, Session};

#[derive(Subcommand)]
pub enum LifecycleCommand {
    /// Relocate a lifecycle image
    Update(UpdateArgs),
}

#[derive(Args)]
pub struct UpdateArgs {
    /// Lifecycle image location
    #[arg(short, long)]
    pub image: String,

    /// Lifecycle document recording the relocated image
    #[arg(long)]
    pub lifecycle_file: Option<PathBuf>,

    #[command(flatten)]
    pub registry: RegistryArgs,

    #[command(flatten)]
    pub mode: ModeArgs,
}

pub async fn execute(cmd: LifecycleCommand) -> Result<()> {
    match cmd {
        LifecycleCommand::Update(args) => {
            let session = Session::open(&args.registry, &args.mode)?;
            let repository = args.registry.repository(&session.config)?;
            let current: Option<LifecycleImage> = match &args.lifecycle_file {
                Some(path) => load_document(path)?,
                None => None,
            };
            let existing = current
                .as_ref()
                .map(|c| c.image.as_str())
                .filter(|image| !image.is_empty());

            session.upload_header(&repository);
            let outcome = update_lifecycle(
                &session.engine,
                &session.keychain,
                &args.image,
                &repository,
                existing,
            )
            .await?;

            let document = LifecycleImage {
                image: outcome.reference,
            };
            let changed = current.as_ref() != Some(&document);
            session.finish(
                "Lifecycle Image",
                &document,
                changed,
                args.lifecycle_file.as_deref(),
            )
        }
    }
}
