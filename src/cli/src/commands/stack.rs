//! `kp stack` commands.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use kp_core::error::Result;
use kp_core::resource::{load_document, StackImages};
use kp_registry::update_stack;

use crate::session::{ModeArgs, RegistryArgs, Session};

#[derive(Subcommand)]
pub enum StackCommand {
    /// Relocate build and run images and record them in the stack file
    Update(UpdateArgs),
}

#[derive(Args)]
pub struct UpdateArgs {
    /// Stack document (JSON or YAML) holding the current images
    #[arg(long)]
    pub stack_file: PathBuf,

    /// Build image location
    #[arg(short, long)]
    pub build_image: String,

    /// Run image location
    #[arg(short, long)]
    pub run_image: String,

    #[command(flatten)]
    pub registry: RegistryArgs,

    #[command(flatten)]
    pub mode: ModeArgs,
}

pub async fn execute(cmd: StackCommand) -> Result<()> {
    match cmd {
        StackCommand::Update(args) => {
            let session = Session::open(&args.registry, &args.mode)?;
            let repository = args.registry.repository(&session.config)?;
            let current: StackImages = load_document(&args.stack_file)?.unwrap_or_default();

            let update = update_stack(
                &session.engine,
                &session.keychain,
                &current,
                &repository,
                &args.build_image,
                &args.run_image,
            )
            .await?;

            session.finish("Stack", &update.stack, update.changed, Some(args.stack_file.as_path()))
        }
    }
}
