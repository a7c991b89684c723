//! `kp store` commands.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use kp_core::error::Result;
use kp_core::resource::{load_document, require_document, StoreSources};
use kp_registry::{add_buildpackages, remove_buildpackages};

use crate::session::{ModeArgs, RegistryArgs, Session};

#[derive(Subcommand)]
pub enum StoreCommand {
    /// Relocate buildpackages and append them to the store file
    Add(AddArgs),
    /// Remove buildpackages (`id` or `id@version`) from the store file
    Remove(RemoveArgs),
}

#[derive(Args)]
pub struct AddArgs {
    /// Store document (JSON or YAML)
    #[arg(long)]
    pub store_file: PathBuf,

    /// Buildpackage locations: registry references or local bundles
    #[arg(required = true)]
    pub buildpackages: Vec<String>,

    #[command(flatten)]
    pub registry: RegistryArgs,

    #[command(flatten)]
    pub mode: ModeArgs,
}

#[derive(Args)]
pub struct RemoveArgs {
    /// Store document (JSON or YAML)
    #[arg(long)]
    pub store_file: PathBuf,

    /// Buildpackage identities: `id` or `id@version`
    #[arg(required = true)]
    pub buildpackages: Vec<String>,

    #[command(flatten)]
    pub mode: ModeArgs,
}

pub async fn execute(cmd: StoreCommand) -> Result<()> {
    match cmd {
        StoreCommand::Add(args) => {
            let session = Session::open(&args.registry, &args.mode)?;
            let repository = args.registry.repository(&session.config)?;
            let store: StoreSources = load_document(&args.store_file)?.unwrap_or_default();

            session.upload_header(&repository);
            let update = add_buildpackages(
                &session.engine,
                &session.keychain,
                &store,
                &repository,
                &args.buildpackages,
            )
            .await?;
            session.finish("Store", &update.store, update.changed, Some(args.store_file.as_path()))
        }
        StoreCommand::Remove(args) => {
            let session = Session::open(&RegistryArgs::default(), &args.mode)?;
            let store: StoreSources = require_document(&args.store_file)?;
            let update = remove_buildpackages(&store, &args.buildpackages, session.printer())?;
            session.finish("Store", &update.store, update.changed, Some(args.store_file.as_path()))
        }
    }
}
