//! CLI command definitions and dispatch.

mod buildpackage;
mod config;
mod lifecycle;
mod login;
mod logout;
mod source;
mod stack;
mod store;

use clap::{Parser, Subcommand};
use kp_core::error::Result;

pub use crate::session::{ModeArgs, OutputFormat, RegistryArgs};

/// kp: relocate buildpacks, stacks, and source into a canonical registry.
#[derive(Parser)]
#[command(name = "kp", version, about)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Relocate buildpackages
    #[command(subcommand)]
    Buildpackage(buildpackage::BuildpackageCommand),
    /// Relocate build and run images of a stack
    #[command(subcommand)]
    Stack(stack::StackCommand),
    /// Add and remove buildpackages of a store
    #[command(subcommand)]
    Store(store::StoreCommand),
    /// Upload application source
    #[command(subcommand)]
    Source(source::SourceCommand),
    /// Relocate the lifecycle image
    #[command(subcommand)]
    Lifecycle(lifecycle::LifecycleCommand),
    /// Show or change kp configuration
    #[command(subcommand)]
    Config(config::ConfigCommand),
    /// Store registry credentials
    Login(login::LoginArgs),
    /// Remove stored registry credentials
    Logout(logout::LogoutArgs),
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Buildpackage(cmd) => buildpackage::execute(cmd).await,
        Command::Stack(cmd) => stack::execute(cmd).await,
        Command::Store(cmd) => store::execute(cmd).await,
        Command::Source(cmd) => source::execute(cmd).await,
        Command::Lifecycle(cmd) => lifecycle::execute(cmd).await,
        Command::Config(cmd) => config::execute(cmd),
        Command::Login(args) => login::execute(args),
        Command::Logout(args) => logout::execute(args),
    }
}
