//! Per-invocation setup shared by the relocation commands.
//!
//! Reads the config file, merges registry flags over it, picks the status
//! stream, and builds the [`SyncEngine`] and keychain a command runs with.

use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use kp_core::config::{KpConfig, RegistryOptions};
use kp_core::error::Result;
use kp_core::mode::ExecutionMode;
use kp_core::resource::{save_document, DocumentFormat};
use kp_registry::{ClientOptions, Printer, SyncEngine};
use serde::Serialize;

use crate::credentials::{CredentialStore, StoreKeychain};

/// Format of the resulting resource document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

impl OutputFormat {
    fn document_format(self) -> DocumentFormat {
        match self {
            OutputFormat::Json => DocumentFormat::Json,
            OutputFormat::Yaml => DocumentFormat::Yaml,
        }
    }
}

/// Execution mode and output flags.
#[derive(Args, Debug, Clone, Default)]
pub struct ModeArgs {
    /// Perform validation with no side effects; nothing is uploaded or written
    #[arg(long, conflicts_with = "dry_run_with_image_upload")]
    pub dry_run: bool,

    /// Like --dry-run, but images are uploaded to the registry
    #[arg(long)]
    pub dry_run_with_image_upload: bool,

    /// Print the resulting resource document (status lines move to stderr)
    #[arg(long, value_enum)]
    pub output: Option<OutputFormat>,
}

impl ModeArgs {
    pub fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::from_flags(self.dry_run, self.dry_run_with_image_upload)
    }
}

/// Registry connection flags.
#[derive(Args, Debug, Clone, Default)]
pub struct RegistryArgs {
    /// Repository to relocate into (defaults to the configured default repository)
    #[arg(long)]
    pub repository: Option<String>,

    /// Additional CA certificate (PEM) to trust for registry connections
    #[arg(long)]
    pub registry_ca_cert_path: Option<PathBuf>,

    /// Verify registry TLS certificates
    #[arg(long, value_name = "BOOL")]
    pub registry_verify_certs: Option<bool>,
}

impl RegistryArgs {
    /// Registry options from `config` with these flags applied on top.
    pub fn registry_options(&self, config: &KpConfig) -> RegistryOptions {
        let mut options = config.registry.clone();
        if let Some(path) = &self.registry_ca_cert_path {
            options.ca_cert_path = Some(path.clone());
        }
        if let Some(verify) = self.registry_verify_certs {
            options.verify_certs = verify;
        }
        options
    }

    /// The repository flag, else the configured default repository.
    pub fn repository(&self, config: &KpConfig) -> Result<String> {
        match &self.repository {
            Some(repo) if !repo.trim().is_empty() => Ok(repo.trim().to_string()),
            _ => config.require_default_repository().map(str::to_string),
        }
    }
}

/// Everything one command invocation runs with.
pub struct Session {
    pub config: KpConfig,
    pub engine: SyncEngine,
    pub keychain: StoreKeychain,
    output: Option<OutputFormat>,
}

impl Session {
    /// Open a session from the config file and credential store in the home directory.
    pub fn open(registry: &RegistryArgs, mode: &ModeArgs) -> Result<Self> {
        let config = KpConfig::load(&KpConfig::default_path()?)?;
        let printer = if mode.output.is_some() {
            Printer::stderr()
        } else {
            Printer::stdout()
        };
        let options = ClientOptions::from_registry_options(&registry.registry_options(&config))?;
        let engine = SyncEngine::with_registry(&options, mode.execution_mode(), printer);
        let keychain = StoreKeychain::new(CredentialStore::default_path()?);
        tracing::debug!(mode = ?engine.mode(), "Session opened");
        Ok(Self::new(config, engine, keychain, mode.output))
    }

    pub fn new(
        config: KpConfig,
        engine: SyncEngine,
        keychain: StoreKeychain,
        output: Option<OutputFormat>,
    ) -> Self {
        Self {
            config,
            engine,
            keychain,
            output,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.engine.mode()
    }

    pub fn printer(&self) -> &Printer {
        self.engine.printer()
    }

    /// Print the `Uploading to '<repo>'...` header.
    pub fn upload_header(&self, repository: &str) {
        self.printer().line(format!(
            "Uploading to '{}'...{}",
            repository,
            self.mode().suffix()
        ));
    }

    /// Persist `document` when allowed, print it when requested, and report the result.
    pub fn finish<T: Serialize>(
        &self,
        kind: &str,
        document: &T,
        changed: bool,
        path: Option<&Path>,
    ) -> Result<()> {
        if changed && self.mode().persists() {
            if let Some(path) = path {
                save_document(path, document)?;
                tracing::debug!(path = %path.display(), "Saved {}", kind);
            }
        }
        if let Some(format) = self.output {
            print!("{}", format.document_format().render(document)?);
        }
        let status = if changed { "Updated" } else { "Unchanged" };
        self.printer()
            .line(format!("{} {}{}", kind, status, self.mode().suffix()));
        Ok(())
    }
}
