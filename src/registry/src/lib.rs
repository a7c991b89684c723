//! kp Registry - Synchronization Engine
//!
//! Fetches OCI artifacts from registries or local bundles, packages source
//! trees, names artifacts canonically, skips relocations whose digest is
//! already in place, and relocates the rest, honoring dry-run modes.

#![allow(clippy::result_large_err)]

pub mod archive;
pub mod artifact;
pub mod buildpackage;
pub mod client;
pub mod dryrun;
pub mod engine;
pub mod fetch;
pub mod gate;
pub mod keychain;
pub mod layout;
pub mod lifecycle;
pub mod metadata;
pub mod naming;
pub mod package;
pub mod printer;
pub mod reference;
pub mod relocate;
pub mod source;
pub mod stack;
pub mod store;

#[cfg(test)]
pub(crate) mod fakes;

// Re-export common types
pub use artifact::{Artifact, Digest};
pub use buildpackage::{BuildpackageUploader, PreparedBuildpackage};
pub use client::{ClientOptions, RegistryClient};
pub use dryrun::{DryRunController, SyncOutcome};
pub use engine::SyncEngine;
pub use fetch::{DefaultFetcher, ImageFetcher};
pub use gate::RelocationDecision;
pub use keychain::{AnonymousKeychain, Keychain, RegistryAuth, StaticKeychain};
pub use lifecycle::update_lifecycle;
pub use metadata::BuildpackageIdentity;
pub use naming::CanonicalReference;
pub use printer::Printer;
pub use reference::{ImageReference, Location};
pub use relocate::{ImageRelocator, RegistryRelocator, RELOCATION_TAG};
pub use source::upload_source;
pub use stack::{update_stack, StackUpdate};
pub use store::{add_buildpackages, remove_buildpackages, StoreUpdate};
