//! Stack relocation: a build image and a run image sharing one stack id.

use kp_core::error::{KpError, Result};
use kp_core::resource::StackImages;

use crate::engine::SyncEngine;
use crate::keychain::Keychain;
use crate::metadata;
use crate::naming;

/// Path segment of the relocated build image.
pub const BUILD_IMAGE_NAME: &str = "build";

/// Path segment of the relocated run image.
pub const RUN_IMAGE_NAME: &str = "run";

/// New stack images and whether they differ from the current ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackUpdate {
    pub stack: StackImages,
    pub changed: bool,
}

/// Relocate `build_image` and `run_image` into `repository`.
///
/// Both images are fetched before either is relocated, and each is gated
/// independently against `current`, so an unchanged image keeps its existing
/// reference while a changed one is replaced.
pub async fn update_stack(
    engine: &SyncEngine,
    keychain: &dyn Keychain,
    current: &StackImages,
    repository: &str,
    build_image: &str,
    run_image: &str,
) -> Result<StackUpdate> {
    naming::require_repository(repository)?;
    engine.printer().line(format!(
        "Uploading to '{}'...{}",
        repository,
        engine.mode().suffix()
    ));

    let ((_, build), (_, run)) = tokio::try_join!(
        engine.fetch(keychain, build_image),
        engine.fetch(keychain, run_image)
    )?;

    let build_stack_id =
        metadata::stack_id(&build).map_err(|e| e.with_context(build_image))?;
    let run_stack_id = metadata::stack_id(&run).map_err(|e| e.with_context(run_image))?;
    if build_stack_id != run_stack_id {
        return Err(KpError::MismatchError(format!(
            "build stack '{}' does not match run stack '{}'",
            build_stack_id, run_stack_id
        )));
    }

    let existing_build = Some(current.build_image.as_str()).filter(|s| !s.is_empty());
    let existing_run = Some(current.run_image.as_str()).filter(|s| !s.is_empty());

    let build_outcome = engine
        .sync(keychain, &build, repository, Some(BUILD_IMAGE_NAME), existing_build)
        .await?;
    let run_outcome = engine
        .sync(keychain, &run, repository, Some(RUN_IMAGE_NAME), existing_run)
        .await?;

    if !build_outcome.changed && !run_outcome.changed {
        engine
            .printer()
            .line("\tBuild and Run images already exist in stack");
    }

    let stack = StackImages {
        id: build_stack_id,
        build_image: build_outcome.reference,
        run_image: run_outcome.reference,
    };
    let changed = stack != *current;
    tracing::debug!(stack_id = %stack.id, changed, "Stack relocation complete");
    Ok(StackUpdate { stack, changed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::testing::artifact;
    use crate::artifact::Artifact;
    use crate::fakes::{FakeFetcher, FakeRelocator};
    use crate::keychain::AnonymousKeychain;
    use crate::metadata::STACK_ID_LABEL;
    use crate::printer::Printer;
    use kp_core::mode::ExecutionMode;
    use parking_lot::Mutex;
    use std::sync::Arc;

    const REPO: &str = "kpackcr.org/somepath";
    const BUILD: &str = "some-registry.io/build-image";
    const RUN: &str = "some-registry.io/run-image";

    fn image(seed: &str, stack: &str) -> Artifact {
        artifact(seed, &[(STACK_ID_LABEL, stack)], 2)
    }

    fn setup(
        build: &Artifact,
        run: &Artifact,
        mode: ExecutionMode,
    ) -> (SyncEngine, Arc<FakeRelocator>, Arc<Mutex<Vec<u8>>>) {
        let fetcher = FakeFetcher::new()
            .with(BUILD, build.clone())
            .with(RUN, run.clone());
        let relocator = Arc::new(FakeRelocator::new());
        let (printer, buffer) = Printer::buffer();
        let engine = SyncEngine::new(Arc::new(fetcher), relocator.clone(), mode, printer);
        (engine, relocator, buffer)
    }

    fn current_for(build: &Artifact, run: &Artifact) -> StackImages {
        StackImages {
            id: "stack-id".to_string(),
            build_image: format!("{}/build@{}", REPO, build.digest()),
            run_image: format!("{}/run@{}", REPO, run.digest()),
        }
    }

    fn output(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8(buffer.lock().clone()).unwrap()
    }

    #[tokio::test]
    async fn test_updates_both_images() {
        let build = image("build", "stack-id");
        let run = image("run", "stack-id");
        let (engine, relocator, buffer) = setup(&build, &run, ExecutionMode::Live);

        let update = update_stack(
            &engine,
            &AnonymousKeychain,
            &StackImages::default(),
            REPO,
            BUILD,
            RUN,
        )
        .await
        .unwrap();

        assert!(update.changed);
        assert_eq!(update.stack, current_for(&build, &run));
        assert_eq!(relocator.relocate_count(), 2);
        assert_eq!(
            output(&buffer),
            format!(
                "Uploading to '{repo}'...\n\tUploading '{repo}/build@{b}'\n\tUploading '{repo}/run@{r}'\n",
                repo = REPO,
                b = build.digest(),
                r = run.digest()
            )
        );
    }

    #[tokio::test]
    async fn test_blank_repository_is_configuration_error() {
        let build = image("build", "stack-id");
        let run = image("run", "stack-id");
        let (engine, relocator, buffer) = setup(&build, &run, ExecutionMode::Live);

        let err = update_stack(&engine, &AnonymousKeychain, &StackImages::default(), "", BUILD, RUN)
            .await
            .unwrap_err();

        assert!(matches!(err, kp_core::error::KpError::ConfigurationError(_)));
        assert_eq!(relocator.relocate_count(), 0);
        assert_eq!(output(&buffer), "");
    }

    #[tokio::test]
    async fn test_unchanged_stack() {
        let build = image("build", "stack-id");
        let run = image("run", "stack-id");
        let (engine, relocator, buffer) = setup(&build, &run, ExecutionMode::Live);
        let current = current_for(&build, &run);

        let update = update_stack(&engine, &AnonymousKeychain, &current, REPO, BUILD, RUN)
            .await
            .unwrap();

        assert!(!update.changed);
        assert_eq!(update.stack, current);
        assert_eq!(relocator.relocate_count(), 0);
        assert!(output(&buffer).ends_with("\tBuild and Run images already exist in stack\n"));
    }

    #[tokio::test]
    async fn test_partial_change_relocates_only_run_image() {
        let build = image("build", "stack-id");
        let old_run = image("old-run", "stack-id");
        let new_run = image("new-run", "stack-id");
        let (engine, relocator, _) = setup(&build, &new_run, ExecutionMode::Live);
        let current = current_for(&build, &old_run);

        let update = update_stack(&engine, &AnonymousKeychain, &current, REPO, BUILD, RUN)
            .await
            .unwrap();

        assert!(update.changed);
        assert_eq!(relocator.relocate_count(), 1);
        assert_eq!(relocator.calls()[0].destination, format!("{}/run", REPO));
        assert_eq!(update.stack.build_image, current.build_image);
        assert_eq!(update.stack.run_image, format!("{}/run@{}", REPO, new_run.digest()));
    }

    #[tokio::test]
    async fn test_mismatched_stack_ids() {
        let build = image("build", "stack-a");
        let run = image("run", "stack-b");
        let (engine, relocator, _) = setup(&build, &run, ExecutionMode::Live);

        let err = update_stack(
            &engine,
            &AnonymousKeychain,
            &StackImages::default(),
            REPO,
            BUILD,
            RUN,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, KpError::MismatchError(_)));
        assert_eq!(
            err.to_string(),
            "build stack 'stack-a' does not match run stack 'stack-b'"
        );
        assert_eq!(relocator.relocate_count(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_skips_uploads() {
        let build = image("build", "stack-id");
        let run = image("run", "stack-id");
        let (engine, relocator, buffer) = setup(&build, &run, ExecutionMode::DryRun);

        let update = update_stack(
            &engine,
            &AnonymousKeychain,
            &StackImages::default(),
            REPO,
            BUILD,
            RUN,
        )
        .await
        .unwrap();

        assert!(update.changed);
        assert_eq!(relocator.relocate_count(), 0);
        let out = output(&buffer);
        assert!(out.starts_with(&format!("Uploading to '{}'... (dry run)\n", REPO)));
        assert!(out.contains(&format!("\tSkipping '{}/build@{}'", REPO, build.digest())));
    }

    #[tokio::test]
    async fn test_dry_run_with_upload_relocates() {
        let build = image("build", "stack-id");
        let run = image("run", "stack-id");
        let (engine, relocator, _) = setup(&build, &run, ExecutionMode::DryRunWithUpload);

        update_stack(
            &engine,
            &AnonymousKeychain,
            &StackImages::default(),
            REPO,
            BUILD,
            RUN,
        )
        .await
        .unwrap();
        assert_eq!(relocator.relocate_count(), 2);
    }

    #[tokio::test]
    async fn test_run_failure_leaves_no_partial_result() {
        let build = image("build", "stack-id");
        let fetcher = FakeFetcher::new()
            .with(BUILD, build)
            .with_auth_failure(RUN);
        let relocator = Arc::new(FakeRelocator::new());
        let engine = SyncEngine::new(
            Arc::new(fetcher),
            relocator.clone(),
            ExecutionMode::Live,
            Printer::buffer().0,
        );

        let err = update_stack(
            &engine,
            &AnonymousKeychain,
            &StackImages::default(),
            REPO,
            BUILD,
            RUN,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, KpError::AuthenticationFailure { .. }));
        assert!(err.to_string().contains("some-registry.io"));
        assert_eq!(relocator.relocate_count(), 0);
    }
}
