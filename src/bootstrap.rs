//! Service registration and the startup sequence run before listening.

use std::path::{Path, PathBuf};

use anyhow::Context;
use interop_protocol::{DynamicValue, Invocation};
use interop_server::{Dispatcher, ObjectRegistry};
use interop_services::program::ProgramService;
use interop_services::shared::SharedVariableService;
use interop_services::storage::StorageService;
use tracing::{info, warn};

pub const APP_NAME: &str = "Interop";

/// Every bundled service, with storage kept under `data_dir`.
pub fn registry(data_dir: PathBuf) -> ObjectRegistry {
    ObjectRegistry::new()
        .register::<ProgramService>()
        .register_with(move || StorageService::in_dir(&data_dir))
        .register::<SharedVariableService>()
}

/// Display version, from the `Version` file in `base_dir`.
///
/// A trailing 7-character segment (`1.2.0-22bcd96`) is a git short hash and
/// marks a nightly build.
pub fn version_string(base_dir: &Path) -> String {
    let path = base_dir.join("Version");
    match std::fs::read_to_string(&path) {
        Ok(contents) => {
            let build = contents.trim();
            info!("Version: {build}");
            let nightly = build.rsplit('-').next().is_some_and(|last| last.len() == 7);
            if nightly {
                format!("{APP_NAME} Nightly {build}")
            } else {
                format!("{APP_NAME} {build}")
            }
        }
        Err(e) => {
            warn!("Could not read {}: {e}", path.display());
            format!("{APP_NAME} Nightly Build")
        }
    }
}

/// `Program.PreInit`, `Storage.Load`, `Program.Init`, in order, through the
/// regular dispatcher. The first failure aborts startup.
pub async fn run(dispatcher: &Dispatcher, version: String, args: Vec<String>) -> anyhow::Result<()> {
    let args = DynamicValue::Sequence(args.into_iter().map(DynamicValue::from).collect());
    let steps = [
        Invocation::new("Program", "PreInit", vec![DynamicValue::from(version), args]),
        Invocation::new("Storage", "Load", vec![]),
        Invocation::new("Program", "Init", vec![]),
    ];

    for step in steps {
        let target = step.target();
        dispatcher
            .invoke(step)
            .await
            .with_context(|| format!("Startup call {target} failed"))?;
        info!("Startup: {target} done");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_version() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Version"), "2024.05.01\n").unwrap();
        assert_eq!(version_string(dir.path()), "Interop 2024.05.01");
    }

    #[test]
    fn nightly_version() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Version"), "2024.05.01-22bcd96").unwrap();
        assert_eq!(version_string(dir.path()), "Interop Nightly 2024.05.01-22bcd96");
    }

    #[test]
    fn missing_version_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(version_string(dir.path()), "Interop Nightly Build");
    }

    #[tokio::test]
    async fn startup_sequence_initializes_program() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = Dispatcher::new(registry(dir.path().to_path_buf()));
        let config = format!("--config={}", dir.path().display());

        run(&dispatcher, "Interop 1.0".into(), vec![config]).await.unwrap();

        let program = dispatcher.registry().get::<ProgramService>().unwrap();
        assert!(program.is_initialized());
        assert_eq!(program.version(), "Interop 1.0");
        assert!(dispatcher.registry().is_constructed("Storage"));
        assert!(!dispatcher.registry().is_constructed("SharedVariable"));
    }

    #[tokio::test]
    async fn corrupt_storage_aborts_startup() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("storage.json"), "not json").unwrap();
        let dispatcher = Dispatcher::new(registry(dir.path().to_path_buf()));

        let err = run(&dispatcher, "v".into(), vec![]).await.unwrap_err();
        assert!(err.to_string().contains("Storage.Load"), "{err:#}");
        let program = dispatcher.registry().get::<ProgramService>().unwrap();
        assert!(!program.is_initialized());
    }
}
