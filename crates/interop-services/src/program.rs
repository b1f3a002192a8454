//! Program service: process bootstrap state shared with the front-end.

use parking_lot::RwLock;
use thiserror::Error;
use tracing::info;

use crate::{MethodTable, Service};

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("PreInit must be called before Init")]
    NotPreInitialized,
}

#[derive(Debug, Default)]
struct ProgramState {
    version: String,
    args: Vec<String>,
    config_dir: Option<String>,
    pre_initialized: bool,
    initialized: bool,
}

/// Version string and launch arguments, recorded by the startup sequence.
#[derive(Debug, Default)]
pub struct ProgramService {
    state: RwLock<ProgramState>,
}

impl ProgramService {
    pub fn pre_init(&self, version: String, args: Vec<String>) {
        let config_dir = args
            .iter()
            .find_map(|a| a.strip_prefix("--config="))
            .map(str::to_string);

        info!("PreInit: {version}");
        let mut state = self.state.write();
        state.version = version;
        state.args = args;
        state.config_dir = config_dir;
        state.pre_initialized = true;
    }

    pub fn init(&self) -> Result<(), ProgramError> {
        let mut state = self.state.write();
        if !state.pre_initialized {
            return Err(ProgramError::NotPreInitialized);
        }
        state.initialized = true;
        Ok(())
    }

    pub fn version(&self) -> String {
        self.state.read().version.clone()
    }

    pub fn args(&self) -> Vec<String> {
        self.state.read().args.clone()
    }

    /// Value of a `--config=<dir>` launch argument, if any.
    pub fn config_dir(&self) -> Option<String> {
        self.state.read().config_dir.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().initialized
    }
}

impl Service for ProgramService {
    const NAME: &'static str = "Program";

    fn methods(table: MethodTable<Self>) -> MethodTable<Self> {
        table
            .sync("PreInit", |s, (version, args): (String, Vec<String>)| {
                s.pre_init(version, args);
                Ok::<_, ProgramError>(())
            })
            .sync("Init", |s, (): ()| s.init())
            .sync("GetVersion", |s, (): ()| Ok::<_, ProgramError>(s.version()))
            .sync("GetArgs", |s, (): ()| Ok::<_, ProgramError>(s.args()))
            .sync("GetConfigDir", |s, (): ()| Ok::<_, ProgramError>(s.config_dir()))
            .sync("IsInitialized", |s, (): ()| Ok::<_, ProgramError>(s.is_initialized()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_requires_pre_init() {
        let program = ProgramService::default();
        assert!(matches!(program.init(), Err(ProgramError::NotPreInitialized)));
        assert!(!program.is_initialized());
    }

    #[test]
    fn pre_init_records_version_and_config_dir() {
        let program = ProgramService::default();
        program.pre_init("App 1.0".into(), vec!["--config=/data/app/".into(), "-v".into()]);
        program.init().unwrap();
        assert_eq!(program.version(), "App 1.0");
        assert_eq!(program.config_dir().as_deref(), Some("/data/app/"));
        assert_eq!(program.args().len(), 2);
        assert!(program.is_initialized());
    }
}
