//! The staged load → validate → instantiate pipeline.

use log::{debug, error};

use wec_error::{kinds, Result};
use wec_format::Module;
use wec_foundation::Config;
use wec_validator::Validator;

/// The pipeline stage a module has reached.
///
/// Stages are strictly ordered; every operation names the minimum
/// stage it requires and the stage it establishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// No module present
    Inited,
    /// A module has been decoded
    Loaded,
    /// The module passed validation
    Validated,
    /// The module was handed to an executor
    Instantiated,
}

/// The instantiation collaborator the engine core delegates to.
///
/// Execution is outside this crate: an embedder brings its own store
/// and runtime and receives the validated module through this seam.
pub trait Executor {
    /// The instance representation the executor produces.
    type Instance;

    /// Instantiate a validated module.
    fn instantiate(&mut self, module: &Module) -> Result<Self::Instance>;
}

/// The pipeline facade: owns the configuration and the current module,
/// and enforces stage ordering across load, validate, and instantiate.
#[derive(Debug)]
pub struct Engine {
    config: Config,
    stage: Stage,
    module: Option<Module>,
}

impl Engine {
    /// An engine with no module loaded.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            stage: Stage::Inited,
            module: None,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The stage the pipeline is currently in.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The decoded module, once one is loaded.
    pub fn module(&self) -> Option<&Module> {
        self.module.as_ref()
    }

    /// Decode a module from bytes, replacing any prior module. Allowed
    /// from every stage; establishes `Loaded`.
    pub fn load_from_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let module = wec_decoder::load_module(bytes, &self.config).map_err(|e| {
            error!("load failed: {e}");
            e
        })?;
        debug!(
            "loaded module: {} types, {} functions",
            module.types.len(),
            module.funcs.len()
        );
        self.module = Some(module);
        self.stage = Stage::Loaded;
        Ok(())
    }

    /// Decode a module from a file, replacing any prior module.
    #[cfg(feature = "std")]
    pub fn load_from_file<P: AsRef<std::path::Path>>(&mut self, path: P) -> Result<()> {
        let module = wec_decoder::load_module_from_file(path, &self.config).map_err(|e| {
            error!("load failed: {e}");
            e
        })?;
        self.module = Some(module);
        self.stage = Stage::Loaded;
        Ok(())
    }

    /// Register an already-decoded module, validating it on the way
    /// in. If a module was instantiated, the pipeline drops back and
    /// requires re-instantiation.
    pub fn register_module(&mut self, module: Module) -> Result<()> {
        if self.stage == Stage::Instantiated {
            debug!("re-registration demotes the pipeline to validated");
            self.stage = Stage::Validated;
        }
        Validator::new(&self.config).validate(&module)?;
        self.module = Some(module);
        self.stage = Stage::Validated;
        Ok(())
    }

    /// Validate the loaded module. Requires `Loaded`; establishes
    /// `Validated`.
    pub fn validate(&mut self) -> Result<()> {
        if self.stage < Stage::Loaded {
            return Err(kinds::wrong_vm_workflow("validate requires a loaded module"));
        }
        // Stage and module advance together, so a stage of at least
        // Loaded implies a module.
        let Some(module) = self.module.as_ref() else {
            unreachable!("stage is at least Loaded")
        };
        Validator::new(&self.config).validate(module).map_err(|e| {
            error!("validation failed: {e}");
            e
        })?;
        debug!("module validated");
        self.stage = Stage::Validated;
        Ok(())
    }

    /// Hand the validated module to an executor. Requires `Validated`;
    /// establishes `Instantiated`.
    pub fn instantiate_with<E: Executor>(&mut self, executor: &mut E) -> Result<E::Instance> {
        if self.stage < Stage::Validated {
            return Err(kinds::wrong_vm_workflow(
                "instantiate requires a validated module",
            ));
        }
        let Some(module) = self.module.as_ref() else {
            unreachable!("stage is at least Validated")
        };
        let instance = executor.instantiate(module)?;
        debug!("module instantiated");
        self.stage = Stage::Instantiated;
        Ok(instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wec_error::codes;

    #[test]
    fn validate_before_load_is_a_workflow_error() {
        let mut engine = Engine::new(Config::default());
        let err = engine.validate().unwrap_err();
        assert_eq!(err.code, codes::WRONG_VM_WORKFLOW);
    }

    #[test]
    fn instantiate_before_validate_is_a_workflow_error() {
        struct NoExecutor;
        impl Executor for NoExecutor {
            type Instance = ();
            fn instantiate(&mut self, _module: &Module) -> Result<()> {
                Ok(())
            }
        }

        let mut engine = Engine::new(Config::default());
        let bytes = [0x00, 0x61, 0x73, 0x6D, 0x01, 0x00, 0x00, 0x00];
        engine.load_from_bytes(&bytes).unwrap();
        let err = engine.instantiate_with(&mut NoExecutor).unwrap_err();
        assert_eq!(err.code, codes::WRONG_VM_WORKFLOW);
    }
}
