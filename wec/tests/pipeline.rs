//! End-to-end pipeline tests: load, validate, instantiate, reload.

use wec::{codes, Config, Engine, Executor, Module, Result, Stage};

/// A counting stand-in for an embedder's executor.
#[derive(Default)]
struct RecordingExecutor {
    instantiations: usize,
}

impl Executor for RecordingExecutor {
    type Instance = usize;

    fn instantiate(&mut self, _module: &Module) -> Result<usize> {
        self.instantiations += 1;
        Ok(self.instantiations)
    }
}

fn add_module_bytes() -> Vec<u8> {
    wat::parse_str(
        r#"(module
             (func (export "add") (param i32 i32) (result i32)
               local.get 0 local.get 1 i32.add))"#,
    )
    .unwrap()
}

#[test]
fn full_pipeline_in_order() {
    let mut engine = Engine::new(Config::default());
    assert_eq!(engine.stage(), Stage::Inited);

    engine.load_from_bytes(&add_module_bytes()).unwrap();
    assert_eq!(engine.stage(), Stage::Loaded);
    assert_eq!(engine.module().unwrap().exports[0].name, "add");

    engine.validate().unwrap();
    assert_eq!(engine.stage(), Stage::Validated);

    let mut executor = RecordingExecutor::default();
    let instance = engine.instantiate_with(&mut executor).unwrap();
    assert_eq!(instance, 1);
    assert_eq!(engine.stage(), Stage::Instantiated);
}

#[test]
fn out_of_order_operations_fail_without_side_effects() {
    let mut engine = Engine::new(Config::default());

    let err = engine.validate().unwrap_err();
    assert_eq!(err.code, codes::WRONG_VM_WORKFLOW);
    assert_eq!(engine.stage(), Stage::Inited);

    let mut executor = RecordingExecutor::default();
    let err = engine.instantiate_with(&mut executor).unwrap_err();
    assert_eq!(err.code, codes::WRONG_VM_WORKFLOW);
    assert_eq!(executor.instantiations, 0);
}

#[test]
fn reload_demotes_the_stage() {
    let mut engine = Engine::new(Config::default());
    engine.load_from_bytes(&add_module_bytes()).unwrap();
    engine.validate().unwrap();
    let mut executor = RecordingExecutor::default();
    engine.instantiate_with(&mut executor).unwrap();
    assert_eq!(engine.stage(), Stage::Instantiated);

    // Loading a new module restarts the pipeline.
    engine.load_from_bytes(&add_module_bytes()).unwrap();
    assert_eq!(engine.stage(), Stage::Loaded);
    let err = engine.instantiate_with(&mut executor).unwrap_err();
    assert_eq!(err.code, codes::WRONG_VM_WORKFLOW);
}

#[test]
fn register_module_requires_revalidation_and_reinstantiation() {
    let config = Config::default();
    let module = wec::load_module(&add_module_bytes(), &config).unwrap();

    let mut engine = Engine::new(config);
    engine.register_module(module.clone()).unwrap();
    assert_eq!(engine.stage(), Stage::Validated);

    let mut executor = RecordingExecutor::default();
    engine.instantiate_with(&mut executor).unwrap();
    assert_eq!(engine.stage(), Stage::Instantiated);

    engine.register_module(module).unwrap();
    assert_eq!(engine.stage(), Stage::Validated);
}

#[test]
fn load_errors_keep_their_offsets() {
    let mut engine = Engine::new(Config::default());
    let err = engine
        .load_from_bytes(&[0x00, 0x61, 0x73, 0x6D, 0x02, 0x00, 0x00, 0x00])
        .unwrap_err();
    assert_eq!(err.code, codes::MALFORMED_VERSION);
    assert_eq!(err.offset, Some(4));
    assert_eq!(engine.stage(), Stage::Inited);
}

#[test]
fn invalid_module_does_not_reach_the_executor() {
    let bytes = wat::parse_str("(module (func (result i32)))").unwrap();
    let mut engine = Engine::new(Config::default());
    engine.load_from_bytes(&bytes).unwrap();
    let err = engine.validate().unwrap_err();
    assert_eq!(err.code, codes::TYPE_CHECK_FAILED);
    assert_eq!(engine.stage(), Stage::Loaded);
}

#[test]
fn load_from_file_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("add.wasm");
    std::fs::write(&path, add_module_bytes()).unwrap();

    let mut engine = Engine::new(Config::default());
    engine.load_from_file(&path).unwrap();
    engine.validate().unwrap();
    assert_eq!(engine.stage(), Stage::Validated);
}
