//! Whole-module validation driven through the decoder.

use wec_decoder::load_module;
use wec_error::codes;
use wec_foundation::{Config, Proposal};
use wec_validator::Validator;

fn validate_wat_with(config: &Config, wat_text: &str) -> wec_error::Result<()> {
    let bytes = wat::parse_str(wat_text).expect("test module must assemble");
    let module = load_module(&bytes, config)?;
    Validator::new(config).validate(&module)
}

fn validate_wat(wat_text: &str) -> wec_error::Result<()> {
    validate_wat_with(&Config::default(), wat_text)
}

#[test]
fn empty_function_validates() {
    validate_wat("(module (func))").unwrap();
}

#[test]
fn identity_function_validates() {
    validate_wat("(module (func (param i32) (result i32) local.get 0))").unwrap();
}

#[test]
fn missing_result_is_a_stack_underflow() {
    let err = validate_wat("(module (func (result i32)))").unwrap_err();
    assert_eq!(err.code, codes::TYPE_CHECK_FAILED);
}

#[test]
fn code_after_unreachable_is_polymorphic() {
    validate_wat("(module (func unreachable i32.const 0 drop))").unwrap();
}

#[test]
fn loop_branch_checks_against_params() {
    validate_wat(
        r#"(module
             (func (result i32)
               i32.const 1
               (loop (param i32) (result i32)
                 br 0)))"#,
    )
    .unwrap();
}

#[test]
fn if_else_with_block_parameters() {
    validate_wat(
        r#"(module
             (func (result i32)
               i32.const 2
               i32.const 1
               (if (param i32) (result i32)
                 (then i32.const 1 i32.add)
                 (else i32.const 10 i32.add))))"#,
    )
    .unwrap();
}

#[test]
fn extended_const_initializers_require_the_proposal() {
    let text = r#"(module (global i32 (i32.add (i32.const 1) (i32.const 2))))"#;
    let err = validate_wat(text).unwrap_err();
    assert_eq!(err.code, codes::CONST_EXPR_REQUIRED);

    let config = Config::default().enable(Proposal::ExtendedConst);
    validate_wat_with(&config, text).unwrap();
}

#[test]
fn immutable_global_cannot_be_set() {
    let err = validate_wat(
        r#"(module
             (global i32 (i32.const 1))
             (func i32.const 5 global.set 0))"#,
    )
    .unwrap_err();
    assert_eq!(err.code, codes::IMMUTABLE_GLOBAL);
}

#[test]
fn mutable_global_can_be_set() {
    validate_wat(
        r#"(module
             (global (mut i32) (i32.const 1))
             (func i32.const 5 global.set 0))"#,
    )
    .unwrap();
}

#[test]
fn calls_check_signatures() {
    validate_wat(
        r#"(module
             (func $add (param i32 i32) (result i32)
               local.get 0 local.get 1 i32.add)
             (func (result i32)
               i32.const 1 i32.const 2 call $add))"#,
    )
    .unwrap();

    let err = validate_wat(
        r#"(module
             (func $f (param i32))
             (func f64.const 1 call $f))"#,
    )
    .unwrap_err();
    assert_eq!(err.code, codes::TYPE_CHECK_FAILED);
}

#[test]
fn call_indirect_requires_a_table() {
    let err = validate_wat(
        r#"(module
             (type (func))
             (func i32.const 0 call_indirect (type 0)))"#,
    )
    .unwrap_err();
    assert_eq!(err.code, codes::INVALID_TABLE_IDX);

    validate_wat(
        r#"(module
             (type (func))
             (table 1 funcref)
             (func i32.const 0 call_indirect (type 0)))"#,
    )
    .unwrap();
}

#[test]
fn element_segments_declare_function_refs() {
    validate_wat(
        r#"(module
             (table 1 funcref)
             (func $f)
             (elem (i32.const 0) $f)
             (func (result funcref) ref.func $f))"#,
    )
    .unwrap();

    let err = validate_wat("(module (func $f) (func (result funcref) ref.func $f))").unwrap_err();
    assert_eq!(err.code, codes::INVALID_REF_IDX);
}

#[test]
fn exported_functions_are_referenceable() {
    validate_wat(
        r#"(module
             (func $f (export "f"))
             (func (result funcref) ref.func $f))"#,
    )
    .unwrap();
}

#[test]
fn duplicate_export_names_are_rejected() {
    let err = validate_wat(
        r#"(module
             (func $f)
             (export "name" (func $f))
             (export "name" (func $f)))"#,
    )
    .unwrap_err();
    assert_eq!(err.code, codes::DUPLICATE_EXPORT_NAME);
}

#[test]
fn start_function_signature_is_checked() {
    let err = validate_wat("(module (func $s (param i32)) (start $s))").unwrap_err();
    assert_eq!(err.code, codes::INVALID_START_FUNC);

    validate_wat("(module (func $s) (start $s))").unwrap();
}

#[test]
fn global_initializers_are_constant_expressions() {
    let err = validate_wat(
        r#"(module
             (global i32 (i32.const 1))
             (global i32 (global.get 0)))"#,
    )
    .unwrap_err();
    // Initializers may only read imported globals.
    assert_eq!(err.code, codes::INVALID_GLOBAL_IDX);

    validate_wat(
        r#"(module
             (import "env" "base" (global i32))
             (global i32 (global.get 0)))"#,
    )
    .unwrap();
}

#[test]
fn active_segment_offsets_are_typed() {
    let err = validate_wat(
        r#"(module
             (memory 1)
             (data (i64.const 0) "x"))"#,
    )
    .unwrap_err();
    assert_eq!(err.code, codes::TYPE_CHECK_FAILED);
}

#[test]
fn memory_limits_are_bounded() {
    let err = validate_wat("(module (memory 70000))").unwrap_err();
    assert_eq!(err.code, codes::INVALID_LIMIT);

    let err = validate_wat("(module (memory 2 1))").unwrap_err();
    assert_eq!(err.code, codes::INVALID_LIMIT);
}

#[test]
fn local_index_bounds() {
    let err = validate_wat("(module (func local.get 0 drop))").unwrap_err();
    assert_eq!(err.code, codes::INVALID_LOCAL_IDX);
}

#[test]
fn bulk_memory_ops_check_data_segments() {
    validate_wat(
        r#"(module
             (memory 1)
             (data "abc")
             (func i32.const 0 i32.const 0 i32.const 3 memory.init 0))"#,
    )
    .unwrap();

    let err = validate_wat(
        r#"(module
             (memory 1)
             (data "abc")
             (func i32.const 0 i32.const 0 i32.const 3 memory.init 1))"#,
    )
    .unwrap_err();
    assert_eq!(err.code, codes::INVALID_DATA_IDX);
}

#[test]
fn table_ops_validate_element_types() {
    validate_wat(
        r#"(module
             (table $t 4 funcref)
             (elem $e func)
             (func i32.const 0 i32.const 0 i32.const 0 table.init $t $e))"#,
    )
    .unwrap();
}

#[test]
fn branch_depths_are_bounded() {
    let err = validate_wat("(module (func br 2))").unwrap_err();
    assert_eq!(err.code, codes::INVALID_LABEL_IDX);
}

#[test]
fn validation_offsets_point_into_the_binary() {
    let config = Config::default();
    let bytes = wat::parse_str("(module (func i32.const 1 global.set 0))").unwrap();
    let module = load_module(&bytes, &config).unwrap();
    let err = Validator::new(&config).validate(&module).unwrap_err();
    assert_eq!(err.code, codes::INVALID_GLOBAL_IDX);
    let offset = err.offset.expect("validator errors carry offsets");
    // The offending global.set lies inside the code section.
    assert!((offset as usize) < bytes.len());
    assert_eq!(bytes[offset as usize], 0x24);
}

#[test]
fn validating_twice_is_idempotent() {
    let config = Config::default();
    let bytes = wat::parse_str("(module (func (result i32) i32.const 7))").unwrap();
    let module = load_module(&bytes, &config).unwrap();
    Validator::new(&config).validate(&module).unwrap();
    Validator::new(&config).validate(&module).unwrap();
}
