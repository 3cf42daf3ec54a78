//! WebAssembly binary format constants.
//!
//! The exact byte values are part of the wire format; the type-section
//! tags follow the GC proposal revision the engine pins (explicit sub
//! types tagged 0x50, recursion groups 0x4F with tagless members).

#![allow(missing_docs)]

/// Magic bytes for WebAssembly modules: `\0asm`
pub const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];

/// WebAssembly binary format version
pub const WASM_VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

// Section IDs
pub const CUSTOM_SECTION_ID: u8 = 0x00;
pub const TYPE_SECTION_ID: u8 = 0x01;
pub const IMPORT_SECTION_ID: u8 = 0x02;
pub const FUNCTION_SECTION_ID: u8 = 0x03;
pub const TABLE_SECTION_ID: u8 = 0x04;
pub const MEMORY_SECTION_ID: u8 = 0x05;
pub const GLOBAL_SECTION_ID: u8 = 0x06;
pub const EXPORT_SECTION_ID: u8 = 0x07;
pub const START_SECTION_ID: u8 = 0x08;
pub const ELEMENT_SECTION_ID: u8 = 0x09;
pub const CODE_SECTION_ID: u8 = 0x0A;
pub const DATA_SECTION_ID: u8 = 0x0B;
pub const DATA_COUNT_SECTION_ID: u8 = 0x0C;

// Value-type bytes
pub const I32_TYPE: u8 = 0x7F;
pub const I64_TYPE: u8 = 0x7E;
pub const F32_TYPE: u8 = 0x7D;
pub const F64_TYPE: u8 = 0x7C;
pub const V128_TYPE: u8 = 0x7B;
pub const I8_STORAGE_TYPE: u8 = 0x78;
pub const I16_STORAGE_TYPE: u8 = 0x77;
pub const FUNCREF_TYPE: u8 = 0x70;
pub const EXTERNREF_TYPE: u8 = 0x6F;

// Typed-reference prefixes (function-references proposal)
pub const REF_NULL_PREFIX: u8 = 0x63;
pub const REF_PREFIX: u8 = 0x64;

// Type-section entry tags
pub const FUNC_TYPE_TAG: u8 = 0x60;
pub const STRUCT_TYPE_TAG: u8 = 0x5F;
pub const ARRAY_TYPE_TAG: u8 = 0x5E;
pub const SUB_TYPE_TAG: u8 = 0x50;
pub const REC_TYPE_TAG: u8 = 0x4F;

// Limit kind bytes
pub const LIMIT_HAS_MIN: u8 = 0x00;
pub const LIMIT_HAS_MIN_MAX: u8 = 0x01;
pub const LIMIT_SHARED_NO_MAX: u8 = 0x02;
pub const LIMIT_SHARED: u8 = 0x03;

// Mutability bytes
pub const MUT_CONST: u8 = 0x00;
pub const MUT_VAR: u8 = 0x01;

// Block type marker
pub const BLOCK_TYPE_EMPTY: u8 = 0x40;

// Multi-byte opcode prefixes
pub const MISC_PREFIX: u8 = 0xFC;
pub const SIMD_PREFIX: u8 = 0xFD;
pub const ATOMIC_PREFIX: u8 = 0xFE;

// Expression terminator
pub const END_OPCODE: u8 = 0x0B;
pub const ELSE_OPCODE: u8 = 0x05;
