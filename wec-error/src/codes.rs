// WEC - wec-error
// Module: Error codes
//
// SPDX-License-Identifier: MIT

//! Error codes for the WEC engine core.
//!
//! Codes are grouped in numeric ranges by category; the range a code
//! falls in always matches the [`ErrorCategory`](crate::ErrorCategory)
//! it is reported under.

// Load error codes (1000-1999)

/// Input ended while more bytes were required
pub const UNEXPECTED_END: u16 = 1000;
/// LEB128 integer used more bytes than its type permits
pub const INTEGER_TOO_LONG: u16 = 1001;
/// LEB128 integer value exceeds the range of its type
pub const INTEGER_TOO_LARGE: u16 = 1002;
/// Incorrect magic header
pub const MALFORMED_MAGIC: u16 = 1003;
/// Unsupported binary format version
pub const MALFORMED_VERSION: u16 = 1004;
/// Section framing violation (unknown ID, size mismatch, bad ordering)
pub const MALFORMED_SECTION: u16 = 1005;
/// Unknown or proposal-gated value type byte
pub const MALFORMED_VALTYPE: u16 = 1006;
/// Unknown or proposal-gated opcode
pub const MALFORMED_OPCODE: u16 = 1007;
/// Mutability byte other than const (0x00) or var (0x01)
pub const INVALID_MUT: u16 = 1008;
/// Shared limit kind without a maximum
pub const SHARED_MEMORY_NO_MAX: u16 = 1009;
/// Name entry is not valid UTF-8
pub const MALFORMED_UTF8: u16 = 1010;

// Validation error codes (2000-2999)

/// Instruction sequence does not satisfy the stack type discipline
pub const TYPE_CHECK_FAILED: u16 = 2000;
/// Function index out of range
pub const INVALID_FUNC_IDX: u16 = 2001;
/// Type index out of range or of the wrong kind
pub const INVALID_TYPE_IDX: u16 = 2002;
/// Local index out of range
pub const INVALID_LOCAL_IDX: u16 = 2003;
/// Global index out of range
pub const INVALID_GLOBAL_IDX: u16 = 2004;
/// Assignment to an immutable global
pub const IMMUTABLE_GLOBAL: u16 = 2005;
/// Table index out of range
pub const INVALID_TABLE_IDX: u16 = 2006;
/// Memory index out of range
pub const INVALID_MEMORY_IDX: u16 = 2007;
/// Data segment index out of range
pub const INVALID_DATA_IDX: u16 = 2008;
/// Element segment index out of range
pub const INVALID_ELEM_IDX: u16 = 2009;
/// Function reference not declared
pub const INVALID_REF_IDX: u16 = 2010;
/// Limit minimum exceeds maximum, or size bound violated
pub const INVALID_LIMIT: u16 = 2011;
/// Two exports share a name
pub const DUPLICATE_EXPORT_NAME: u16 = 2012;
/// Start function signature is not [] -> []
pub const INVALID_START_FUNC: u16 = 2013;
/// Expression is not constant in a context that requires one
pub const CONST_EXPR_REQUIRED: u16 = 2014;
/// Data count section missing but required by an instruction
pub const DATA_COUNT_REQUIRED: u16 = 2015;
/// Branch label depth exceeds the control nesting
pub const INVALID_LABEL_IDX: u16 = 2016;

// Workflow error codes (3000-3999)

/// Pipeline operation invoked from the wrong stage
pub const WRONG_VM_WORKFLOW: u16 = 3000;
/// Instance reference does not name a live instance
pub const WRONG_INSTANCE_ADDRESS: u16 = 3001;
