//! Proposal flags and the engine configuration.

use core::fmt;

/// A versioned extension to the core specification whose features are
/// opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Proposal {
    /// Import/export of mutable globals
    ImportExportMutGlobals,
    /// Non-trapping float-to-int conversions
    NonTrapFloatToInt,
    /// Sign-extension operators
    SignExtensionOperators,
    /// Multiple results and block parameters
    MultiValue,
    /// Bulk memory operations
    BulkMemoryOperations,
    /// Reference types
    ReferenceTypes,
    /// 128-bit vectors
    Simd,
    /// Tail calls
    TailCall,
    /// Custom annotation syntax
    Annotations,
    /// 64-bit memories
    Memory64,
    /// Exception handling
    ExceptionHandling,
    /// Threads and atomics
    Threads,
    /// Typed function references
    FunctionReferences,
    /// Garbage-collected types
    Gc,
    /// Extended constant expressions
    ExtendedConst,
    /// Component model
    ComponentModel,
}

impl Proposal {
    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl fmt::Display for Proposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ImportExportMutGlobals => "mutable-globals",
            Self::NonTrapFloatToInt => "nontrapping-fptoint",
            Self::SignExtensionOperators => "sign-extension",
            Self::MultiValue => "multi-value",
            Self::BulkMemoryOperations => "bulk-memory",
            Self::ReferenceTypes => "reference-types",
            Self::Simd => "simd",
            Self::TailCall => "tail-call",
            Self::Annotations => "annotations",
            Self::Memory64 => "memory64",
            Self::ExceptionHandling => "exception-handling",
            Self::Threads => "threads",
            Self::FunctionReferences => "function-references",
            Self::Gc => "gc",
            Self::ExtendedConst => "extended-const",
            Self::ComponentModel => "component-model",
        };
        f.write_str(name)
    }
}

/// An immutable set of enabled proposals, shared by reference between
/// the decoder and the validator. No global state is involved; two
/// configurations may disagree and coexist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    proposals: u32,
}

impl Config {
    /// A configuration with no proposals enabled: bit-exact Wasm 1.0.
    pub fn minimal() -> Self {
        Self { proposals: 0 }
    }

    /// Enable a proposal.
    #[must_use]
    pub fn enable(mut self, proposal: Proposal) -> Self {
        self.proposals |= proposal.bit();
        self
    }

    /// Disable a proposal.
    #[must_use]
    pub fn disable(mut self, proposal: Proposal) -> Self {
        self.proposals &= !proposal.bit();
        self
    }

    /// Whether the proposal is enabled.
    pub fn has_proposal(&self, proposal: Proposal) -> bool {
        self.proposals & proposal.bit() != 0
    }
}

impl Default for Config {
    /// The default feature set: the widely shipped proposals are on,
    /// the still-moving ones (GC, threads, tail calls, ...) are off.
    fn default() -> Self {
        Self::minimal()
            .enable(Proposal::ImportExportMutGlobals)
            .enable(Proposal::NonTrapFloatToInt)
            .enable(Proposal::SignExtensionOperators)
            .enable(Proposal::MultiValue)
            .enable(Proposal::BulkMemoryOperations)
            .enable(Proposal::ReferenceTypes)
            .enable(Proposal::Simd)
    }
}
