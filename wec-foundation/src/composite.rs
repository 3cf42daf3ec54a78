//! Function, struct, array, sub, and recursive defined types.

use alloc::vec;
use alloc::vec::Vec;

use crate::types::{FullValType, StorageType, ValMut};

/// A struct or array field: mutability plus storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldType {
    /// Whether the field may be written after creation
    pub mutability: ValMut,
    /// The field's storage type, possibly packed
    pub storage: StorageType,
}

/// An ordered sequence of fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StructType {
    /// The fields, in declaration order
    pub fields: Vec<FieldType>,
}

/// An array of one element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayType {
    /// The element field
    pub field: FieldType,
}

/// A function signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionType {
    /// Parameter types, in order
    pub params: Vec<FullValType>,
    /// Result types, in order
    pub results: Vec<FullValType>,
}

impl FunctionType {
    /// A signature taking `params` and producing `results`.
    pub fn new(params: Vec<FullValType>, results: Vec<FullValType>) -> Self {
        Self { params, results }
    }
}

/// The body of a defined type: one of the three structural kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeType {
    /// A function type (tag 0x60)
    Func(FunctionType),
    /// A struct type (tag 0x5F)
    Struct(StructType),
    /// An array type (tag 0x5E)
    Array(ArrayType),
}

impl CompositeType {
    /// The function signature, if this is a function body.
    pub fn as_func(&self) -> Option<&FunctionType> {
        match self {
            Self::Func(ft) => Some(ft),
            _ => None,
        }
    }
}

/// A structural body plus the defined-type indices it declares as
/// parents for subtyping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubType {
    /// Parent defined-type indices
    pub parents: Vec<u32>,
    /// The structural body
    pub composite: CompositeType,
}

impl SubType {
    /// A sub type with no declared parents.
    pub fn final_type(composite: CompositeType) -> Self {
        Self {
            parents: Vec::new(),
            composite,
        }
    }
}

/// One entry of the type section.
///
/// Legacy encodings declare a bare structural body; the GC proposal
/// adds explicit sub types and recursive groups. A `Sub` entry is
/// semantically a singleton group, but the distinction is kept in the
/// AST so consumers can tell the encodings apart; [`Self::sub_types`]
/// gives the uniform group view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinedType {
    /// Legacy bare function type
    Func(FunctionType),
    /// Legacy bare struct type
    Struct(StructType),
    /// Legacy bare array type
    Array(ArrayType),
    /// An explicit sub type (singleton recursion group)
    Sub(SubType),
    /// A recursion group of sub types
    Rec(Vec<SubType>),
}

impl DefinedType {
    /// The group members this entry contributes to the module's type
    /// index space, in order. Bare bodies become parentless sub types.
    pub fn sub_types(&self) -> Vec<SubType> {
        match self {
            Self::Func(ft) => vec![SubType::final_type(CompositeType::Func(ft.clone()))],
            Self::Struct(st) => vec![SubType::final_type(CompositeType::Struct(st.clone()))],
            Self::Array(at) => vec![SubType::final_type(CompositeType::Array(*at))],
            Self::Sub(st) => vec![st.clone()],
            Self::Rec(group) => group.clone(),
        }
    }

    /// How many type indices this entry occupies.
    pub fn group_len(&self) -> usize {
        match self {
            Self::Rec(group) => group.len(),
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_types_flattens_every_encoding() {
        let ft = FunctionType::new(vec![FullValType::I32], vec![]);
        let legacy = DefinedType::Func(ft.clone());
        let type_group = legacy.sub_types();
        assert_eq!(type_group.len(), 1);
        assert!(type_group[0].parents.is_empty());
        assert_eq!(type_group[0].composite.as_func(), Some(&ft));

        let rec = DefinedType::Rec(vec![
            SubType::final_type(CompositeType::Func(ft.clone())),
            SubType {
                parents: vec![0],
                composite: CompositeType::Func(ft),
            },
        ]);
        assert_eq!(rec.group_len(), 2);
        assert_eq!(rec.sub_types()[1].parents, vec![0]);
    }
}
