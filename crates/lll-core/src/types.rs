//! The type system.
//!
//! A [`Type`] is one of the constructors fixed by the data model: `Void`,
//! `Integer(width)`, `Pointer(inner)`, `Function(params, ret)`,
//! `Struct(name, props)`, `Array(inner, size)`, and the internal `Block`
//! type used only by basic-block values. Types have structural identity:
//! two types are equal iff their constructor and fields are equal.
//!
//! Every `Type` is interned through a [`TypeInterner`], which hands out a
//! cheap, `Copy` [`TypeId`] and deduplicates on structural equality.
//! Interning every constructor, not just `Integer`/`Pointer`, keeps equality
//! and hashing on composite types (`Struct`, `Array`, `Function`) just as
//! cheap, at the cost of one hash-map probe per construction.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Interned handle to a [`Type`]. Two `TypeId`s compare equal iff the types
/// they name are structurally equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TypeId {
    /// Pre-registered by every [`TypeInterner::new`].
    pub const VOID: TypeId = TypeId(0);
    /// Pre-registered by every [`TypeInterner::new`].
    pub const BLOCK: TypeId = TypeId(1);
    /// `bool` is `Integer(1)`; pre-registered for convenience.
    pub const BOOL: TypeId = TypeId(2);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    /// The type of basic-block operands; never constructible from source.
    Block,
    Integer(u32),
    Pointer(TypeId),
    Function(Vec<TypeId>, TypeId),
    Struct(String, Vec<TypeId>),
    Array(TypeId, u32),
}

impl Type {
    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Integer(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }
}

/// The type system's single, append-only table. It is threaded explicitly
/// through every component that needs to construct or compare types,
/// rather than hidden as global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeInterner {
    types: Vec<Type>,
    index: HashMap<Type, TypeId>,
}

impl TypeInterner {
    pub fn new() -> Self {
        let mut interner = TypeInterner {
            types: Vec::new(),
            index: HashMap::new(),
        };
        let void = interner.intern(Type::Void);
        let block = interner.intern(Type::Block);
        let bool_ = interner.intern(Type::Integer(1));
        debug_assert_eq!(void, TypeId::VOID);
        debug_assert_eq!(block, TypeId::BLOCK);
        debug_assert_eq!(bool_, TypeId::BOOL);
        interner
    }

    pub fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(id) = self.index.get(&ty) {
            return *id;
        }
        let id = TypeId(self.types.len() as u32);
        self.index.insert(ty.clone(), id);
        self.types.push(ty);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        self.types
            .get(id.index())
            .unwrap_or_else(|| panic!("unregistered TypeId({})", id.0))
    }

    pub fn try_get(&self, id: TypeId) -> Option<&Type> {
        self.types.get(id.index())
    }

    pub fn integer(&mut self, width: u32) -> TypeId {
        self.intern(Type::Integer(width))
    }

    pub fn pointer(&mut self, inner: TypeId) -> TypeId {
        self.intern(Type::Pointer(inner))
    }

    pub fn function(&mut self, params: Vec<TypeId>, ret: TypeId) -> TypeId {
        self.intern(Type::Function(params, ret))
    }

    pub fn struct_type(&mut self, name: impl Into<String>, props: Vec<TypeId>) -> TypeId {
        self.intern(Type::Struct(name.into(), props))
    }

    pub fn array(&mut self, inner: TypeId, size: u32) -> TypeId {
        self.intern(Type::Array(inner, size))
    }

    pub fn void(&self) -> TypeId {
        TypeId::VOID
    }

    pub fn block(&self) -> TypeId {
        TypeId::BLOCK
    }

    pub fn bool(&self) -> TypeId {
        TypeId::BOOL
    }

    /// `unpoint(T) = Some(U)` iff `T = Pointer(U)`.
    pub fn unpoint(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            Type::Pointer(inner) => Some(*inner),
            _ => None,
        }
    }

    /// Renders a type for error messages and the textual IR.
    pub fn display(&self, id: TypeId) -> String {
        match self.get(id) {
            Type::Void => "void".to_string(),
            Type::Block => "block".to_string(),
            Type::Integer(1) => "bool".to_string(),
            Type::Integer(w) => format!("i{w}"),
            Type::Pointer(inner) => format!("ptr<{}>", self.display(*inner)),
            Type::Function(params, ret) => {
                let params = params
                    .iter()
                    .map(|p| self.display(*p))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("fn({params}) -> {}", self.display(*ret))
            }
            Type::Struct(name, _) => name.clone(),
            Type::Array(inner, size) => format!("[{}; {size}]", self.display(*inner)),
        }
    }
}

impl TypeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for TypeInterner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_preregistered() {
        let interner = TypeInterner::new();
        assert_eq!(*interner.get(TypeId::VOID), Type::Void);
        assert_eq!(*interner.get(TypeId::BLOCK), Type::Block);
        assert_eq!(*interner.get(TypeId::BOOL), Type::Integer(1));
    }

    #[test]
    fn integer_and_pointer_are_canonicalized() {
        let mut interner = TypeInterner::new();
        let i32_a = interner.integer(32);
        let i32_b = interner.integer(32);
        assert_eq!(i32_a, i32_b);

        let ptr_a = interner.pointer(i32_a);
        let ptr_b = interner.pointer(i32_b);
        assert_eq!(ptr_a, ptr_b);
    }

    #[test]
    fn distinct_structural_shapes_get_distinct_ids() {
        let mut interner = TypeInterner::new();
        let i32_ty = interner.integer(32);
        let i64_ty = interner.integer(64);
        assert_ne!(i32_ty, i64_ty);

        let arr = interner.array(i32_ty, 4);
        let ptr = interner.pointer(i32_ty);
        assert_ne!(arr, ptr);
    }

    #[test]
    fn struct_types_compare_by_name_and_fields() {
        let mut interner = TypeInterner::new();
        let i32_ty = interner.integer(32);
        let a = interner.struct_type("Point", vec![i32_ty, i32_ty]);
        let b = interner.struct_type("Point", vec![i32_ty, i32_ty]);
        assert_eq!(a, b);

        let c = interner.struct_type("Point3", vec![i32_ty, i32_ty, i32_ty]);
        assert_ne!(a, c);
    }

    #[test]
    fn unpoint_roundtrip() {
        let mut interner = TypeInterner::new();
        let i32_ty = interner.integer(32);
        let ptr = interner.pointer(i32_ty);
        assert_eq!(interner.unpoint(ptr), Some(i32_ty));
        assert_eq!(interner.unpoint(i32_ty), None);
    }

    #[test]
    fn display_nested_types() {
        let mut interner = TypeInterner::new();
        let i32_ty = interner.integer(32);
        let ptr = interner.pointer(i32_ty);
        assert_eq!(interner.display(ptr), "ptr<i32>");
        assert_eq!(interner.display(TypeId::BOOL), "bool");
    }

    #[test]
    fn serde_roundtrip() {
        let mut interner = TypeInterner::new();
        interner.integer(32);
        let json = serde_json::to_string(&interner).unwrap();
        let back: TypeInterner = serde_json::from_str(&json).unwrap();
        assert_eq!(back.types.len(), interner.types.len());
    }
}
