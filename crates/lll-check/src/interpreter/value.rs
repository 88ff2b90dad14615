//! Runtime value representation for the interpreter.
//!
//! `Integer(w)` values are mathematical integers in `[-2^(w-1), 2^(w-1))`;
//! arithmetic wraps modulo `2^w` except division, which traps.
//! `Pointer` values are handles to a boxed heap cell allocated by `Alloc`;
//! equality is identity. `Struct`/`Array` are immutable sequences of values.

use lll_core::TypeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer { width: u32, value: i64 },
    Pointer(PointerValue),
    Aggregate { ty: TypeId, elements: Vec<Value> },
    Void,
    Undefined(TypeId),
}

/// A handle into the interpreter's heap: the allocated cell plus the path of
/// struct/array indices reached by `GetSubPointer*` from that cell's root
/// value. `path` is empty for a pointer fresh off `Alloc`. Two pointers are
/// equal iff they name the same cell and path (identity, not value,
/// equality).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PointerValue {
    pub cell: u32,
    pub path: Vec<u32>,
}

impl PointerValue {
    pub fn root(cell: u32) -> Self {
        PointerValue {
            cell,
            path: Vec::new(),
        }
    }

    pub fn child(&self, index: u32) -> Self {
        let mut path = self.path.clone();
        path.push(index);
        PointerValue {
            cell: self.cell,
            path,
        }
    }
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Integer { width: 1, value } => Some(*value != 0),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<(u32, i64)> {
        match self {
            Value::Integer { width, value } => Some((*width, *value)),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<&PointerValue> {
        match self {
            Value::Pointer(p) => Some(p),
            _ => None,
        }
    }

    pub fn bool(value: bool) -> Value {
        Value::Integer {
            width: 1,
            value: value as i64,
        }
    }
}

/// Truncates a mathematical result into `width`-bit two's complement
/// wraparound semantics (`i32::MAX + 1 == i32::MIN`).
///
/// `width == 1` (`bool`) is treated as a plain 0/1 bit rather than signed
/// two's complement: the catalog's comparisons and boolean conditions need
/// `true` to read as `1`, not `-1`.
pub fn wrap(width: u32, value: i128) -> i64 {
    if width == 1 {
        return (value & 1) as i64;
    }
    if width >= 64 {
        return value as i64;
    }
    let modulus: i128 = 1i128 << width;
    let half: i128 = modulus / 2;
    let mut m = value % modulus;
    if m < 0 {
        m += modulus;
    }
    if m >= half {
        m -= modulus;
    }
    m as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_on_overflow() {
        assert_eq!(wrap(32, i32::MAX as i128 + 1), i32::MIN as i64);
    }

    #[test]
    fn wraps_on_underflow() {
        assert_eq!(wrap(32, i32::MIN as i128 - 1), i32::MAX as i64);
    }

    #[test]
    fn narrow_width_wraps() {
        assert_eq!(wrap(8, 127), 127);
        assert_eq!(wrap(8, 128), -128);
    }

    #[test]
    fn bool_width_stays_zero_or_one() {
        assert_eq!(wrap(1, 0), 0);
        assert_eq!(wrap(1, 1), 1);
        assert_eq!(wrap(1, 2), 0);
    }

    proptest::proptest! {
        /// `wrap` always lands back in `width`'s signed range, for any width
        /// and any mathematical result: arithmetic wraps, it never
        /// panics or escapes the declared width.
        #[test]
        fn result_always_fits_in_width(width in 1u32..64, value in proptest::num::i128::ANY) {
            let wrapped = wrap(width, value) as i128;
            if width == 1 {
                proptest::prop_assert!(wrapped == 0 || wrapped == 1);
            } else {
                let half: i128 = 1i128 << (width - 1);
                proptest::prop_assert!(wrapped >= -half && wrapped < half);
            }
        }

        /// Wrapping a value already in range is a no-op (idempotence at the
        /// boundary the interpreter relies on between successive ops).
        #[test]
        fn in_range_value_is_unchanged(width in 2u32..64, offset in 0i128..1000) {
            let half: i128 = 1i128 << (width - 1);
            let value = (offset % (2 * half)) - half;
            proptest::prop_assert_eq!(wrap(width, value) as i128, value);
        }
    }
}
