//! The constant-value model folding is performed against.
//!
//! Mirrors the host runtime's primitive semantics closely enough to fold
//! `LOAD_CONST` sequences correctly: arbitrary arithmetic overflow, exact
//! floor-division/modulo semantics, and the handful of exceptions folding
//! must preserve rather than evaluate away (division by zero, negative
//! shift counts, modulo of a complex number).

use crate::code_object::CodeObject;
use crate::opcode::Opcode;

/// A literal value, as it would sit in a `LOAD_CONST` argument.
///
/// Every variant here is something the optimizer may both consume (as the
/// operand of a fold) and produce (as the result of one). `Code` is the
/// recursion target for optimizing nested code-object constants.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ConstantValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Real and imaginary parts.
    Complex(f64, f64),
    Str(String),
    Tuple(Vec<ConstantValue>),
    /// Deduplicated; order is not semantically meaningful but is kept stable
    /// (first occurrence wins) so folds are deterministic to compare against.
    FrozenSet(Vec<ConstantValue>),
    Code(Box<CodeObject>),
}

impl ConstantValue {
    /// Python-style truthiness, used by `UNARY_NOT` and the `BUILD_SLICE`
    /// negative property's implicit "never touch this" rule does not apply
    /// here, but by rules that need to know whether a constant is "empty".
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::Complex(re, im) => *re != 0.0 || *im != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::Tuple(items) | Self::FrozenSet(items) => !items.is_empty(),
            Self::Code(_) => true,
        }
    }

    /// Whether this value (recursively) could be a member of a `frozenset`.
    ///
    /// Every constant-pool value is immutable by construction, except nested
    /// code objects, which the host runtime does not allow as set members.
    #[must_use]
    pub fn is_hashable(&self) -> bool {
        match self {
            Self::Code(_) => false,
            Self::Tuple(items) | Self::FrozenSet(items) => items.iter().all(Self::is_hashable),
            Self::None | Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::Complex(..) | Self::Str(_) => true,
        }
    }

    /// "Size" against which `MAX_SIZE` is checked: element count for
    /// sequences/strings/sets, bit length for integers (used after a left
    /// shift), zero (unlimited) otherwise.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Str(s) => s.chars().count(),
            Self::Tuple(items) | Self::FrozenSet(items) => items.len(),
            Self::Int(n) => bit_length(*n),
            Self::None | Self::Bool(_) | Self::Float(_) | Self::Complex(..) | Self::Code(_) => 0,
        }
    }
}

fn bit_length(n: i64) -> usize {
    let bits = u64::BITS - n.unsigned_abs().leading_zeros();
    bits as usize
}

/// Deduplicates constant-folded set members by value, keeping first
/// occurrence, matching Python `frozenset` construction order-insensitivity.
fn dedup_preserve_order(items: Vec<ConstantValue>) -> Vec<ConstantValue> {
    let mut out: Vec<ConstantValue> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// Builds the `FrozenSet` constant for a `BUILD_SET` fold.
///
/// Returns `None` if any member is unhashable, aborting the fold.
#[must_use]
pub fn try_build_frozenset(items: Vec<ConstantValue>) -> Option<ConstantValue> {
    if items.iter().any(|v| !v.is_hashable()) {
        return None;
    }
    Some(ConstantValue::FrozenSet(dedup_preserve_order(items)))
}

/// Evaluates a unary operator over a constant, by host-runtime semantics.
///
/// Returns `None` (leave unchanged) when the operation is undefined for the
/// value's type, or would overflow.
#[must_use]
pub fn try_unary(op: Opcode, value: &ConstantValue) -> Option<ConstantValue> {
    use ConstantValue::{Bool, Complex, Float, Int};
    match (op, value) {
        (Opcode::UnaryPositive, Int(n)) => Some(Int(*n)),
        (Opcode::UnaryPositive, Float(f)) => Some(Float(*f)),
        (Opcode::UnaryPositive, Complex(re, im)) => Some(Complex(*re, *im)),
        (Opcode::UnaryPositive, Bool(b)) => Some(Int(i64::from(*b))),

        (Opcode::UnaryNegative, Int(n)) => n.checked_neg().map(Int),
        (Opcode::UnaryNegative, Float(f)) => Some(Float(-f)),
        (Opcode::UnaryNegative, Complex(re, im)) => Some(Complex(-re, -im)),
        (Opcode::UnaryNegative, Bool(b)) => Some(Int(-i64::from(*b))),

        (Opcode::UnaryInvert, Int(n)) => Some(Int(!n)),
        (Opcode::UnaryInvert, Bool(b)) => Some(Int(!i64::from(*b))),

        // `not x` is defined for every value via truthiness.
        (Opcode::UnaryNot, v) => Some(Bool(!v.is_truthy())),

        _ => None,
    }
}

/// Evaluates a binary operator over two constants, by host-runtime
/// semantics, rejecting any fold whose result would exceed `max_size` or
/// that would raise an exception at runtime (division/modulo by zero,
/// negative shift count, modulo of a complex number).
#[must_use]
pub fn try_binary(op: Opcode, left: &ConstantValue, right: &ConstantValue, max_size: usize) -> Option<ConstantValue> {
    use ConstantValue::{Bool, Complex, Float, Int, Str, Tuple};

    // Booleans participate in arithmetic as 0/1, matching Python.
    fn as_numeric(v: &ConstantValue) -> Option<ConstantValue> {
        match v {
            Bool(b) => Some(Int(i64::from(*b))),
            Int(_) | Float(_) | Complex(..) => Some(v.clone()),
            _ => None,
        }
    }

    let bound = |v: ConstantValue| -> Option<ConstantValue> {
        if v.size() > max_size {
            None
        } else {
            Some(v)
        }
    };

    match op {
        Opcode::BinaryAdd => match (left, right) {
            (Str(a), Str(b)) => bound(Str(format!("{a}{b}"))),
            (Tuple(a), Tuple(b)) => {
                let mut items = a.clone();
                items.extend(b.iter().cloned());
                bound(Tuple(items))
            }
            _ => numeric_binary_sized(op, &as_numeric(left)?, &as_numeric(right)?, max_size),
        },
        Opcode::BinaryMultiply => match (left, right) {
            (Str(s), Int(n)) | (Int(n), Str(s)) => repeat_bound(s.chars().collect::<Vec<_>>(), *n, max_size)
                .map(|chars| Str(chars.into_iter().collect())),
            (Tuple(items), Int(n)) | (Int(n), Tuple(items)) => {
                repeat_bound(items.clone(), *n, max_size).map(Tuple)
            }
            _ => numeric_binary_sized(op, &as_numeric(left)?, &as_numeric(right)?, max_size),
        },
        _ => numeric_binary_sized(op, &as_numeric(left)?, &as_numeric(right)?, max_size),
    }
}

/// Repeats a sequence `n` times, Python-style (`n <= 0` yields empty),
/// rejecting the fold if the repeated length would exceed `max_size`.
fn repeat_bound<T: Clone>(items: Vec<T>, n: i64, max_size: usize) -> Option<Vec<T>> {
    if n <= 0 {
        return Some(Vec::new());
    }
    let len = items.len().checked_mul(usize::try_from(n).ok()?)?;
    if len > max_size {
        return None;
    }
    let mut out = Vec::with_capacity(len);
    for _ in 0..n {
        out.extend(items.iter().cloned());
    }
    Some(out)
}

/// The purely-numeric binary operators: `Int`/`Float`/`Complex` only.
///
/// `max_size` only matters for `LSHIFT`, whose result is bounded by bit
/// length; every other numeric operator here is unbounded.
fn numeric_binary_sized(op: Opcode, left: &ConstantValue, right: &ConstantValue, max_size: usize) -> Option<ConstantValue> {
    use ConstantValue::{Complex, Float, Int};

    match (op, left, right) {
        (Opcode::BinaryAdd, Int(a), Int(b)) => a.checked_add(*b).map(Int),
        (Opcode::BinaryAdd, Float(a), Float(b)) => Some(Float(a + b)),
        (Opcode::BinaryAdd, Int(a), Float(b)) | (Opcode::BinaryAdd, Float(b), Int(a)) => {
            Some(Float(*a as f64 + b))
        }
        (Opcode::BinaryAdd, Complex(ar, ai), Complex(br, bi)) => Some(Complex(ar + br, ai + bi)),
        (Opcode::BinaryAdd, Complex(re, im), other) | (Opcode::BinaryAdd, other, Complex(re, im)) => {
            let f = as_f64(other)?;
            Some(Complex(re + f, *im))
        }

        (Opcode::BinarySubtract, Int(a), Int(b)) => a.checked_sub(*b).map(Int),
        (Opcode::BinarySubtract, Float(a), Float(b)) => Some(Float(a - b)),
        (Opcode::BinarySubtract, Int(a), Float(b)) => Some(Float(*a as f64 - b)),
        (Opcode::BinarySubtract, Float(a), Int(b)) => Some(Float(a - *b as f64)),
        (Opcode::BinarySubtract, Complex(ar, ai), Complex(br, bi)) => Some(Complex(ar - br, ai - bi)),

        (Opcode::BinaryMultiply, Int(a), Int(b)) => a.checked_mul(*b).map(Int),
        (Opcode::BinaryMultiply, Float(a), Float(b)) => Some(Float(a * b)),
        (Opcode::BinaryMultiply, Int(a), Float(b)) | (Opcode::BinaryMultiply, Float(b), Int(a)) => {
            Some(Float(*a as f64 * b))
        }
        (Opcode::BinaryMultiply, Complex(ar, ai), Complex(br, bi)) => {
            Some(Complex(ar * br - ai * bi, ar * bi + ai * br))
        }

        (Opcode::BinaryTrueDivide, _, Int(0)) => None,
        (Opcode::BinaryTrueDivide, _, Float(b)) if *b == 0.0 => None,
        (Opcode::BinaryTrueDivide, a, b) => {
            let (af, bf) = (as_f64(a)?, as_f64(b)?);
            Some(Float(af / bf))
        }

        (Opcode::BinaryFloorDivide, Int(_), Int(0)) => None,
        (Opcode::BinaryFloorDivide, Int(a), Int(b)) => Some(Int(floor_div(*a, *b))),
        (Opcode::BinaryFloorDivide, a, b) => {
            let (af, bf) = (as_f64(a)?, as_f64(b)?);
            if bf == 0.0 {
                return None;
            }
            Some(Float((af / bf).floor()))
        }

        (Opcode::BinaryModulo, Int(_), Int(0)) => None,
        (Opcode::BinaryModulo, Int(a), Int(b)) => Some(Int(floor_mod(*a, *b))),
        (Opcode::BinaryModulo, Float(a), Float(b)) if *b != 0.0 => Some(Float(a - (a / b).floor() * b)),
        (Opcode::BinaryModulo, Int(a), Float(b)) if *b != 0.0 => {
            let a = *a as f64;
            Some(Float(a - (a / b).floor() * b))
        }
        (Opcode::BinaryModulo, Float(a), Int(b)) if *b != 0 => {
            let b = *b as f64;
            Some(Float(a - (a / b).floor() * b))
        }
        // modulo of/by a complex number is not defined by the host runtime.
        (Opcode::BinaryModulo, _, _) => None,

        (Opcode::BinaryPower, Int(a), Int(b)) if *b >= 0 => {
            let exp = u32::try_from(*b).ok()?;
            a.checked_pow(exp).map(Int)
        }
        (Opcode::BinaryPower, a, b) => {
            let (af, bf) = (as_f64(a)?, as_f64(b)?);
            // 0 ** negative raises ZeroDivisionError at runtime; never fold it away.
            if af == 0.0 && bf < 0.0 {
                return None;
            }
            let result = af.powf(bf);
            if result.is_finite() {
                Some(Float(result))
            } else {
                None
            }
        }

        (Opcode::BinaryLshift, Int(a), Int(b)) => {
            if *b < 0 {
                return None;
            }
            let shift = u32::try_from(*b).ok()?;
            let result = a.checked_shl(shift).filter(|_| shift < i64::BITS)?;
            if Int(result).size() > max_size {
                None
            } else {
                Some(Int(result))
            }
        }
        (Opcode::BinaryRshift, Int(a), Int(b)) => {
            if *b < 0 {
                return None;
            }
            let shift = u32::try_from(*b).ok()?;
            if shift >= i64::BITS {
                Some(Int(if *a < 0 { -1 } else { 0 }))
            } else {
                Some(Int(a >> shift))
            }
        }
        (Opcode::BinaryAnd, Int(a), Int(b)) => Some(Int(a & b)),
        (Opcode::BinaryOr, Int(a), Int(b)) => Some(Int(a | b)),
        (Opcode::BinaryXor, Int(a), Int(b)) => Some(Int(a ^ b)),

        _ => None,
    }
}

fn as_f64(v: &ConstantValue) -> Option<f64> {
    match v {
        ConstantValue::Int(n) => Some(*n as f64),
        ConstantValue::Float(f) => Some(*f),
        _ => None,
    }
}

/// Floor division, Python-style: rounds toward negative infinity rather than
/// truncating toward zero.
fn floor_div(a: i64, b: i64) -> i64 {
    let (q, r) = (a / b, a % b);
    if r != 0 && (r < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

/// Modulo with the sign of the divisor, matching Python's `%`.
fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a % b;
    if r != 0 && (r < 0) != (b < 0) {
        r + b
    } else {
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unary_fold_basics() {
        assert_eq!(try_unary(Opcode::UnaryPositive, &ConstantValue::Int(2)), Some(ConstantValue::Int(2)));
        assert_eq!(try_unary(Opcode::UnaryNegative, &ConstantValue::Int(3)), Some(ConstantValue::Int(-3)));
        assert_eq!(try_unary(Opcode::UnaryInvert, &ConstantValue::Int(5)), Some(ConstantValue::Int(-6)));
        assert_eq!(try_unary(Opcode::UnaryNot, &ConstantValue::Str(String::new())), Some(ConstantValue::Bool(true)));
    }

    #[test]
    fn unary_invert_undefined_for_str() {
        assert_eq!(try_unary(Opcode::UnaryInvert, &ConstantValue::Str("x".into())), None);
    }

    #[test]
    fn binary_fold_arithmetic() {
        let cases: &[(Opcode, i64, i64, i64)] = &[
            (Opcode::BinaryAdd, 10, 20, 30),
            (Opcode::BinarySubtract, 5, 1, 4),
            (Opcode::BinaryMultiply, 5, 3, 15),
            (Opcode::BinaryFloorDivide, 10, 3, 3),
            (Opcode::BinaryModulo, 10, 3, 1),
            (Opcode::BinaryLshift, 1, 3, 8),
            (Opcode::BinaryRshift, 16, 3, 2),
            (Opcode::BinaryAnd, 10, 3, 2),
            (Opcode::BinaryOr, 2, 3, 3),
            (Opcode::BinaryXor, 2, 3, 1),
        ];
        for &(op, a, b, expected) in cases {
            assert_eq!(
                try_binary(op, &ConstantValue::Int(a), &ConstantValue::Int(b), 20),
                Some(ConstantValue::Int(expected)),
                "{op} {a} {b}"
            );
        }
        assert_eq!(
            try_binary(Opcode::BinaryTrueDivide, &ConstantValue::Int(10), &ConstantValue::Int(3), 20),
            Some(ConstantValue::Float(10.0 / 3.0))
        );
        assert_eq!(
            try_binary(Opcode::BinaryPower, &ConstantValue::Int(2), &ConstantValue::Int(8), 20),
            Some(ConstantValue::Int(256))
        );
    }

    #[test]
    fn division_by_zero_aborts() {
        assert_eq!(try_binary(Opcode::BinaryTrueDivide, &ConstantValue::Int(1), &ConstantValue::Int(0), 20), None);
        assert_eq!(try_binary(Opcode::BinaryFloorDivide, &ConstantValue::Int(1), &ConstantValue::Int(0), 20), None);
        assert_eq!(try_binary(Opcode::BinaryModulo, &ConstantValue::Int(1), &ConstantValue::Int(0), 20), None);
    }

    #[test]
    fn modulo_of_complex_aborts() {
        assert_eq!(
            try_binary(Opcode::BinaryModulo, &ConstantValue::Int(1), &ConstantValue::Complex(0.0, 1.0), 20),
            None
        );
    }

    #[test]
    fn negative_shift_aborts() {
        assert_eq!(try_binary(Opcode::BinaryLshift, &ConstantValue::Int(1), &ConstantValue::Int(-1), 20), None);
        assert_eq!(try_binary(Opcode::BinaryRshift, &ConstantValue::Int(1), &ConstantValue::Int(-1), 20), None);
    }

    #[test]
    fn zero_to_negative_power_aborts() {
        assert_eq!(try_binary(Opcode::BinaryPower, &ConstantValue::Float(0.0), &ConstantValue::Int(-1), 20), None);
        assert_eq!(try_binary(Opcode::BinaryPower, &ConstantValue::Int(0), &ConstantValue::Float(-2.0), 20), None);
        assert_eq!(
            try_binary(Opcode::BinaryPower, &ConstantValue::Float(0.0), &ConstantValue::Int(2), 20),
            Some(ConstantValue::Float(0.0))
        );
    }

    #[test]
    fn max_size_boundary() {
        let nine = ConstantValue::Tuple(vec![ConstantValue::Int(9); 1]);
        let tripled = ConstantValue::Tuple(vec![ConstantValue::Int(9); 3]);
        assert_eq!(try_binary(Opcode::BinaryMultiply, &nine, &ConstantValue::Int(3), 3), Some(tripled));
        assert_eq!(try_binary(Opcode::BinaryMultiply, &nine, &ConstantValue::Int(4), 3), None);
    }

    #[test]
    fn tuple_and_string_ops() {
        let a = ConstantValue::Tuple(vec![ConstantValue::Int(1)]);
        let b = ConstantValue::Tuple(vec![ConstantValue::Int(0); 8]);
        let expected = ConstantValue::Tuple(vec![ConstantValue::Int(1), ConstantValue::Int(0), ConstantValue::Int(0),
            ConstantValue::Int(0), ConstantValue::Int(0), ConstantValue::Int(0), ConstantValue::Int(0),
            ConstantValue::Int(0), ConstantValue::Int(0)]);
        assert_eq!(try_binary(Opcode::BinaryAdd, &a, &b, 20), Some(expected));
        assert_eq!(
            try_binary(Opcode::BinaryAdd, &ConstantValue::Str("foo".into()), &ConstantValue::Str("bar".into()), 20),
            Some(ConstantValue::Str("foobar".into()))
        );
    }

    #[test]
    fn frozenset_rejects_unhashable() {
        let unhashable = vec![ConstantValue::Code(Box::new(CodeObject::empty()))];
        assert_eq!(try_build_frozenset(unhashable), None);
        let hashable = vec![ConstantValue::Int(1), ConstantValue::Int(2), ConstantValue::Int(1)];
        assert_eq!(
            try_build_frozenset(hashable),
            Some(ConstantValue::FrozenSet(vec![ConstantValue::Int(1), ConstantValue::Int(2)]))
        );
    }
}
