//! Exactness of primitive conversions, as used by primitive type patterns.
//!
//! A conversion is exact when the value survives it without loss of
//! information. Boundary values are spelled out as literals.

use df_core::ast::PrimitiveTy;
use df_core::types::Constant;

/// -2^63 as a double; the smallest double that converts to `long` exactly.
const LONG_MIN_AS_DOUBLE: f64 = -9.223372036854775808E18;
/// 2^63; the first double above every `long`.
const TWO_POW_63: f64 = 9.223372036854775808E18;
const INT_MIN_AS_DOUBLE: f64 = -2147483648.0;
const INT_MAX_AS_DOUBLE: f64 = 2147483647.0;

/// Whether every value of `from` converts to `to` exactly, so a pattern of type
/// `to` matches any `from` value without a runtime test.
pub fn is_unconditionally_exact(from: PrimitiveTy, to: PrimitiveTy) -> bool {
    use PrimitiveTy::*;
    if from == to {
        return true;
    }
    match from {
        Byte => matches!(to, Short | Int | Long | Float | Double),
        Short => matches!(to, Int | Long | Float | Double),
        Char => matches!(to, Int | Long | Float | Double),
        Int => matches!(to, Long | Double),
        Float => to == Double,
        Long | Double | Boolean => false,
    }
}

/// Whether the constant `value` converts to `to` without loss.
pub fn is_exact(value: &Constant, to: PrimitiveTy) -> bool {
    let Some(from) = value.primitive_ty() else {
        return false;
    };
    if from == PrimitiveTy::Boolean || to == PrimitiveTy::Boolean {
        return from == to;
    }
    if is_unconditionally_exact(from, to) {
        return true;
    }
    if from.is_floating() {
        let Some(v) = value.as_double() else {
            return false;
        };
        return floating_is_exact(v, from, to);
    }
    let Some(v) = value.as_long() else {
        return false;
    };
    integral_is_exact(v, to)
}

fn integral_is_exact(v: i64, to: PrimitiveTy) -> bool {
    match to {
        // i64::MAX rounds up to 2^63 and the cast back saturates to i64::MAX, so
        // the round trip alone would accept it
        PrimitiveTy::Float => v != i64::MAX && (v as f32) as i64 == v,
        PrimitiveTy::Double => v != i64::MAX && (v as f64) as i64 == v,
        _ => match to.integral_bounds() {
            Some((lo, hi)) => lo <= v && v <= hi,
            None => false,
        },
    }
}

fn floating_is_exact(v: f64, from: PrimitiveTy, to: PrimitiveTy) -> bool {
    if to == PrimitiveTy::Float {
        // double to float keeps NaN, infinities and signed zeros.
        return v.is_nan() || v.is_infinite() || (v as f32) as f64 == v;
    }
    if v.is_nan() || v.is_infinite() {
        return false;
    }
    if v == 0.0 && v.is_sign_negative() {
        return false;
    }
    if v.trunc() != v {
        return false;
    }
    match to {
        PrimitiveTy::Long => LONG_MIN_AS_DOUBLE <= v && v < TWO_POW_63,
        PrimitiveTy::Int => INT_MIN_AS_DOUBLE <= v && v <= INT_MAX_AS_DOUBLE,
        PrimitiveTy::Short | PrimitiveTy::Byte | PrimitiveTy::Char => match to.integral_bounds() {
            Some((lo, hi)) => lo as f64 <= v && v <= hi as f64,
            None => false,
        },
        PrimitiveTy::Double => from == PrimitiveTy::Float,
        PrimitiveTy::Float | PrimitiveTy::Boolean => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PrimitiveTy::*;

    #[test]
    fn nan_and_negative_zero_are_not_exact_integers() {
        assert!(!is_exact(&Constant::double(f64::NAN), Int));
        assert!(!is_exact(&Constant::double(-0.0), Long));
        assert!(is_exact(&Constant::double(0.0), Long));
        assert!(!is_exact(&Constant::float(-0.0), Int));
    }

    #[test]
    fn double_to_long_boundaries() {
        assert!(is_exact(&Constant::double(LONG_MIN_AS_DOUBLE), Long));
        assert!(!is_exact(&Constant::double(TWO_POW_63), Long));
        assert!(!is_exact(&Constant::double(1.5), Long));
        assert!(is_exact(&Constant::double(INT_MAX_AS_DOUBLE), Int));
        assert!(!is_exact(&Constant::double(INT_MAX_AS_DOUBLE + 1.0), Int));
    }

    #[test]
    fn long_to_floating_round_trip() {
        assert!(!is_exact(&Constant::Long(i64::MAX), Double));
        assert!(!is_exact(&Constant::Long(i64::MAX), Float));
        assert!(is_exact(&Constant::Long(i64::MIN), Double));
        assert!(!is_exact(&Constant::Long((1 << 53) + 1), Double));
        assert!(is_exact(&Constant::Long(1 << 53), Double));
        assert!(!is_exact(&Constant::Int(i32::MAX), Float));
        assert!(is_exact(&Constant::Int(1 << 24), Float));
        assert!(!is_exact(&Constant::Int((1 << 24) + 1), Float));
    }

    #[test]
    fn narrowing_integral_checks_range() {
        assert!(is_exact(&Constant::Int(127), Byte));
        assert!(!is_exact(&Constant::Int(128), Byte));
        assert!(!is_exact(&Constant::Int(-1), Char));
        assert!(is_exact(&Constant::Char(65), Byte));
    }

    #[test]
    fn double_to_float_keeps_special_values() {
        assert!(is_exact(&Constant::double(f64::NAN), Float));
        assert!(is_exact(&Constant::double(-0.0), Float));
        assert!(is_exact(&Constant::double(f64::INFINITY), Float));
        assert!(!is_exact(&Constant::double(0.1), Float));
    }

    #[test]
    fn widening_is_unconditional() {
        assert!(is_unconditionally_exact(Int, Long));
        assert!(is_unconditionally_exact(Int, Double));
        assert!(!is_unconditionally_exact(Int, Float));
        assert!(!is_unconditionally_exact(Long, Double));
        assert!(!is_unconditionally_exact(Char, Short));
    }
}
