//! Integer helpers with the rounding and sign rules scripts rely on
//!
//! `BigInt` division and remainder already truncate toward zero; the
//! helpers here add the zero checks and the modular operations.

use core_types::{VmError, VmResult};
use num_bigint::{BigInt, Sign};
use num_integer::Integer as _;
use num_traits::{One, Signed, ToPrimitive, Zero};

/// Narrow to `i32`, the width of every count and index operand.
pub fn to_i32(value: &BigInt) -> VmResult<i32> {
    value
        .to_i32()
        .ok_or_else(|| VmError::IntegerOverflow(value.to_string()))
}

/// Truncating division.
pub fn div(x: &BigInt, y: &BigInt) -> VmResult<BigInt> {
    if y.is_zero() {
        return Err(VmError::DivisionByZero);
    }
    Ok(x / y)
}

/// Remainder with the sign of the dividend.
pub fn rem(x: &BigInt, y: &BigInt) -> VmResult<BigInt> {
    if y.is_zero() {
        return Err(VmError::DivisionByZero);
    }
    Ok(x % y)
}

/// Integer square root.
pub fn sqrt(value: &BigInt) -> VmResult<BigInt> {
    if value.is_negative() {
        return Err(VmError::Arithmetic("value can not be negative".into()));
    }
    Ok(value.sqrt())
}

/// `x * y % modulus`, remainder signed like the product.
pub fn mod_mul(x: &BigInt, y: &BigInt, modulus: &BigInt) -> VmResult<BigInt> {
    rem(&(x * y), modulus)
}

/// `value ^ exponent % modulus`, remainder signed like `value ^ exponent`.
///
/// An exponent of -1 asks for the modular inverse instead.
pub fn mod_pow(value: &BigInt, exponent: &BigInt, modulus: &BigInt) -> VmResult<BigInt> {
    if *exponent == -BigInt::one() {
        return mod_inverse(value, modulus);
    }
    if exponent.is_negative() {
        return Err(VmError::Arithmetic(format!("negative exponent {exponent}")));
    }
    if modulus.is_zero() {
        return Err(VmError::DivisionByZero);
    }
    let magnitude = value
        .magnitude()
        .modpow(exponent.magnitude(), modulus.magnitude());
    let negative = value.is_negative() && exponent.is_odd();
    let sign = if negative { Sign::Minus } else { Sign::Plus };
    Ok(BigInt::from_biguint(sign, magnitude))
}

/// Modular inverse of a positive `value` for `modulus >= 2`.
pub fn mod_inverse(value: &BigInt, modulus: &BigInt) -> VmResult<BigInt> {
    if !value.is_positive() {
        return Err(VmError::Arithmetic(format!("no modular inverse for {value}")));
    }
    if *modulus < BigInt::from(2) {
        return Err(VmError::Arithmetic(format!("invalid modulus {modulus}")));
    }
    let (mut r, mut old_r) = (value.clone(), modulus.clone());
    let (mut s, mut old_s) = (BigInt::one(), BigInt::zero());
    while r.is_positive() {
        let q = &old_r / &r;
        let next_r = &old_r % &r;
        old_r = std::mem::replace(&mut r, next_r);
        let next_s = &old_s - &q * &s;
        old_s = std::mem::replace(&mut s, next_s);
    }
    let mut result = old_s % modulus;
    if result.is_negative() {
        result += modulus;
    }
    if !(value * &result % modulus).is_one() {
        return Err(VmError::Arithmetic(format!(
            "{value} has no inverse modulo {modulus}"
        )));
    }
    Ok(result)
}
