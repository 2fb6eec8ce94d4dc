//! Arithmetic in the ring Z/2^64Z and additive shares over it.
//!
//! Every secret-shared value in the protocol is an element of this ring;
//! reconstruction is a wrapping add of the two party shares. The bit
//! pattern is interchangeable with two's-complement `i64`, which is what
//! the text file formats print.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, BitXor, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;

/// An element of Z/2^64Z. All arithmetic wraps.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Ring64(u64);

impl Ring64 {
    pub const ZERO: Ring64 = Ring64(0);
    pub const ONE: Ring64 = Ring64(1);

    pub fn new(value: u64) -> Self {
        Ring64(value)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }

    /// The two's-complement view used by the decimal file formats.
    pub fn to_signed(self) -> i64 {
        self.0 as i64
    }

    pub fn from_signed(value: i64) -> Self {
        Ring64(value as u64)
    }
}

impl Add for Ring64 {
    type Output = Ring64;

    fn add(self, rhs: Ring64) -> Ring64 {
        Ring64(self.0.wrapping_add(rhs.0))
    }
}

impl AddAssign for Ring64 {
    fn add_assign(&mut self, rhs: Ring64) {
        self.0 = self.0.wrapping_add(rhs.0);
    }
}

impl Sub for Ring64 {
    type Output = Ring64;

    fn sub(self, rhs: Ring64) -> Ring64 {
        Ring64(self.0.wrapping_sub(rhs.0))
    }
}

impl SubAssign for Ring64 {
    fn sub_assign(&mut self, rhs: Ring64) {
        self.0 = self.0.wrapping_sub(rhs.0);
    }
}

impl Neg for Ring64 {
    type Output = Ring64;

    fn neg(self) -> Ring64 {
        Ring64(self.0.wrapping_neg())
    }
}

impl Mul for Ring64 {
    type Output = Ring64;

    fn mul(self, rhs: Ring64) -> Ring64 {
        Ring64(self.0.wrapping_mul(rhs.0))
    }
}

impl BitXor for Ring64 {
    type Output = Ring64;

    fn bitxor(self, rhs: Ring64) -> Ring64 {
        Ring64(self.0 ^ rhs.0)
    }
}

impl Sum for Ring64 {
    fn sum<I: Iterator<Item = Ring64>>(iter: I) -> Ring64 {
        iter.fold(Ring64::ZERO, |acc, x| acc + x)
    }
}

impl From<u64> for Ring64 {
    fn from(value: u64) -> Self {
        Ring64(value)
    }
}

impl From<i64> for Ring64 {
    fn from(value: i64) -> Self {
        Ring64(value as u64)
    }
}

impl FromStr for Ring64 {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Signed first (the file formats print two's complement), but
        // accept the full unsigned range too.
        match s.parse::<i64>() {
            Ok(v) => Ok(Ring64(v as u64)),
            Err(_) => s.parse::<u64>().map(Ring64),
        }
    }
}

impl fmt::Display for Ring64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_signed())
    }
}

impl fmt::Debug for Ring64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ring64({})", self.0)
    }
}

/// Which compute party this process is. The dealer is not a role; it only
/// labels its two accepted connections in accept order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    P0,
    P1,
}

impl Role {
    pub fn index(self) -> usize {
        match self {
            Role::P0 => 0,
            Role::P1 => 1,
        }
    }

    pub fn is_p0(self) -> bool {
        matches!(self, Role::P0)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::P0 => write!(f, "P0"),
            Role::P1 => write!(f, "P1"),
        }
    }
}

/// Additive share of a public constant: party 0 holds the constant, party 1
/// holds zero.
pub fn share_constant(c: Ring64, role: Role) -> Ring64 {
    match role {
        Role::P0 => c,
        Role::P1 => Ring64::ZERO,
    }
}

/// Share of `c - x` for a public constant `c` and shared `x`. Under the
/// constant convention party 0 computes `c - <x>_0` and party 1 computes
/// `-<x>_1`. This is the only role-conditional branch in the secure ops.
pub fn const_minus(c: Ring64, x: Ring64, role: Role) -> Ring64 {
    match role {
        Role::P0 => c - x,
        Role::P1 => -x,
    }
}

/// A length-k vector over the ring; element-wise additive sharing of a
/// vector in Z^k.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RingVec(Vec<Ring64>);

impl RingVec {
    pub fn new(values: Vec<Ring64>) -> Self {
        RingVec(values)
    }

    pub fn zeros(len: usize) -> Self {
        RingVec(vec![Ring64::ZERO; len])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Ring64] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Ring64> {
        self.0.iter()
    }

    /// Integer dot product in the ring. Lengths must already have been
    /// validated at the protocol boundary.
    pub fn dot(&self, other: &RingVec) -> Ring64 {
        assert_eq!(self.len(), other.len());
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(&a, &b)| a * b)
            .sum()
    }

    pub fn add(&self, other: &RingVec) -> RingVec {
        assert_eq!(self.len(), other.len());
        RingVec(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(&a, &b)| a + b)
                .collect(),
        )
    }

    pub fn sub(&self, other: &RingVec) -> RingVec {
        assert_eq!(self.len(), other.len());
        RingVec(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(&a, &b)| a - b)
                .collect(),
        )
    }

    pub fn scale(&self, factor: Ring64) -> RingVec {
        RingVec(self.0.iter().map(|&a| a * factor).collect())
    }
}

impl std::ops::Index<usize> for RingVec {
    type Output = Ring64;

    fn index(&self, index: usize) -> &Ring64 {
        &self.0[index]
    }
}

impl From<Vec<Ring64>> for RingVec {
    fn from(values: Vec<Ring64>) -> Self {
        RingVec(values)
    }
}

impl FromIterator<Ring64> for RingVec {
    fn from_iter<I: IntoIterator<Item = Ring64>>(iter: I) -> Self {
        RingVec(iter.into_iter().collect())
    }
}

impl IntoIterator for RingVec {
    type Item = Ring64;
    type IntoIter = std::vec::IntoIter<Ring64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
