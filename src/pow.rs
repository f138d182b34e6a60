//! Proof of Work: compact targets, difficulty, and the retarget algorithm

use crate::block::{extract_target, BlockHeader};
use crate::config::ChainParams;
use crate::error::{Result, SpvError};
use crate::hash::hash256;
use crate::types::{Hash256, RawHeader};
use primitive_types::{U256, U512};
use std::fmt;
use tracing::debug;

/// 256-bit proof-of-work target. A header hash, read as a little-endian
/// integer, must not exceed it.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target(U256);

impl Target {
    pub fn from_u256(value: U256) -> Self {
        Target(value)
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Difficulty-1 target, 0xffff << 208 (compact 0x1d00ffff)
    pub fn max_target() -> Self {
        Target(U256::from(0xffffu64) << 208)
    }

    /// ExpandTarget: decompress a compact "bits" value.
    ///
    /// The low three bytes are the mantissa, the high byte the length in
    /// bytes of the full value. Bit 23 is a sign bit.
    pub fn from_compact(bits: u32) -> Result<Target> {
        let exponent = bits >> 24;
        let mantissa = bits & 0x007f_ffff;

        if mantissa != 0 && bits & 0x0080_0000 != 0 {
            return Err(SpvError::NegativeTarget);
        }
        let overflow = mantissa != 0
            && (exponent > 34 || (mantissa > 0xff && exponent > 33) || (mantissa > 0xffff && exponent > 32));
        if overflow {
            return Err(SpvError::TargetOverflow);
        }

        let value = if exponent <= 3 {
            U256::from(mantissa >> (8 * (3 - exponent)))
        } else {
            U256::from(mantissa) << (8 * (exponent - 3) as usize)
        };
        Ok(Target(value))
    }

    /// Compress to the compact form. Lossy: only the top three significant
    /// bytes survive.
    pub fn to_compact(&self) -> u32 {
        let mut size = (self.0.bits() as u32 + 7) / 8;
        let mut compact = if size <= 3 {
            self.0.low_u32() << (8 * (3 - size))
        } else {
            (self.0 >> (8 * (size - 3) as usize)).low_u32()
        };
        // keep the sign bit clear
        if compact & 0x0080_0000 != 0 {
            compact >>= 8;
            size += 1;
        }
        compact | (size << 24)
    }

    /// Whether a header hash satisfies this target
    pub fn is_met_by(&self, hash: &Hash256) -> bool {
        U256::from_little_endian(hash.as_bytes()) <= self.0
    }

    /// Difficulty = max_target / target, truncated
    pub fn difficulty(&self) -> Result<U256> {
        if self.0.is_zero() {
            return Err(SpvError::ZeroTarget);
        }
        Ok(Target::max_target().0 / self.0)
    }

    pub fn difficulty_f64(&self) -> Result<f64> {
        if self.0.is_zero() {
            return Err(SpvError::ZeroTarget);
        }
        Ok(u256_to_f64(&Target::max_target().0) / u256_to_f64(&self.0))
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target({:#066x})", self.0)
    }
}

fn u256_to_f64(value: &U256) -> f64 {
    value.0.iter().rev().fold(0.0, |acc, &limb| acc * 18_446_744_073_709_551_616.0 + limb as f64)
}

/// prev × clamp(second − first, T/4, 4T) / T, before the pow-limit clamp
fn retarget_unclamped(previous: &Target, first_timestamp: u32, second_timestamp: u32, params: &ChainParams) -> U512 {
    let timespan = params.target_timespan() as i64;
    let actual = second_timestamp as i64 - first_timestamp as i64;
    let clamped = actual.clamp(timespan / 4, timespan * 4);
    if clamped != actual {
        debug!(actual, clamped, "retarget timespan clamped");
    }
    previous.0.full_mul(U256::from(clamped as u64)) / U512::from(timespan as u64)
}

/// Retarget: the target for the next difficulty period.
///
/// 1. actual = second_timestamp − first_timestamp
/// 2. clamp actual to [T/4, 4T], T = retarget_interval × target_spacing
/// 3. new = previous × actual / T
/// 4. clamp new to the pow limit
///
/// With `no_retargeting` set the previous target is returned unchanged.
pub fn retarget(previous: &Target, first_timestamp: u32, second_timestamp: u32, params: &ChainParams) -> Result<Target> {
    match retarget_checked(previous, first_timestamp, second_timestamp, params) {
        Err(SpvError::TargetOverflow) => params.pow_limit(),
        other => other,
    }
}

/// [`retarget`], but fails with `TargetOverflow` where the result would
/// have been clamped to the pow limit
pub fn retarget_checked(
    previous: &Target,
    first_timestamp: u32,
    second_timestamp: u32,
    params: &ChainParams,
) -> Result<Target> {
    params.validate()?;
    if params.no_retargeting {
        return Ok(*previous);
    }
    let limit = params.pow_limit()?;
    let raw = retarget_unclamped(previous, first_timestamp, second_timestamp, params);
    match U256::try_from(raw) {
        Ok(value) if value <= limit.0 => Ok(Target(value)),
        _ => {
            debug!(limit = %format!("{:#x}", limit.0), "retarget exceeds pow limit");
            Err(SpvError::TargetOverflow)
        }
    }
}

/// GetNextWorkRequired across one period: compact bits for the block after
/// `last`, given the first header of the period.
pub fn next_work_required(first: &BlockHeader, last: &BlockHeader, params: &ChainParams) -> Result<u32> {
    let previous = Target::from_compact(last.bits())?;
    Ok(retarget(&previous, first.time(), last.time(), params)?.to_compact())
}

/// CheckProofOfWork: hash256(header) ≤ target(header.bits)
pub fn header_meets_target(header: &RawHeader) -> Result<bool> {
    let target = extract_target(header)?;
    Ok(target.is_met_by(&hash256(header)))
}

/// Difficulty of `bits` relative to the difficulty-1 target
pub fn difficulty_from_bits(bits: u32) -> Result<U256> {
    Target::from_compact(bits)?.difficulty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;

    fn mainnet() -> ChainParams {
        ChainParams::for_network(Network::Mainnet)
    }

    #[test]
    fn test_from_compact_genesis() {
        let target = Target::from_compact(0x1d00ffff).unwrap();
        assert_eq!(target, Target::max_target());
        assert_eq!(target.to_compact(), 0x1d00ffff);
    }

    #[test]
    fn test_from_compact_small_exponents() {
        assert_eq!(Target::from_compact(0x03123456).unwrap().as_u256(), U256::from(0x123456u64));
        assert_eq!(Target::from_compact(0x02123456).unwrap().as_u256(), U256::from(0x1234u64));
        assert_eq!(Target::from_compact(0x01123456).unwrap().as_u256(), U256::from(0x12u64));
        assert_eq!(Target::from_compact(0x04123456).unwrap().as_u256(), U256::from(0x12345600u64));
    }

    #[test]
    fn test_from_compact_zero_mantissa() {
        assert!(Target::from_compact(0x20000000).unwrap().is_zero());
        // sign bit on a zero mantissa is not negative
        assert!(Target::from_compact(0x01800000).unwrap().is_zero());
    }

    #[test]
    fn test_from_compact_negative() {
        assert_eq!(Target::from_compact(0x04923456), Err(SpvError::NegativeTarget));
    }

    #[test]
    fn test_from_compact_overflow() {
        assert_eq!(Target::from_compact(0x23000001), Err(SpvError::TargetOverflow));
        assert_eq!(Target::from_compact(0x22000100), Err(SpvError::TargetOverflow));
        assert_eq!(Target::from_compact(0x21010000), Err(SpvError::TargetOverflow));
        assert!(Target::from_compact(0x2100ffff).is_ok());
    }

    #[test]
    fn test_to_compact_avoids_sign_bit() {
        let target = Target::from_u256(U256::from(0x80u64));
        assert_eq!(target.to_compact(), 0x02008000);
        assert_eq!(Target::from_compact(0x02008000).unwrap(), target);
    }

    #[test]
    fn test_difficulty() {
        assert_eq!(Target::max_target().difficulty().unwrap(), U256::one());
        assert_eq!(difficulty_from_bits(0x17371ef4).unwrap(), U256::from(5_106_422_924_659u64));
        assert_eq!(Target::default().difficulty(), Err(SpvError::ZeroTarget));
        let f = Target::from_compact(0x17371ef4).unwrap().difficulty_f64().unwrap();
        assert!((f - 5_106_422_924_659.0).abs() / f < 1e-6);
    }

    #[test]
    fn test_mainnet_retargets() {
        let cases = [
            (0x17371ef4u32, 1545175965u32, 1546275302u32, 0x173218a5u32),
            (0x173218a5, 1546276809, 1547431851, 0x172fd633),
            (0x172fd633, 1547432394, 1548656416, 0x17306835),
            (0x17306835, 1548657313, 1549817652, 0x172e6f88),
            (0x172e6f88, 1549817981, 1551025524, 0x172e5b50),
        ];
        for (bits, first, second, expected) in cases {
            let previous = Target::from_compact(bits).unwrap();
            let next = retarget(&previous, first, second, &mainnet()).unwrap();
            assert_eq!(next.to_compact(), expected, "bits {:#x}", bits);
        }
    }

    #[test]
    fn test_retarget_clamps_to_four_times() {
        let previous = Target::from_compact(0x17371ef4).unwrap();
        let span = mainnet().target_timespan() as u32;

        let slow = retarget(&previous, 0, span * 10, &mainnet()).unwrap();
        assert_eq!(slow.as_u256(), previous.as_u256() * U256::from(4u64));

        let fast = retarget(&previous, 0, span / 10, &mainnet()).unwrap();
        assert_eq!(fast.as_u256(), previous.as_u256() / U256::from(4u64));
    }

    #[test]
    fn test_retarget_negative_timespan_uses_lower_bound() {
        let previous = Target::from_compact(0x17371ef4).unwrap();
        let next = retarget(&previous, 2_000_000, 1_000_000, &mainnet()).unwrap();
        assert_eq!(next.as_u256(), previous.as_u256() / U256::from(4u64));
    }

    #[test]
    fn test_retarget_clamps_to_pow_limit() {
        let previous = Target::from_compact(0x1d00ffff).unwrap();
        let span = mainnet().target_timespan() as u32;
        let next = retarget(&previous, 0, span * 4, &mainnet()).unwrap();
        assert_eq!(next, Target::max_target());
        assert_eq!(
            retarget_checked(&previous, 0, span * 4, &mainnet()),
            Err(SpvError::TargetOverflow)
        );
    }

    #[test]
    fn test_regtest_keeps_target() {
        let params = ChainParams::for_network(Network::Regtest);
        let previous = Target::from_compact(0x207fffff).unwrap();
        assert_eq!(retarget(&previous, 0, 1, &params).unwrap(), previous);
    }

    #[test]
    fn test_retarget_rejects_zero_spacing() {
        let params = ChainParams { target_spacing: 0, ..mainnet() };
        let previous = Target::from_compact(0x17371ef4).unwrap();
        assert!(matches!(retarget(&previous, 0, 100, &params), Err(SpvError::InvalidConfig(_))));
        assert!(matches!(retarget_checked(&previous, 0, 100, &params), Err(SpvError::InvalidConfig(_))));

        let params = ChainParams { retarget_interval: 0, ..mainnet() };
        assert!(matches!(retarget(&previous, 0, 100, &params), Err(SpvError::InvalidConfig(_))));
    }

    #[test]
    fn test_next_work_required() {
        let first = BlockHeader::new(0x2000_0000, Hash256::ZERO, Hash256::ZERO, 1545175965, 0x17371ef4, 0);
        let last = BlockHeader::new(0x2000_0000, Hash256::ZERO, Hash256::ZERO, 1546275302, 0x17371ef4, 0);
        assert_eq!(next_work_required(&first, &last, &mainnet()).unwrap(), 0x173218a5);
    }

    #[test]
    fn test_header_meets_target() {
        let header: RawHeader = hex::decode("0100000055bd840a78798ad0da853f68974f3d183e2bd1db6a842c1feecf222a00000000ff104ccb05421ab93e63f8c3ce5c2c2e9dbb37de2764b3a3175c8166562cac7d51b96a49ffff001d283e9e70")
            .unwrap()
            .try_into()
            .unwrap();
        assert!(header_meets_target(&header).unwrap());

        let mut tampered = header;
        tampered[76] ^= 1;
        assert!(!header_meets_target(&tampered).unwrap());
    }
}
