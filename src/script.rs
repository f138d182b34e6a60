//! Script model: raw bytes, parsed opcode view, and standard-template classification
//!
//! Classification reads the raw bytes with exact length and byte matches, the
//! same way consensus code recognizes templates; it never needs a parse.
//! The parsed view ([`Script::ops`]) keeps each push's original opcode so
//! that [`Script::from_ops`] reproduces the source bytes verbatim, including
//! non-minimal push encodings.

use crate::constants::{MAX_MULTISIG_KEYS, MAX_SCRIPT_ELEMENT_SIZE};
use crate::cursor::{Reader, Writer};
use crate::encode::{Decodable, Encodable};
use crate::error::{Result, SpvError};
use crate::opcodes::*;
use crate::types::{Hash160, ScriptHash};
use crate::varint;
use std::fmt;

/// One script instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Data push. `opcode` is OP_0, a direct length (0x01..=0x4b), or OP_PUSHDATA1/2/4.
    Push { opcode: u8, data: Vec<u8> },
    /// Any other opcode
    Code(u8),
}

impl Op {
    /// Push `data` with the smallest push-data opcode
    pub fn push(data: &[u8]) -> Op {
        let opcode = match data.len() {
            0 => OP_0,
            len @ 1..=0x4b => len as u8,
            0x4c..=0xff => OP_PUSHDATA1,
            0x100..=0xffff => OP_PUSHDATA2,
            _ => OP_PUSHDATA4,
        };
        Op::Push {
            opcode,
            data: data.to_vec(),
        }
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Op::Push { opcode, .. } => *opcode,
            Op::Code(op) => *op,
        }
    }

    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Op::Push { data, .. } => Some(data),
            Op::Code(_) => None,
        }
    }

    pub fn is_push(&self) -> bool {
        matches!(self, Op::Push { .. })
    }

    fn encoded_size(&self) -> usize {
        match self {
            Op::Code(_) => 1,
            Op::Push { opcode, data } => {
                let prefix = match *opcode {
                    OP_PUSHDATA1 => 2,
                    OP_PUSHDATA2 => 3,
                    OP_PUSHDATA4 => 5,
                    _ => 1,
                };
                prefix + data.len()
            }
        }
    }

    /// Check that the opcode can carry the payload length
    fn check_encoding(&self) -> Result<()> {
        let (opcode, len) = match self {
            Op::Code(op) if *op <= OP_PUSHDATA4 => {
                return Err(SpvError::InvalidLength { expected: *op as usize, got: 0 });
            }
            Op::Code(_) => return Ok(()),
            Op::Push { opcode, data } => (*opcode, data.len()),
        };
        let fits = match opcode {
            OP_0 => len == 0,
            1..=OP_PUSHBYTES_75 => len == opcode as usize,
            OP_PUSHDATA1 => len <= 0xff,
            OP_PUSHDATA2 => len <= 0xffff,
            OP_PUSHDATA4 => u32::try_from(len).is_ok(),
            _ => false,
        };
        if fits {
            Ok(())
        } else {
            Err(SpvError::InvalidLength {
                expected: opcode as usize,
                got: len,
            })
        }
    }

    fn write(&self, writer: &mut Writer) -> Result<()> {
        match self {
            Op::Code(op) => {
                writer.write_u8(*op)?;
            }
            Op::Push { opcode, data } => {
                writer.write_u8(*opcode)?;
                match *opcode {
                    OP_PUSHDATA1 => {
                        writer.write_u8(data.len() as u8)?;
                    }
                    OP_PUSHDATA2 => {
                        writer.write_u16_le(data.len() as u16)?;
                    }
                    OP_PUSHDATA4 => {
                        writer.write_u32_le(data.len() as u32)?;
                    }
                    _ => {}
                }
                writer.write_bytes(data)?;
            }
        }
        Ok(())
    }

    /// Whether a smaller encoding exists for this push
    fn is_minimal(&self) -> bool {
        let (opcode, data) = match self {
            Op::Code(_) => return true,
            Op::Push { opcode, data } => (*opcode, data),
        };
        match data.len() {
            0 => opcode == OP_0,
            1 if (1..=16).contains(&data[0]) || data[0] == 0x81 => false,
            len @ 1..=0x4b => opcode as usize == len,
            0x4c..=0xff => opcode == OP_PUSHDATA1,
            0x100..=0xffff => opcode == OP_PUSHDATA2,
            _ => true,
        }
    }
}

/// Standard output templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    PubKeyHash,
    ScriptHash,
    WitnessPubKeyHash,
    WitnessScriptHash,
    Multisig { required: u8, total: u8 },
    NullData,
    NonStandard,
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptType::PubKeyHash => f.write_str("pubkeyhash"),
            ScriptType::ScriptHash => f.write_str("scripthash"),
            ScriptType::WitnessPubKeyHash => f.write_str("witness_v0_keyhash"),
            ScriptType::WitnessScriptHash => f.write_str("witness_v0_scripthash"),
            ScriptType::Multisig { required, total } => write!(f, "multisig({}-of-{})", required, total),
            ScriptType::NullData => f.write_str("nulldata"),
            ScriptType::NonStandard => f.write_str("nonstandard"),
        }
    }
}

/// OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
pub fn is_p2pkh(raw: &[u8]) -> bool {
    raw.len() == 25
        && raw[0] == OP_DUP
        && raw[1] == OP_HASH160
        && raw[2] == 0x14
        && raw[23] == OP_EQUALVERIFY
        && raw[24] == OP_CHECKSIG
}

/// OP_HASH160 <20> OP_EQUAL
pub fn is_p2sh(raw: &[u8]) -> bool {
    raw.len() == 23 && raw[0] == OP_HASH160 && raw[1] == 0x14 && raw[22] == OP_EQUAL
}

/// OP_0 <20>
pub fn is_p2wpkh(raw: &[u8]) -> bool {
    raw.len() == 22 && raw[0] == OP_0 && raw[1] == 0x14
}

/// OP_0 <32>
pub fn is_p2wsh(raw: &[u8]) -> bool {
    raw.len() == 34 && raw[0] == OP_0 && raw[1] == 0x20
}

/// OP_m <pubkey>... OP_n OP_CHECKMULTISIG, returning `(m, n)`
pub fn multisig_params(raw: &[u8]) -> Option<(u8, u8)> {
    if raw.len() < 3 || raw[raw.len() - 1] != OP_CHECKMULTISIG {
        return None;
    }
    let m = small_int_value(raw[0])?;
    let n = small_int_value(raw[raw.len() - 2])?;
    if m > n || n > MAX_MULTISIG_KEYS {
        return None;
    }

    let keys_end = raw.len() - 2;
    let mut pos = 1;
    let mut keys = 0u8;
    while pos < keys_end {
        let len = raw[pos] as usize;
        if len != 33 && len != 65 {
            return None;
        }
        pos += 1 + len;
        keys += 1;
    }
    (pos == keys_end && keys == n).then_some((m, n))
}

/// OP_RETURN followed only by push-type opcodes (data pushes and small ints)
pub fn is_nulldata(raw: &[u8]) -> bool {
    nulldata_pushes(raw).is_some()
}

fn nulldata_pushes(raw: &[u8]) -> Option<Vec<Op>> {
    if raw.first() != Some(&OP_RETURN) {
        return None;
    }
    let ops = Instructions::new(&raw[1..]).collect::<Result<Vec<_>>>().ok()?;
    ops.iter().all(|op| op.opcode() <= OP_16).then_some(ops)
}

pub fn classify(raw: &[u8]) -> ScriptType {
    if is_p2pkh(raw) {
        ScriptType::PubKeyHash
    } else if is_p2sh(raw) {
        ScriptType::ScriptHash
    } else if is_p2wpkh(raw) {
        ScriptType::WitnessPubKeyHash
    } else if is_p2wsh(raw) {
        ScriptType::WitnessScriptHash
    } else if let Some((required, total)) = multisig_params(raw) {
        ScriptType::Multisig { required, total }
    } else if is_nulldata(raw) {
        ScriptType::NullData
    } else {
        ScriptType::NonStandard
    }
}

/// The 20- or 32-byte digest committed to by a hash-locked output
pub fn get_hash(raw: &[u8]) -> Result<ScriptHash> {
    if is_p2pkh(raw) {
        Ok(ScriptHash::Hash160(Hash160::from_slice(&raw[3..23])?))
    } else if is_p2sh(raw) || is_p2wpkh(raw) {
        Ok(ScriptHash::Hash160(Hash160::from_slice(&raw[2..22])?))
    } else if is_p2wsh(raw) {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&raw[2..34]);
        Ok(ScriptHash::Hash256(hash))
    } else {
        Err(SpvError::NotAHashScript)
    }
}

/// Concatenated payload of the pushes following OP_RETURN
pub fn get_op_return_data(raw: &[u8]) -> Result<Vec<u8>> {
    let ops = nulldata_pushes(raw).ok_or(SpvError::NotNulldata)?;
    Ok(ops.iter().filter_map(Op::data).flatten().copied().collect())
}

/// Iterator over the instructions of a raw script.
///
/// Yields an error (and then stops) at the first truncated push.
#[derive(Debug)]
pub struct Instructions<'a> {
    reader: Reader<'a>,
    done: bool,
}

impl<'a> Instructions<'a> {
    pub fn new(raw: &'a [u8]) -> Self {
        Instructions {
            reader: Reader::new(raw),
            done: false,
        }
    }

    pub fn offset(&self) -> usize {
        self.reader.offset()
    }

    fn read_op(&mut self) -> Result<Op> {
        let opcode = self.reader.read_u8()?;
        let len = match opcode {
            OP_0 => 0,
            1..=OP_PUSHBYTES_75 => opcode as usize,
            OP_PUSHDATA1 => self.reader.read_u8()? as usize,
            OP_PUSHDATA2 => self.reader.read_u16_le()? as usize,
            OP_PUSHDATA4 => self.reader.read_u32_le()? as usize,
            _ => return Ok(Op::Code(opcode)),
        };
        let data = self.reader.read_bytes(len)?.to_vec();
        Ok(Op::Push { opcode, data })
    }
}

impl Iterator for Instructions<'_> {
    type Item = Result<Op>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.reader.is_at_end() {
            return None;
        }
        let op = self.read_op();
        self.done = op.is_err();
        Some(op)
    }
}

/// A script held as raw bytes
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Script(Vec<u8>);

impl Script {
    pub fn new(raw: Vec<u8>) -> Self {
        Script(raw)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn instructions(&self) -> Instructions<'_> {
        Instructions::new(&self.0)
    }

    /// Parse the opcode sequence, accepting any push encoding
    pub fn ops(&self) -> Result<Vec<Op>> {
        self.instructions().collect()
    }

    /// Parse the opcode sequence, rejecting non-minimal and oversized pushes
    pub fn parse_minimal(&self) -> Result<Vec<Op>> {
        let mut instructions = self.instructions();
        let mut ops = Vec::new();
        loop {
            let offset = instructions.offset();
            let op = match instructions.next() {
                Some(op) => op?,
                None => break,
            };
            if let Some(data) = op.data() {
                if data.len() > MAX_SCRIPT_ELEMENT_SIZE {
                    return Err(SpvError::PushTooLarge { size: data.len() });
                }
            }
            if !op.is_minimal() {
                return Err(SpvError::NonMinimalPush { offset });
            }
            ops.push(op);
        }
        Ok(ops)
    }

    /// Compile an opcode sequence back into raw bytes
    pub fn from_ops(ops: &[Op]) -> Result<Script> {
        let size = ops.iter().map(Op::encoded_size).sum();
        let mut writer = Writer::with_size(size);
        for op in ops {
            op.check_encoding()?;
            op.write(&mut writer)?;
        }
        Ok(Script(writer.finish()?))
    }

    pub fn classify(&self) -> ScriptType {
        classify(&self.0)
    }

    pub fn is_p2pkh(&self) -> bool {
        is_p2pkh(&self.0)
    }

    pub fn is_p2sh(&self) -> bool {
        is_p2sh(&self.0)
    }

    pub fn is_p2wpkh(&self) -> bool {
        is_p2wpkh(&self.0)
    }

    pub fn is_p2wsh(&self) -> bool {
        is_p2wsh(&self.0)
    }

    pub fn is_nulldata(&self) -> bool {
        is_nulldata(&self.0)
    }

    pub fn get_hash(&self) -> Result<ScriptHash> {
        get_hash(&self.0)
    }

    pub fn op_return_data(&self) -> Result<Vec<u8>> {
        get_op_return_data(&self.0)
    }

    /// True when every instruction parses and is a data push
    pub fn is_push_only(&self) -> bool {
        self.instructions().all(|op| op.as_ref().map_or(false, Op::is_push))
    }

    /// Last push of a push-only scriptSig, which for a P2SH spend is the
    /// redeem script
    pub fn redeem_script(&self) -> Option<Script> {
        if !self.is_push_only() {
            return None;
        }
        let last = self.instructions().last()?.ok()?;
        last.data().map(|d| Script(d.to_vec()))
    }
}

impl From<Vec<u8>> for Script {
    fn from(raw: Vec<u8>) -> Self {
        Script(raw)
    }
}

impl AsRef<[u8]> for Script {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Encodable for Script {
    fn encoded_size(&self) -> usize {
        varint::size(self.0.len() as u64) + self.0.len()
    }

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_var_bytes(&self.0)?;
        Ok(())
    }
}

impl Decodable for Script {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Script(reader.read_var_bytes()?))
    }
}

/// ASM rendering; a truncated tail is shown as `[error]`
impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for op in self.instructions() {
            if !first {
                f.write_str(" ")?;
            }
            first = false;
            match op {
                Ok(Op::Push { opcode: OP_0, .. }) => f.write_str("OP_0")?,
                Ok(Op::Push { data, .. }) => f.write_str(&hex::encode(data))?,
                Ok(Op::Code(code)) => match opcode_name(code) {
                    Some(name) => f.write_str(name)?,
                    None => write!(f, "OP_UNKNOWN({:#04x})", code)?,
                },
                Err(_) => f.write_str("[error]")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({})", hex::encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p2pkh() -> Vec<u8> {
        let mut raw = vec![0x76, 0xa9, 0x14];
        raw.extend_from_slice(&[0x11; 20]);
        raw.extend_from_slice(&[0x88, 0xac]);
        raw
    }

    #[test]
    fn test_p2pkh_classification_and_hash() {
        let script = Script::new(p2pkh());
        assert_eq!(script.len(), 25);
        assert_eq!(script.classify(), ScriptType::PubKeyHash);
        assert_eq!(script.get_hash().unwrap().as_bytes(), &[0x11; 20]);
    }

    #[test]
    fn test_p2sh_and_witness_hashes() {
        let mut p2sh = vec![0xa9, 0x14];
        p2sh.extend_from_slice(&[0x22; 20]);
        p2sh.push(0x87);
        assert_eq!(classify(&p2sh), ScriptType::ScriptHash);
        assert_eq!(get_hash(&p2sh).unwrap().as_bytes(), &[0x22; 20]);

        let mut wpkh = vec![0x00, 0x14];
        wpkh.extend_from_slice(&[0x33; 20]);
        assert_eq!(classify(&wpkh), ScriptType::WitnessPubKeyHash);

        let mut wsh = vec![0x00, 0x20];
        wsh.extend_from_slice(&[0x44; 32]);
        assert_eq!(classify(&wsh), ScriptType::WitnessScriptHash);
        assert!(matches!(get_hash(&wsh).unwrap(), ScriptHash::Hash256(h) if h == [0x44; 32]));
    }

    #[test]
    fn test_near_miss_is_nonstandard() {
        let mut raw = p2pkh();
        raw[24] = 0xad;
        assert_eq!(classify(&raw), ScriptType::NonStandard);
        assert_eq!(get_hash(&raw), Err(SpvError::NotAHashScript));

        let mut wpkh = vec![0x00, 0x14];
        wpkh.extend_from_slice(&[0x33; 21]);
        assert_eq!(classify(&wpkh), ScriptType::NonStandard);
    }

    #[test]
    fn test_multisig() {
        let mut raw = vec![OP_1 + 1];
        for _ in 0..3 {
            raw.push(33);
            raw.extend_from_slice(&[0x02; 33]);
        }
        raw.extend_from_slice(&[OP_1 + 2, OP_CHECKMULTISIG]);
        assert_eq!(classify(&raw), ScriptType::Multisig { required: 2, total: 3 });

        // m > n
        let mut bad = raw.clone();
        bad[0] = OP_1 + 3;
        assert_eq!(classify(&bad), ScriptType::NonStandard);

        // declared n disagrees with key count
        let mut bad = raw.clone();
        let n = bad.len() - 2;
        bad[n] = OP_1 + 1;
        assert_eq!(classify(&bad), ScriptType::NonStandard);
    }

    #[test]
    fn test_op_return_payload() {
        let mut raw = vec![OP_RETURN, 0x14];
        raw.extend_from_slice(&[0xed; 20]);
        assert_eq!(classify(&raw), ScriptType::NullData);
        assert_eq!(get_op_return_data(&raw).unwrap(), vec![0xed; 20]);

        let multi = vec![OP_RETURN, 0x02, 0xaa, 0xbb, OP_PUSHDATA1, 0x01, 0xcc];
        assert_eq!(get_op_return_data(&multi).unwrap(), vec![0xaa, 0xbb, 0xcc]);

        assert_eq!(get_op_return_data(&[OP_RETURN]).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_op_return_small_ints() {
        assert_eq!(classify(&[OP_RETURN, OP_1]), ScriptType::NullData);
        assert!(Script::new(vec![OP_RETURN, OP_16]).is_nulldata());
        assert_eq!(get_op_return_data(&[OP_RETURN, OP_1]).unwrap(), Vec::<u8>::new());

        // small ints contribute nothing to the payload
        let mixed = vec![OP_RETURN, OP_1, 0x02, 0xab, 0xcd, OP_1NEGATE];
        assert_eq!(classify(&mixed), ScriptType::NullData);
        assert_eq!(get_op_return_data(&mixed).unwrap(), vec![0xab, 0xcd]);

        assert_eq!(classify(&[OP_RETURN, OP_16 + 1]), ScriptType::NonStandard);
    }

    #[test]
    fn test_op_return_rejections() {
        assert_eq!(get_op_return_data(&p2pkh()), Err(SpvError::NotNulldata));
        assert_eq!(get_op_return_data(&[OP_RETURN, OP_DUP]), Err(SpvError::NotNulldata));
        assert_eq!(get_op_return_data(&[OP_RETURN, 0x05, 0x01]), Err(SpvError::NotNulldata));
        assert_eq!(get_op_return_data(&[]), Err(SpvError::NotNulldata));
    }

    #[test]
    fn test_round_trip_preserves_non_minimal_push() {
        let raw = vec![OP_PUSHDATA1, 0x02, 0xaa, 0xbb, OP_DUP, OP_PUSHDATA2, 0x01, 0x00, 0xcc];
        let script = Script::new(raw.clone());
        let ops = script.ops().unwrap();
        assert_eq!(ops.len(), 3);
        assert_eq!(Script::from_ops(&ops).unwrap().as_bytes(), &raw[..]);
    }

    #[test]
    fn test_minimal_mode() {
        let non_minimal = Script::new(vec![OP_PUSHDATA1, 0x02, 0xaa, 0xbb]);
        assert!(non_minimal.ops().is_ok());
        assert_eq!(non_minimal.parse_minimal(), Err(SpvError::NonMinimalPush { offset: 0 }));

        let small_int = Script::new(vec![OP_DUP, 0x01, 0x05]);
        assert_eq!(small_int.parse_minimal(), Err(SpvError::NonMinimalPush { offset: 1 }));

        let minimal = Script::new(p2pkh());
        assert_eq!(minimal.parse_minimal().unwrap().len(), 5);

        let mut big = vec![OP_PUSHDATA2, 0x09, 0x02];
        big.extend_from_slice(&[0u8; 521]);
        assert_eq!(Script::new(big).parse_minimal(), Err(SpvError::PushTooLarge { size: 521 }));
    }

    #[test]
    fn test_truncated_push() {
        let script = Script::new(vec![0x05, 0x01, 0x02]);
        assert_eq!(script.ops(), Err(SpvError::OutOfBounds { offset: 1 }));
        assert!(!script.is_push_only());
        assert_eq!(script.to_string(), "[error]");
    }

    #[test]
    fn test_op_push_picks_smallest_opcode() {
        assert_eq!(Op::push(&[]).opcode(), OP_0);
        assert_eq!(Op::push(&[0u8; 75]).opcode(), 75);
        assert_eq!(Op::push(&[0u8; 76]).opcode(), OP_PUSHDATA1);
        assert_eq!(Op::push(&[0u8; 256]).opcode(), OP_PUSHDATA2);
    }

    #[test]
    fn test_from_ops_rejects_mismatched_push() {
        let op = Op::Push { opcode: 0x05, data: vec![1, 2, 3] };
        assert!(Script::from_ops(&[op]).is_err());
        assert!(Script::from_ops(&[Op::Code(OP_PUSHDATA1)]).is_err());
    }

    #[test]
    fn test_redeem_script() {
        let redeem = vec![0x00, 0x14, 0x01, 0x02];
        let script_sig = Script::from_ops(&[Op::push(&[0x30; 71]), Op::push(&redeem)]).unwrap();
        assert_eq!(script_sig.redeem_script().unwrap().as_bytes(), &redeem[..]);
        assert!(Script::new(p2pkh()).redeem_script().is_none());
    }

    #[test]
    fn test_asm() {
        let script = Script::new(p2pkh());
        assert_eq!(
            script.to_string(),
            format!("OP_DUP OP_HASH160 {} OP_EQUALVERIFY OP_CHECKSIG", "11".repeat(20))
        );
    }

    #[test]
    fn test_encodable() {
        let script = Script::new(vec![OP_RETURN]);
        assert_eq!(script.to_bytes().unwrap(), vec![0x01, OP_RETURN]);
        assert_eq!(Script::from_bytes(&[0x01, OP_RETURN]).unwrap(), script);
    }
}
