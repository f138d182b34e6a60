//! Transaction model and wire codec (legacy and segwit serializations)

use crate::constants::*;
use crate::cursor::{Reader, Writer};
use crate::encode::{Decodable, Encodable};
use crate::error::{Result, SpvError};
use crate::hash::hash256;
use crate::script::{classify, Script, ScriptType};
use crate::segwit;
use crate::types::Hash256;
use crate::varint;
use crate::witness::Witness;

/// Reference to output `index` of transaction `txid`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Outpoint {
    pub txid: Hash256,
    pub index: u32,
}

impl Outpoint {
    pub const SIZE: usize = 36;

    pub fn new(txid: Hash256, index: u32) -> Self {
        Outpoint { txid, index }
    }

    /// The outpoint spent by a coinbase input
    pub fn null() -> Self {
        Outpoint {
            txid: Hash256::ZERO,
            index: NULL_OUTPOINT_INDEX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.index == NULL_OUTPOINT_INDEX
    }
}

impl Encodable for Outpoint {
    fn encoded_size(&self) -> usize {
        Self::SIZE
    }

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_hash(&self.txid)?.write_u32_le(self.index)?;
        Ok(())
    }
}

impl Decodable for Outpoint {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Outpoint {
            txid: reader.read_hash()?,
            index: reader.read_u32_le()?,
        })
    }
}

/// How an input's spend authorization is carried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    /// Everything in the scriptSig
    Legacy,
    /// P2SH-wrapped segwit: the scriptSig only pushes a v0 witness program
    Compatibility,
    /// Native segwit: empty scriptSig
    Witness,
}

/// Transaction input. The witness is carried separately on the wire and is
/// not part of the legacy encoding produced by [`Encodable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub prevout: Outpoint,
    pub script_sig: Script,
    pub sequence: u32,
    pub witness: Witness,
}

impl Input {
    pub fn new(prevout: Outpoint, script_sig: Script, sequence: u32) -> Self {
        Input {
            prevout,
            script_sig,
            sequence,
            witness: Witness::default(),
        }
    }

    pub fn with_witness(mut self, witness: Witness) -> Self {
        self.witness = witness;
        self
    }

    pub fn is_final(&self) -> bool {
        self.sequence == SEQUENCE_FINAL
    }

    /// BIP125 opt-in replace-by-fee signal
    pub fn is_rbf(&self) -> bool {
        self.sequence < SEQUENCE_RBF
    }

    pub fn input_type(&self) -> InputType {
        let raw = self.script_sig.as_bytes();
        if raw.is_empty() {
            return InputType::Witness;
        }
        // a single direct push of OP_0 <20> or OP_0 <32>
        let nested = match raw.len() {
            23 => raw[0] == 0x16 && matches!(classify(&raw[1..]), ScriptType::WitnessPubKeyHash),
            35 => raw[0] == 0x22 && matches!(classify(&raw[1..]), ScriptType::WitnessScriptHash),
            _ => false,
        };
        if nested {
            InputType::Compatibility
        } else {
            InputType::Legacy
        }
    }
}

impl Encodable for Input {
    fn encoded_size(&self) -> usize {
        Outpoint::SIZE + self.script_sig.encoded_size() + 4
    }

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        self.prevout.encode(writer)?;
        self.script_sig.encode(writer)?;
        writer.write_u32_le(self.sequence)?;
        Ok(())
    }
}

impl Decodable for Input {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let prevout = Outpoint::decode(reader)?;
        let script_sig = Script::decode(reader)?;
        let sequence = reader.read_u32_le()?;
        Ok(Input::new(prevout, script_sig, sequence))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    /// Value in satoshis
    pub value: u64,
    pub script_pubkey: Script,
}

impl Output {
    pub fn new(value: u64, script_pubkey: Script) -> Self {
        Output { value, script_pubkey }
    }

    pub fn script_type(&self) -> ScriptType {
        self.script_pubkey.classify()
    }
}

impl Encodable for Output {
    fn encoded_size(&self) -> usize {
        8 + self.script_pubkey.encoded_size()
    }

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_u64_le(self.value)?;
        self.script_pubkey.encode(writer)
    }
}

impl Decodable for Output {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let value = reader.read_u64_le()?;
        let script_pubkey = Script::decode(reader)?;
        Ok(Output { value, script_pubkey })
    }
}

/// Transaction: 𝒯𝒳 = (version, ins, outs, locktime)
///
/// Immutable once built. `txid` (legacy serialization) and `wtxid` (witness
/// serialization, or the txid when no input carries witness data) are
/// computed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    version: u32,
    inputs: Vec<Input>,
    outputs: Vec<Output>,
    locktime: u32,
    txid: Hash256,
    wtxid: Hash256,
}

impl Transaction {
    /// Build a transaction from explicit fields.
    ///
    /// Fails with `ZeroInputNonEmptyOutputs` when `inputs` is empty but
    /// `outputs` is not: that shape cannot be told apart from the segwit
    /// marker on the wire.
    pub fn new(version: u32, inputs: Vec<Input>, outputs: Vec<Output>, locktime: u32) -> Result<Self> {
        if inputs.is_empty() && !outputs.is_empty() {
            return Err(SpvError::ZeroInputNonEmptyOutputs);
        }
        let mut tx = Transaction {
            version,
            inputs,
            outputs,
            locktime,
            txid: Hash256::ZERO,
            wtxid: Hash256::ZERO,
        };
        tx.txid = hash256(&tx.to_legacy_bytes()?);
        tx.wtxid = if tx.has_witness() {
            hash256(&tx.to_bytes()?)
        } else {
            tx.txid
        };
        Ok(tx)
    }

    /// Build a legacy transaction from its raw input and output vectors
    pub fn from_parts(version: u32, vin: &[u8], vout: &[u8], locktime: u32) -> Result<Self> {
        Transaction::new(version, parse_vin(vin)?, parse_vout(vout)?, locktime)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn locktime(&self) -> u32 {
        self.locktime
    }

    pub fn txid(&self) -> Hash256 {
        self.txid
    }

    pub fn wtxid(&self) -> Hash256 {
        self.wtxid
    }

    /// True iff any input carries a non-empty witness stack
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|input| !input.witness.is_empty())
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// Varint input count followed by the legacy input encodings
    pub fn vin_bytes(&self) -> Result<Vec<u8>> {
        encode_list(&self.inputs)
    }

    /// Varint output count followed by the output encodings
    pub fn vout_bytes(&self) -> Result<Vec<u8>> {
        encode_list(&self.outputs)
    }

    /// Size of the legacy serialization
    pub fn base_size(&self) -> usize {
        4 + list_size(&self.inputs) + list_size(&self.outputs) + 4
    }

    /// Size of the serialization [`Encodable::to_bytes`] produces
    pub fn total_size(&self) -> usize {
        if !self.has_witness() {
            return self.base_size();
        }
        let witness_size: usize = self.inputs.iter().map(|i| i.witness.encoded_size()).sum();
        self.base_size() + 2 + witness_size
    }

    pub fn weight(&self) -> usize {
        segwit::transaction_weight(self)
    }

    pub fn vsize(&self) -> usize {
        segwit::transaction_vsize(self)
    }

    /// Legacy serialization, the preimage of the txid
    pub fn to_legacy_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::with_size(self.base_size());
        self.encode_as(&mut writer, false)?;
        writer.finish()
    }

    fn encode_as(&self, writer: &mut Writer, witness: bool) -> Result<()> {
        if self.inputs.is_empty() && !self.outputs.is_empty() {
            return Err(SpvError::ZeroInputNonEmptyOutputs);
        }
        writer.write_u32_le(self.version)?;
        if witness {
            writer.write_u8(WITNESS_MARKER)?.write_u8(WITNESS_FLAG)?;
        }
        writer.write_varint(self.inputs.len() as u64)?;
        for input in &self.inputs {
            input.encode(writer)?;
        }
        writer.write_varint(self.outputs.len() as u64)?;
        for output in &self.outputs {
            output.encode(writer)?;
        }
        if witness {
            for input in &self.inputs {
                input.witness.encode(writer)?;
            }
        }
        writer.write_u32_le(self.locktime)?;
        Ok(())
    }
}

/// Witness serialization when any input has witness data, legacy otherwise
impl Encodable for Transaction {
    fn encoded_size(&self) -> usize {
        self.total_size()
    }

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        self.encode_as(writer, self.has_witness())
    }
}

impl Decodable for Transaction {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let version = reader.read_u32_le()?;

        let mut flag = 0u8;
        if let Ok(&[WITNESS_MARKER, next]) = reader.peek(2) {
            if next != 0 {
                if next & !WITNESS_FLAG != 0 {
                    return Err(SpvError::UnknownWitnessFlag(next));
                }
                flag = next;
                reader.seek(2)?;
            }
        }

        let mut inputs = decode_list::<Input>(reader)?;
        let outputs = decode_list::<Output>(reader)?;
        if inputs.is_empty() && !outputs.is_empty() {
            return Err(SpvError::ZeroInputNonEmptyOutputs);
        }

        if flag & WITNESS_FLAG != 0 {
            for input in inputs.iter_mut() {
                input.witness = Witness::decode(reader)?;
            }
        }

        let locktime = reader.read_u32_le()?;
        Transaction::new(version, inputs, outputs, locktime)
    }
}

fn list_size<T: Encodable>(items: &[T]) -> usize {
    varint::size(items.len() as u64) + items.iter().map(|item| item.encoded_size()).sum::<usize>()
}

fn encode_list<T: Encodable>(items: &[T]) -> Result<Vec<u8>> {
    let mut writer = Writer::with_size(list_size(items));
    writer.write_varint(items.len() as u64)?;
    for item in items {
        item.encode(&mut writer)?;
    }
    writer.finish()
}

fn decode_list<T: Decodable>(reader: &mut Reader<'_>) -> Result<Vec<T>> {
    let count = reader.read_varint()?;
    let mut items = Vec::with_capacity((count as usize).min(reader.left()));
    for _ in 0..count {
        items.push(T::decode(reader)?);
    }
    Ok(items)
}

/// Parse a raw input vector, which must hold at least one input and be
/// consumed exactly
pub fn parse_vin(vin: &[u8]) -> Result<Vec<Input>> {
    let mut reader = Reader::new(vin);
    let inputs = decode_list::<Input>(&mut reader).map_err(|_| SpvError::InvalidVin)?;
    if inputs.is_empty() || !reader.is_at_end() {
        return Err(SpvError::InvalidVin);
    }
    Ok(inputs)
}

/// Parse a raw output vector, which must hold at least one output and be
/// consumed exactly
pub fn parse_vout(vout: &[u8]) -> Result<Vec<Output>> {
    let mut reader = Reader::new(vout);
    let outputs = decode_list::<Output>(&mut reader).map_err(|_| SpvError::InvalidVout)?;
    if outputs.is_empty() || !reader.is_at_end() {
        return Err(SpvError::InvalidVout);
    }
    Ok(outputs)
}
