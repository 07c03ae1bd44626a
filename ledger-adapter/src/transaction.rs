//! Instruction and transaction encoding
//!
//! Builds the civic program's four instructions and wraps them in signed
//! legacy transactions:
//!
//! ```text
//! tx      = compact(n) ‖ signature[64] × n ‖ message
//! message = header[3] ‖ compact(k) ‖ key[32] × k ‖ blockhash[32] ‖ compact(m) ‖ instruction × m
//! ix      = program_index ‖ compact(a) ‖ account_index × a ‖ compact(d) ‖ data
//! ```
//!
//! Instruction data is an 8-byte method discriminator followed by the
//! arguments in little-endian borsh layout.

use crate::client::namespace_mismatch;
use crate::{Error, Result};
use civic_core::crypto::sha256;
use civic_core::{DerivedAddress, Keypair, LedgerPayload, LogicalRecordKey, Namespace, Pubkey};

/// System program (all-zero key)
pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::new([0u8; 32]);

/// Largest serialized transaction the ledger accepts
pub const MAX_TRANSACTION_SIZE: usize = 1232;

/// Allocated size of an air-quality record account
///
/// discriminator, location, sensor id, authority, aqi, five f32 metrics,
/// created/updated timestamps and the u32 update counter.
pub const AIR_QUALITY_ACCOUNT_SIZE: usize =
    8 + (4 + 50) + (4 + 30) + 32 + 2 + 4 * 5 + 8 + 8 + 4;

/// Allocated size of a contract record account
///
/// discriminator, name, description, type, authority, active flag,
/// timestamps, then the u32 version and execution counters.
pub const CONTRACT_ACCOUNT_SIZE: usize =
    8 + (4 + 50) + (4 + 200) + (4 + 30) + 32 + 1 + 8 + 8 + 4 + 4;

/// Account size of a namespace's records
pub fn account_size(namespace: Namespace) -> usize {
    match namespace {
        Namespace::AirQuality => AIR_QUALITY_ACCOUNT_SIZE,
        Namespace::Contract => CONTRACT_ACCOUNT_SIZE,
    }
}

/// First 8 bytes of `sha256("global:<method>")`
pub fn discriminator(method: &str) -> [u8; 8] {
    let hash = sha256(format!("global:{}", method).as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&hash[..8]);
    out
}

/// Account reference of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountMeta {
    /// Account
    pub pubkey: Pubkey,
    /// Must sign the transaction
    pub is_signer: bool,
    /// Written by the instruction
    pub is_writable: bool,
}

impl AccountMeta {
    fn writable(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    fn readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// Program instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Program to invoke
    pub program_id: Pubkey,
    /// Accounts in program order
    pub accounts: Vec<AccountMeta>,
    /// Discriminator and arguments
    pub data: Vec<u8>,
}

/// Borsh argument writer
#[derive(Debug)]
struct Args(Vec<u8>);

impl Args {
    fn new(method: &str) -> Self {
        Self(discriminator(method).to_vec())
    }

    fn string(self, value: &str) -> Self {
        self.seed(value.as_bytes())
    }

    /// Identifier seed in string layout, bytes exactly as hashed into the address
    fn seed(mut self, bytes: &[u8]) -> Self {
        self.0.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        self.0.extend_from_slice(bytes);
        self
    }

    fn u16(mut self, value: u16) -> Self {
        self.0.extend_from_slice(&value.to_le_bytes());
        self
    }

    fn f32(mut self, value: f32) -> Self {
        self.0.extend_from_slice(&value.to_le_bytes());
        self
    }

    fn bool(mut self, value: bool) -> Self {
        self.0.push(u8::from(value));
        self
    }

    fn finish(self) -> Vec<u8> {
        self.0
    }
}

/// Build the initialize instruction of a record
pub fn initialize_instruction(
    program_id: &Pubkey,
    key: &LogicalRecordKey,
    address: &DerivedAddress,
    payload: &LedgerPayload,
    authority: &Pubkey,
) -> Result<Instruction> {
    let data = match (key.namespace(), payload) {
        (Namespace::AirQuality, LedgerPayload::AirQuality(_)) => Args::new("initialize_air_quality")
            .seed(key.primary_seed())
            .seed(key.secondary_seed())
            .finish(),
        (Namespace::Contract, LedgerPayload::Contract(contract)) => Args::new("initialize_contract")
            .seed(key.primary_seed())
            .string(&contract.description)
            .string(&contract.contract_type)
            .finish(),
        _ => return Err(namespace_mismatch(key, payload)),
    };

    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::writable(address.address(), false),
            AccountMeta::writable(*authority, true),
            AccountMeta::readonly(SYSTEM_PROGRAM_ID, false),
        ],
        data,
    })
}

/// Build the update instruction of a record
pub fn update_instruction(
    program_id: &Pubkey,
    key: &LogicalRecordKey,
    address: &DerivedAddress,
    payload: &LedgerPayload,
    authority: &Pubkey,
) -> Result<Instruction> {
    let data = match (key.namespace(), payload) {
        (Namespace::AirQuality, LedgerPayload::AirQuality(r)) => Args::new("update_air_quality")
            .u16(r.aqi)
            .f32(r.pm25)
            .f32(r.pm10)
            .f32(r.co2)
            .f32(r.humidity)
            .f32(r.temperature)
            .finish(),
        (Namespace::Contract, LedgerPayload::Contract(contract)) => {
            Args::new("update_contract_status").bool(contract.is_active).finish()
        }
        _ => return Err(namespace_mismatch(key, payload)),
    };

    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::writable(address.address(), false),
            AccountMeta::readonly(*authority, true),
        ],
        data,
    })
}

/// Append a compact-u16 length
pub fn encode_compact_u16(out: &mut Vec<u8>, value: usize) -> Result<()> {
    let mut rem = u16::try_from(value)
        .map_err(|_| Error::Encoding(format!("length {} exceeds compact-u16", value)))?;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(byte);
            return Ok(());
        }
        byte |= 0x80;
        out.push(byte);
    }
}

/// Message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Signatures required
    pub num_required_signatures: u8,
    /// Signed accounts that are read-only
    pub num_readonly_signed_accounts: u8,
    /// Unsigned accounts that are read-only
    pub num_readonly_unsigned_accounts: u8,
}

/// Instruction with account indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    /// Index of the program in the key list
    pub program_id_index: u8,
    /// Indices of the accounts in the key list
    pub accounts: Vec<u8>,
    /// Instruction data
    pub data: Vec<u8>,
}

/// Legacy transaction message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Header
    pub header: MessageHeader,
    /// Accounts: signers first, writable before read-only within each group
    pub account_keys: Vec<Pubkey>,
    /// Recent blockhash
    pub recent_blockhash: [u8; 32],
    /// Instructions
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// Compile instructions with `payer` as fee payer (first key)
    pub fn compile(instructions: &[Instruction], payer: &Pubkey, recent_blockhash: [u8; 32]) -> Result<Self> {
        // Merge flags per key, preserving first-seen order
        let mut metas: Vec<AccountMeta> = vec![AccountMeta::writable(*payer, true)];
        let mut add = |meta: AccountMeta| match metas.iter_mut().find(|m| m.pubkey == meta.pubkey) {
            Some(existing) => {
                existing.is_signer |= meta.is_signer;
                existing.is_writable |= meta.is_writable;
            }
            None => metas.push(meta),
        };
        for ix in instructions {
            for meta in &ix.accounts {
                add(*meta);
            }
            add(AccountMeta::readonly(ix.program_id, false));
        }

        let rank = |m: &AccountMeta| match (m.is_signer, m.is_writable) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        };
        // Stable sort keeps the payer first among writable signers
        metas.sort_by_key(rank);

        if metas.len() > usize::from(u8::MAX) {
            return Err(Error::Encoding(format!("{} accounts exceed the key limit", metas.len())));
        }

        let header = MessageHeader {
            num_required_signatures: metas.iter().filter(|m| m.is_signer).count() as u8,
            num_readonly_signed_accounts: metas.iter().filter(|m| m.is_signer && !m.is_writable).count()
                as u8,
            num_readonly_unsigned_accounts: metas
                .iter()
                .filter(|m| !m.is_signer && !m.is_writable)
                .count() as u8,
        };
        let account_keys: Vec<Pubkey> = metas.iter().map(|m| m.pubkey).collect();
        let index_of = |key: &Pubkey| -> Result<u8> {
            account_keys
                .iter()
                .position(|k| k == key)
                .map(|i| i as u8)
                .ok_or_else(|| Error::Encoding(format!("account {} missing from key list", key)))
        };

        let instructions = instructions
            .iter()
            .map(|ix| {
                Ok(CompiledInstruction {
                    program_id_index: index_of(&ix.program_id)?,
                    accounts: ix
                        .accounts
                        .iter()
                        .map(|m| index_of(&m.pubkey))
                        .collect::<Result<Vec<u8>>>()?,
                    data: ix.data.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }

    /// Wire bytes (what signers sign)
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = vec![
            self.header.num_required_signatures,
            self.header.num_readonly_signed_accounts,
            self.header.num_readonly_unsigned_accounts,
        ];
        encode_compact_u16(&mut out, self.account_keys.len())?;
        for key in &self.account_keys {
            out.extend_from_slice(key.as_bytes());
        }
        out.extend_from_slice(&self.recent_blockhash);
        encode_compact_u16(&mut out, self.instructions.len())?;
        for ix in &self.instructions {
            out.push(ix.program_id_index);
            encode_compact_u16(&mut out, ix.accounts.len())?;
            out.extend_from_slice(&ix.accounts);
            encode_compact_u16(&mut out, ix.data.len())?;
            out.extend_from_slice(&ix.data);
        }
        Ok(out)
    }
}

/// Signed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// One signature per required signer
    pub signatures: Vec<[u8; 64]>,
    /// Serialized message
    pub message: Vec<u8>,
}

impl Transaction {
    /// Sign a message whose only signer is `signer`
    pub fn sign(message: &Message, signer: &Keypair) -> Result<Self> {
        if message.header.num_required_signatures != 1 || message.account_keys.first() != Some(&signer.pubkey()) {
            return Err(Error::Encoding(format!(
                "message needs {} signatures, only {} is available",
                message.header.num_required_signatures,
                signer.pubkey()
            )));
        }

        let bytes = message.serialize()?;
        Ok(Self {
            signatures: vec![signer.sign(&bytes)],
            message: bytes,
        })
    }

    /// Transaction id (first signature, base58)
    pub fn signature(&self) -> String {
        self.signatures
            .first()
            .map(|s| bs58::encode(s).into_string())
            .unwrap_or_default()
    }

    /// Wire bytes
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(1 + 64 * self.signatures.len() + self.message.len());
        encode_compact_u16(&mut out, self.signatures.len())?;
        for signature in &self.signatures {
            out.extend_from_slice(signature);
        }
        out.extend_from_slice(&self.message);

        if out.len() > MAX_TRANSACTION_SIZE {
            return Err(Error::Encoding(format!(
                "transaction is {} bytes (max {})",
                out.len(),
                MAX_TRANSACTION_SIZE
            )));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_core::{AddressDeriver, AirQualityReading, ContractPayload};

    fn reading() -> AirQualityReading {
        AirQualityReading {
            aqi: 185,
            pm25: 45.2,
            pm10: 62.8,
            co2: 520.0,
            humidity: 68.0,
            temperature: 26.5,
        }
    }

    #[test]
    fn test_compact_u16() {
        let cases: &[(usize, &[u8])] = &[
            (0, &[0x00]),
            (0x7f, &[0x7f]),
            (0x80, &[0x80, 0x01]),
            (0x3fff, &[0xff, 0x7f]),
            (0x4000, &[0x80, 0x80, 0x01]),
        ];
        for (value, expected) in cases {
            let mut out = Vec::new();
            encode_compact_u16(&mut out, *value).unwrap();
            assert_eq!(&out, expected);
        }
        assert!(encode_compact_u16(&mut Vec::new(), 70_000).is_err());
    }

    #[test]
    fn test_discriminator_is_prefix_of_hash() {
        let d = discriminator("update_air_quality");
        assert_eq!(d, sha256(b"global:update_air_quality")[..8]);
        assert_ne!(d, discriminator("initialize_air_quality"));
    }

    #[test]
    fn test_update_air_quality_layout() {
        let authority = Keypair::from_seed(&[5u8; 32]).pubkey();
        let deriver = AddressDeriver::default();
        let key = LogicalRecordKey::air_quality("Business_District", "ENV_001", authority);
        let address = deriver.derive_key(&key).unwrap();

        let ix = update_instruction(
            &deriver.program_id(),
            &key,
            &address,
            &LedgerPayload::AirQuality(reading()),
            &authority,
        )
        .unwrap();

        // discriminator + u16 + 5 × f32
        assert_eq!(ix.data.len(), 8 + 2 + 20);
        assert_eq!(ix.data[8..10], 185u16.to_le_bytes());
        assert_eq!(ix.data[10..14], 45.2f32.to_le_bytes());
        assert_eq!(ix.accounts[0].pubkey, address.address());
        assert!(ix.accounts[1].is_signer && !ix.accounts[1].is_writable);
    }

    #[test]
    fn test_initialize_air_quality_layout() {
        let authority = Keypair::from_seed(&[5u8; 32]).pubkey();
        let deriver = AddressDeriver::default();
        let key = LogicalRecordKey::air_quality("Downtown", "AQ_1", authority);
        let address = deriver.derive_key(&key).unwrap();

        let ix = initialize_instruction(
            &deriver.program_id(),
            &key,
            &address,
            &LedgerPayload::AirQuality(reading()),
            &authority,
        )
        .unwrap();

        let mut expected = discriminator("initialize_air_quality").to_vec();
        expected.extend_from_slice(&8u32.to_le_bytes());
        expected.extend_from_slice(b"Downtown");
        expected.extend_from_slice(&4u32.to_le_bytes());
        expected.extend_from_slice(b"AQ_1");
        assert_eq!(ix.data, expected);
        assert_eq!(ix.accounts[2].pubkey, SYSTEM_PROGRAM_ID);
    }

    #[test]
    fn test_namespace_mismatch_rejected() {
        let authority = Pubkey::new([1u8; 32]);
        let key = LogicalRecordKey::contract("budget", authority);
        let address = AddressDeriver::default().derive_key(&key).unwrap();
        let result = update_instruction(
            &Pubkey::new([9u8; 32]),
            &key,
            &address,
            &LedgerPayload::AirQuality(reading()),
            &authority,
        );
        assert!(matches!(result, Err(Error::Encoding(_))));
    }

    #[test]
    fn test_message_account_order() {
        let signer = Keypair::from_seed(&[5u8; 32]);
        let authority = signer.pubkey();
        let deriver = AddressDeriver::default();
        let key = LogicalRecordKey::contract("budget", authority);
        let address = deriver.derive_key(&key).unwrap();
        let payload = LedgerPayload::Contract(ContractPayload {
            name: "budget".into(),
            description: "council: approved".into(),
            contract_type: "governance".into(),
            is_active: true,
        });

        let ix = initialize_instruction(&deriver.program_id(), &key, &address, &payload, &authority).unwrap();
        let message = Message::compile(&[ix], &authority, [3u8; 32]).unwrap();

        assert_eq!(
            message.account_keys,
            vec![authority, address.address(), SYSTEM_PROGRAM_ID, deriver.program_id()]
        );
        assert_eq!(
            message.header,
            MessageHeader {
                num_required_signatures: 1,
                num_readonly_signed_accounts: 0,
                num_readonly_unsigned_accounts: 2,
            }
        );
        assert_eq!(message.instructions[0].program_id_index, 3);
        assert_eq!(message.instructions[0].accounts, vec![1, 0, 2]);

        let tx = Transaction::sign(&message, &signer).unwrap();
        let bytes = tx.serialize().unwrap();
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[65..], message.serialize().unwrap().as_slice());
        assert!(signer.verify(&bytes[65..], &tx.signatures[0]).is_ok());
    }

    #[test]
    fn test_foreign_signer_rejected() {
        let signer = Keypair::from_seed(&[5u8; 32]);
        let other = Keypair::from_seed(&[6u8; 32]);
        let message = Message::compile(&[], &signer.pubkey(), [0u8; 32]).unwrap();
        assert!(Transaction::sign(&message, &other).is_err());
    }

    #[test]
    fn test_account_sizes() {
        assert_eq!(AIR_QUALITY_ACCOUNT_SIZE, 170);
        assert_eq!(CONTRACT_ACCOUNT_SIZE, 357);
        assert_eq!(account_size(Namespace::AirQuality), 170);
        assert_eq!(account_size(Namespace::Contract), 357);
    }
}
