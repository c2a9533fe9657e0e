//! Versioned binary encoding of stored outputs.
//!
//! ```text
//! version: u8
//! section 0: len u32 BE || index u64 || out_cm 32 || root_cm 32 || tag0 u8 || payload
//!            tag0: 0 = none, 1 = cleartext, 2 = confidential-v0
//! section 1: len u32 BE || tag1 u8 || payload                     (version >= 1)
//!            tag1: 0 = none, 1 = confidential-v1a, 2 = confidential-v1b
//! ```
//!
//! Sections are length-prefixed, so a reader that only understands
//! section 0 skips whatever a newer writer appended after it. Exactly one
//! tag across all sections is non-zero.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

use shroud_privacy::{
    Address, Asset, AssetCommitment, Commitment, EncryptedAsset, MAX_CIPHERTEXT_LEN, MAX_MEMO_LEN,
};

use crate::error::{LedgerError, Result};
use crate::record::{CleartextOutput, ConfidentialOutput, OutputRecord, OutputState, SchemaVersion};

const TAG_NONE: u8 = 0;
const TAG0_CLEARTEXT: u8 = 1;
const TAG0_CONFIDENTIAL_V0: u8 = 2;
const TAG1_CONFIDENTIAL_V1A: u8 = 1;
const TAG1_CONFIDENTIAL_V1B: u8 = 2;

// ============================================================================
// Encoding
// ============================================================================

/// Encode with the schema recorded on the state
pub fn encode_output_state(state: &OutputState) -> Result<Vec<u8>> {
    if state.record.min_schema() > state.schema {
        return Err(LedgerError::InvalidRecord(format!(
            "{:?} record cannot be encoded with schema {:?}",
            state.record.generation(),
            state.schema
        )));
    }

    let mut section0 = Vec::with_capacity(256);
    section0.write_u64::<BigEndian>(state.index)?;
    section0.write_all(state.out_cm.as_bytes())?;
    section0.write_all(state.root_cm.as_bytes())?;
    match &state.record {
        OutputRecord::Cleartext(o) => {
            section0.write_u8(TAG0_CLEARTEXT)?;
            write_cleartext(&mut section0, o)?;
        }
        OutputRecord::ConfidentialV0(o) => {
            section0.write_u8(TAG0_CONFIDENTIAL_V0)?;
            write_confidential(&mut section0, o)?;
        }
        _ => section0.write_u8(TAG_NONE)?,
    }

    let mut out = Vec::with_capacity(section0.len() + 16);
    out.write_u8(state.schema as u8)?;
    write_section(&mut out, &section0)?;

    if state.schema >= SchemaVersion::V1 {
        let mut section1 = Vec::with_capacity(256);
        match &state.record {
            OutputRecord::ConfidentialV1a(o) => {
                section1.write_u8(TAG1_CONFIDENTIAL_V1A)?;
                write_confidential(&mut section1, o)?;
            }
            OutputRecord::ConfidentialV1b(o) => {
                section1.write_u8(TAG1_CONFIDENTIAL_V1B)?;
                write_confidential(&mut section1, o)?;
            }
            _ => section1.write_u8(TAG_NONE)?,
        }
        write_section(&mut out, &section1)?;
    }

    Ok(out)
}

fn write_section(out: &mut Vec<u8>, body: &[u8]) -> Result<()> {
    let len = u32::try_from(body.len())
        .map_err(|_| LedgerError::InvalidRecord("section larger than 4 GiB".into()))?;
    out.write_u32::<BigEndian>(len)?;
    out.write_all(body)?;
    Ok(())
}

fn write_cleartext<W: Write>(w: &mut W, o: &CleartextOutput) -> Result<()> {
    if o.memo.len() > MAX_MEMO_LEN {
        return Err(LedgerError::InvalidRecord(format!(
            "memo of {} bytes exceeds {}",
            o.memo.len(),
            MAX_MEMO_LEN
        )));
    }
    o.owner.write_to(w)?;
    o.asset.write_to(w)?;
    w.write_u16::<BigEndian>(o.memo.len() as u16)?;
    w.write_all(&o.memo)?;
    Ok(())
}

fn write_confidential<W: Write>(w: &mut W, o: &ConfidentialOutput) -> Result<()> {
    let ct_len = o.encrypted.ciphertext.len();
    if ct_len > MAX_CIPHERTEXT_LEN {
        return Err(LedgerError::InvalidRecord(format!(
            "ciphertext of {} bytes exceeds {}",
            ct_len, MAX_CIPHERTEXT_LEN
        )));
    }
    o.owner.write_to(w)?;
    w.write_all(o.asset_cm.as_bytes())?;
    w.write_all(&o.encrypted.ephemeral_pk)?;
    w.write_all(&o.encrypted.nonce)?;
    w.write_u32::<BigEndian>(ct_len as u32)?;
    w.write_all(&o.encrypted.ciphertext)?;
    Ok(())
}

// ============================================================================
// Decoding
// ============================================================================

/// Section-0 fields, as seen by a reader that predates confidential-v1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputStateV0 {
    pub index: u64,
    pub out_cm: Commitment,
    pub root_cm: Commitment,
    /// `None` when the record lives in a later section
    pub record: Option<OutputRecord>,
}

struct Section0 {
    index: u64,
    out_cm: Commitment,
    root_cm: Commitment,
    record: Option<OutputRecord>,
}

/// Full decoder: accepts every schema up to `SchemaVersion::LATEST`
pub fn decode_output_state(bytes: &[u8]) -> Result<OutputState> {
    let mut cursor = Cursor::new(bytes);
    let schema = SchemaVersion::from_byte(cursor.read_u8()?)?;

    let section0 = parse_section0(&read_section(&mut cursor)?)?;
    let section1 = if schema >= SchemaVersion::V1 {
        parse_section1(&read_section(&mut cursor)?)?
    } else {
        None
    };
    expect_end(&cursor)?;

    let record = match (section0.record, section1) {
        (Some(r), None) | (None, Some(r)) => r,
        (None, None) => {
            return Err(LedgerError::InvalidRecord("stored output has no record".into()));
        }
        (Some(_), Some(_)) => {
            return Err(LedgerError::InvalidRecord(
                "stored output has more than one record".into(),
            ));
        }
    };

    Ok(OutputState {
        index: section0.index,
        record,
        out_cm: section0.out_cm,
        root_cm: section0.root_cm,
        schema,
    })
}

/// Historical reader: section 0 only, later sections are skipped
pub fn decode_output_state_v0(bytes: &[u8]) -> Result<OutputStateV0> {
    let mut cursor = Cursor::new(bytes);
    let _version = cursor.read_u8()?;
    let section0 = parse_section0(&read_section(&mut cursor)?)?;

    Ok(OutputStateV0 {
        index: section0.index,
        out_cm: section0.out_cm,
        root_cm: section0.root_cm,
        record: section0.record,
    })
}

fn read_section(cursor: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let len = cursor.read_u32::<BigEndian>()? as usize;
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if len > remaining {
        return Err(LedgerError::Decode(format!(
            "section of {} bytes but only {} remain",
            len, remaining
        )));
    }
    let mut body = vec![0u8; len];
    cursor.read_exact(&mut body)?;
    Ok(body)
}

fn expect_end(cursor: &Cursor<&[u8]>) -> Result<()> {
    let trailing = cursor.get_ref().len() - cursor.position() as usize;
    if trailing != 0 {
        return Err(LedgerError::Decode(format!("{} trailing bytes", trailing)));
    }
    Ok(())
}

fn parse_section0(body: &[u8]) -> Result<Section0> {
    let mut cursor = Cursor::new(body);
    let index = cursor.read_u64::<BigEndian>()?;
    let out_cm = Commitment(read_array(&mut cursor)?);
    let root_cm = Commitment(read_array(&mut cursor)?);

    let record = match cursor.read_u8()? {
        TAG_NONE => None,
        TAG0_CLEARTEXT => Some(OutputRecord::Cleartext(read_cleartext(&mut cursor)?)),
        TAG0_CONFIDENTIAL_V0 => Some(OutputRecord::ConfidentialV0(read_confidential(
            &mut cursor,
        )?)),
        other => {
            return Err(LedgerError::Decode(format!("unknown section 0 tag {}", other)));
        }
    };
    expect_end(&cursor)?;

    Ok(Section0 {
        index,
        out_cm,
        root_cm,
        record,
    })
}

fn parse_section1(body: &[u8]) -> Result<Option<OutputRecord>> {
    let mut cursor = Cursor::new(body);
    let record = match cursor.read_u8()? {
        TAG_NONE => None,
        TAG1_CONFIDENTIAL_V1A => Some(OutputRecord::ConfidentialV1a(read_confidential(
            &mut cursor,
        )?)),
        TAG1_CONFIDENTIAL_V1B => Some(OutputRecord::ConfidentialV1b(read_confidential(
            &mut cursor,
        )?)),
        other => {
            return Err(LedgerError::Decode(format!("unknown section 1 tag {}", other)));
        }
    };
    expect_end(&cursor)?;
    Ok(record)
}

fn read_cleartext<R: Read>(r: &mut R) -> Result<CleartextOutput> {
    let owner = Address::read_from(r)?;
    let asset = Asset::read_from(r)?;
    let memo_len = r.read_u16::<BigEndian>()? as usize;
    if memo_len > MAX_MEMO_LEN {
        return Err(LedgerError::Decode(format!("memo length {}", memo_len)));
    }
    let mut memo = vec![0u8; memo_len];
    r.read_exact(&mut memo)?;
    Ok(CleartextOutput::new(owner, asset, memo))
}

fn read_confidential<R: Read>(r: &mut R) -> Result<ConfidentialOutput> {
    let owner = Address::read_from(r)?;
    let asset_cm = AssetCommitment(read_array(r)?);
    let ephemeral_pk = read_array(r)?;
    let mut nonce = [0u8; 12];
    r.read_exact(&mut nonce)?;

    let ct_len = r.read_u32::<BigEndian>()? as usize;
    if ct_len > MAX_CIPHERTEXT_LEN {
        return Err(LedgerError::Decode(format!("ciphertext length {}", ct_len)));
    }
    let mut ciphertext = vec![0u8; ct_len];
    r.read_exact(&mut ciphertext)?;

    Ok(ConfidentialOutput {
        owner,
        asset_cm,
        encrypted: EncryptedAsset {
            ephemeral_pk,
            nonce,
            ciphertext,
        },
    })
}

fn read_array<R: Read>(r: &mut R) -> Result<[u8; 32]> {
    let mut out = [0u8; 32];
    r.read_exact(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::{cleartext, confidential};
    use shroud_privacy::{AddressKind, Keypair, currency_id};

    fn v1a_state() -> OutputState {
        OutputState::new(
            3,
            OutputRecord::ConfidentialV1a(confidential(AddressKind::Native, 40)),
            SchemaVersion::V1,
        )
        .unwrap()
    }

    #[test]
    fn test_v1_encoding_is_byte_stable() {
        let state = v1a_state();
        let bytes = encode_output_state(&state).unwrap();
        let decoded = decode_output_state(&bytes).unwrap();

        assert_eq!(decoded, state);
        assert_eq!(encode_output_state(&decoded).unwrap(), bytes);
    }

    #[test]
    fn test_v0_schema_stays_v0() {
        let state = OutputState::new(1, cleartext(10), SchemaVersion::V0).unwrap();
        let bytes = encode_output_state(&state).unwrap();
        assert_eq!(bytes[0], 0);

        let decoded = decode_output_state(&bytes).unwrap();
        assert_eq!(decoded.schema, SchemaVersion::V0);
        assert_eq!(encode_output_state(&decoded).unwrap(), bytes);
    }

    #[test]
    fn test_historical_reader_sees_v0_subset() {
        let legacy = OutputState::new(
            2,
            OutputRecord::ConfidentialV0(confidential(AddressKind::Legacy, 5)),
            SchemaVersion::V1,
        )
        .unwrap();
        let bytes = encode_output_state(&legacy).unwrap();

        let view = decode_output_state_v0(&bytes).unwrap();
        assert_eq!(view.index, 2);
        assert_eq!(view.out_cm, legacy.out_cm);
        assert_eq!(view.root_cm, legacy.root_cm);
        assert_eq!(view.record, Some(legacy.record.clone()));
        assert_eq!(decode_output_state(&bytes).unwrap(), legacy);

        // a v1 record is invisible to the old reader, but its header is not
        let state = v1a_state();
        let view = decode_output_state_v0(&encode_output_state(&state).unwrap()).unwrap();
        assert_eq!(view.index, state.index);
        assert_eq!(view.root_cm, state.root_cm);
        assert!(view.record.is_none());
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut bytes = encode_output_state(&v1a_state()).unwrap();
        bytes[0] = 2;
        assert!(matches!(
            decode_output_state(&bytes),
            Err(LedgerError::SchemaVersionUnknown { found: 2, .. })
        ));
    }

    #[test]
    fn test_v1_record_cannot_be_written_as_v0() {
        let mut state = v1a_state();
        state.schema = SchemaVersion::V0;
        assert!(matches!(
            encode_output_state(&state),
            Err(LedgerError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_two_records_rejected() {
        // hand-build a v1 envelope with a record in both sections
        let legacy = OutputState::new(0, cleartext(1), SchemaVersion::V0).unwrap();
        let mut bytes = encode_output_state(&legacy).unwrap();
        bytes[0] = 1;

        let mut section1 = vec![TAG1_CONFIDENTIAL_V1B];
        write_confidential(&mut section1, &confidential(AddressKind::Native, 1)).unwrap();
        write_section(&mut bytes, &section1).unwrap();

        assert!(matches!(
            decode_output_state(&bytes),
            Err(LedgerError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_length_limits_round_trip() {
        let mut body = confidential(AddressKind::Native, 7);
        body.encrypted.ciphertext.resize(MAX_CIPHERTEXT_LEN, 0xab);
        let mut state =
            OutputState::new(4, OutputRecord::ConfidentialV1b(body), SchemaVersion::V1).unwrap();
        let bytes = encode_output_state(&state).unwrap();
        assert_eq!(decode_output_state(&bytes).unwrap(), state);

        if let OutputRecord::ConfidentialV1b(o) = &mut state.record {
            o.encrypted.ciphertext.push(0xab);
        }
        assert!(state.record.validate().is_err());
        assert!(matches!(
            encode_output_state(&state),
            Err(LedgerError::InvalidRecord(_))
        ));

        let owner = Keypair::from_seed(&[6u8; 64]).address(AddressKind::Legacy);
        let asset = Asset::token(currency_id("SERO"), 1);
        let full = OutputRecord::cleartext(owner, asset, vec![1u8; MAX_MEMO_LEN]);
        let state = OutputState::new(0, full, SchemaVersion::V0).unwrap();
        let bytes = encode_output_state(&state).unwrap();
        assert_eq!(decode_output_state(&bytes).unwrap(), state);

        let over = OutputRecord::cleartext(owner, asset, vec![1u8; MAX_MEMO_LEN + 1]);
        assert!(over.validate().is_err());
    }

    #[test]
    fn test_truncated_input_is_decode_error() {
        let bytes = encode_output_state(&v1a_state()).unwrap();
        for cut in [1usize, 5, 40, bytes.len() - 1] {
            assert!(matches!(
                decode_output_state(&bytes[..cut]),
                Err(LedgerError::Decode(_))
            ));
        }
    }
}
