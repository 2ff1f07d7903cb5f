//! PostgreSQL wire types tokio-postgres has no built-in mapping for.

use std::error::Error;
use std::fmt::Write;
use tokio_postgres::types::{FromSql, Type};

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;

/// NUMERIC/DECIMAL value decoded to its exact decimal text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgNumeric(pub String);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        decode_numeric(raw).map(PgNumeric)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn read_u16(raw: &[u8], at: usize) -> Result<u16, Box<dyn Error + Sync + Send>> {
    raw.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "truncated NUMERIC value".into())
}

/// Binary layout: ndigits, weight, sign, dscale (all 16 bit), then
/// `ndigits` base-10000 digits. Digit `i` has weight `weight - i`.
fn decode_numeric(raw: &[u8]) -> Result<String, Box<dyn Error + Sync + Send>> {
    let ndigits = read_u16(raw, 0)? as usize;
    let weight = read_u16(raw, 2)? as i16 as i32;
    let sign = read_u16(raw, 4)?;
    let dscale = read_u16(raw, 6)? as usize;

    let digits = (0..ndigits)
        .map(|i| read_u16(raw, 8 + i * 2))
        .collect::<Result<Vec<u16>, _>>()?;
    let digit_at = |idx: i32| -> u16 {
        usize::try_from(idx)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_NEG => out.push('-'),
        NUMERIC_POS => {}
        other => return Err(format!("invalid NUMERIC sign {:#06x}", other).into()),
    }

    if weight < 0 {
        out.push('0');
    } else {
        for idx in 0..=weight {
            if idx == 0 {
                write!(out, "{}", digit_at(idx))?;
            } else {
                write!(out, "{:04}", digit_at(idx))?;
            }
        }
    }

    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut idx = weight + 1;
        while fraction.len() < dscale {
            write!(fraction, "{:04}", digit_at(idx))?;
            idx += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(digits.len() as u16).to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    #[test]
    fn test_decode_simple_decimal() {
        // 123.45
        let raw = encode(0, NUMERIC_POS, 2, &[123, 4500]);
        assert_eq!(decode_numeric(&raw).unwrap(), "123.45");
    }

    #[test]
    fn test_decode_multi_group_integer_part() {
        // 10000.5
        let raw = encode(1, NUMERIC_POS, 1, &[1, 0, 5000]);
        assert_eq!(decode_numeric(&raw).unwrap(), "10000.5");
    }

    #[test]
    fn test_decode_small_negative_fraction() {
        // -0.00012
        let raw = encode(-1, NUMERIC_NEG, 5, &[1, 2000]);
        assert_eq!(decode_numeric(&raw).unwrap(), "-0.00012");
    }

    #[test]
    fn test_decode_zero_and_nan() {
        assert_eq!(decode_numeric(&encode(0, NUMERIC_POS, 0, &[])).unwrap(), "0");
        assert_eq!(decode_numeric(&encode(0, NUMERIC_POS, 2, &[])).unwrap(), "0.00");
        assert_eq!(decode_numeric(&encode(0, NUMERIC_NAN, 0, &[])).unwrap(), "NaN");
    }

    #[test]
    fn test_decode_beyond_96_bit_precision() {
        // 123456789012345678901234567890.12, 32 significant digits
        let raw = encode(
            7,
            NUMERIC_POS,
            2,
            &[12, 3456, 7890, 1234, 5678, 9012, 3456, 7890, 1200],
        );
        assert_eq!(decode_numeric(&raw).unwrap(), "123456789012345678901234567890.12");
    }

    #[test]
    fn test_truncated_input_is_an_error() {
        let mut raw = encode(0, NUMERIC_POS, 0, &[42]);
        raw.pop();
        assert!(decode_numeric(&raw).is_err());
    }
}
