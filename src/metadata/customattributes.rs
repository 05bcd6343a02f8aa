//! Custom attribute values whose first fixed argument is a string (ECMA-335 II.23.3).
//!
//! Descriptive assembly attributes such as `AssemblyCompanyAttribute` carry a single
//! `SerString` argument. [`StringAttributeValue`] decodes that argument and keeps the remaining
//! bytes (further fixed arguments and named arguments) untouched, so rewriting the string never
//! disturbs the rest of the blob.

use crate::{
    file::{io::push_compressed_uint, parser::Parser},
    Result,
};

/// Prolog of every custom attribute value blob.
pub const CUSTOM_ATTRIBUTE_PROLOG: u16 = 0x0001;

/// A custom attribute value split into its leading string argument and the remaining bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringAttributeValue {
    /// The first fixed argument, `None` for a null string
    pub value: Option<String>,
    /// Everything after the first argument, copied verbatim
    pub tail: Vec<u8>,
}

impl StringAttributeValue {
    /// Decode a value blob whose constructor takes a string as its first parameter.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a missing prolog or invalid UTF-8.
    pub fn parse(blob: &[u8]) -> Result<StringAttributeValue> {
        let mut parser = Parser::new(blob);
        let prolog = parser.read_le::<u16>()?;
        if prolog != CUSTOM_ATTRIBUTE_PROLOG {
            return Err(malformed_error!("Invalid custom attribute prolog - {:#06x}", prolog));
        }

        let value = parser.read_ser_string()?;
        let tail = parser.read_bytes(parser.remaining())?.to_vec();
        Ok(StringAttributeValue { value, tail })
    }

    /// A value with a single string argument and no named arguments.
    #[must_use]
    pub fn new(value: &str) -> StringAttributeValue {
        StringAttributeValue {
            value: Some(value.to_string()),
            tail: vec![0x00, 0x00],
        }
    }

    /// Encode the value blob.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the string is too long to encode.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = CUSTOM_ATTRIBUTE_PROLOG.to_le_bytes().to_vec();
        match &self.value {
            Some(value) => {
                let length = u32::try_from(value.len())
                    .map_err(|_| malformed_error!("String too long - {}", value.len()))?;
                push_compressed_uint(&mut out, length)?;
                out.extend_from_slice(value.as_bytes());
            }
            None => out.push(0xFF),
        }
        out.extend_from_slice(&self.tail);
        Ok(out)
    }
}
