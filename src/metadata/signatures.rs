//! Method signature inspection and construction (ECMA-335 II.23.2).
//!
//! Only the shape of a signature is decoded: the calling convention, the generic arity and the
//! raw encoding of the return type and every parameter. That is enough to forward a method's
//! parameters to another method and to build the few signatures the patcher imports.

use crate::{
    file::{io::push_compressed_uint, parser::Parser},
    metadata::{tables::TableId, token::Token},
    Result,
};

#[allow(non_snake_case, dead_code, missing_docs)]
/// Element type bytes used in signatures
pub mod ELEMENT_TYPE {
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    // Followed by type
    pub const PTR: u8 = 0x0f;
    // Followed by type
    pub const BYREF: u8 = 0x10;
    // Followed by TypeDefOrRef token
    pub const VALUETYPE: u8 = 0x11;
    // Followed by TypeDefOrRef token
    pub const CLASS: u8 = 0x12;
    pub const VAR: u8 = 0x13;
    // type rank boundsCount bound1 … loCount lo1 …
    pub const ARRAY: u8 = 0x14;
    // type type-arg-count type-1 ... type-n
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    // System.IntPtr
    pub const I: u8 = 0x18;
    // System.UIntPtr
    pub const U: u8 = 0x19;
    // Followed by full method signature
    pub const FNPTR: u8 = 0x1b;
    pub const OBJECT: u8 = 0x1c;
    pub const SZARRAY: u8 = 0x1d;
    pub const MVAR: u8 = 0x1e;
    pub const CMOD_REQD: u8 = 0x1f;
    pub const CMOD_OPT: u8 = 0x20;
    pub const SENTINEL: u8 = 0x41;
    pub const PINNED: u8 = 0x45;
}

/// Calling convention flag for instance methods.
pub const HAS_THIS: u8 = 0x20;
/// Calling convention flag for an explicit `this` parameter.
pub const EXPLICIT_THIS: u8 = 0x40;
/// Calling convention flag for generic methods.
pub const GENERIC: u8 = 0x10;

/// The decoded shape of a `MethodDefSig` or `MethodRefSig`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    /// Calling convention byte, including `HASTHIS`/`GENERIC` flags
    pub calling_convention: u8,
    /// Number of generic parameters, 0 for non generic methods
    pub generic_params: u32,
    /// Encoded return type, including custom modifiers
    pub return_type: Vec<u8>,
    /// Encoded parameter types in declaration order
    pub params: Vec<Vec<u8>>,
}

impl MethodSignature {
    /// Decode a method signature blob.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unknown element type and
    /// [`crate::Error::OutOfBounds`] for a truncated signature.
    pub fn parse(data: &[u8]) -> Result<MethodSignature> {
        let mut parser = Parser::new(data);

        let calling_convention = parser.read_le::<u8>()?;
        let generic_params = if calling_convention & GENERIC != 0 {
            parser.read_compressed_uint()?
        } else {
            0
        };

        let param_count = parser.read_compressed_uint()?;
        let return_type = read_type(&mut parser)?.to_vec();

        let mut params = Vec::with_capacity(param_count as usize);
        for _ in 0..param_count {
            params.push(read_type(&mut parser)?.to_vec());
        }

        Ok(MethodSignature {
            calling_convention,
            generic_params,
            return_type,
            params,
        })
    }

    /// A static, non generic signature with the given return type and parameters.
    #[must_use]
    pub fn new_static(return_type: Vec<u8>, params: Vec<Vec<u8>>) -> MethodSignature {
        MethodSignature {
            calling_convention: 0,
            generic_params: 0,
            return_type,
            params,
        }
    }

    /// An instance, non generic signature with the given return type and parameters.
    #[must_use]
    pub fn new_instance(return_type: Vec<u8>, params: Vec<Vec<u8>>) -> MethodSignature {
        MethodSignature {
            calling_convention: HAS_THIS,
            generic_params: 0,
            return_type,
            params,
        }
    }

    /// Returns `true` for instance methods, whose argument 0 is `this`.
    #[must_use]
    pub fn has_this(&self) -> bool {
        self.calling_convention & HAS_THIS != 0
    }

    /// Number of arguments a caller pushes, counting `this` for instance methods.
    #[must_use]
    pub fn argument_count(&self) -> usize {
        self.params.len() + usize::from(self.has_this() && self.calling_convention & EXPLICIT_THIS == 0)
    }

    /// Returns `true` if the method returns `void`.
    #[must_use]
    pub fn returns_void(&self) -> bool {
        self.return_type == [ELEMENT_TYPE::VOID]
    }

    /// Encode the signature blob.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a count exceeds the compressed integer range.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = vec![self.calling_convention];
        if self.calling_convention & GENERIC != 0 {
            push_compressed_uint(&mut out, self.generic_params)?;
        }

        let count = u32::try_from(self.params.len())
            .map_err(|_| malformed_error!("Too many parameters - {}", self.params.len()))?;
        push_compressed_uint(&mut out, count)?;
        out.extend_from_slice(&self.return_type);
        for param in &self.params {
            out.extend_from_slice(param);
        }
        Ok(out)
    }
}

/// Encode `token` as a `TypeDefOrRefOrSpecEncoded` value (ECMA-335 II.23.2.8).
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `token` is not a `TypeDef`, `TypeRef` or `TypeSpec`.
pub fn encode_type_token(out: &mut Vec<u8>, token: Token) -> Result<()> {
    let tag = match token.table_id() {
        Some(TableId::TypeDef) => 0,
        Some(TableId::TypeRef) => 1,
        Some(TableId::TypeSpec) => 2,
        _ => return Err(malformed_error!("Token {} is not a type", token)),
    };

    push_compressed_uint(out, (token.row() << 2) | tag)
}

/// Encode a `CLASS <token>` type.
///
/// # Errors
/// See [`encode_type_token`].
pub fn class_type(token: Token) -> Result<Vec<u8>> {
    let mut out = vec![ELEMENT_TYPE::CLASS];
    encode_type_token(&mut out, token)?;
    Ok(out)
}

/// Encode a `VALUETYPE <token>` type.
///
/// # Errors
/// See [`encode_type_token`].
pub fn value_type(token: Token) -> Result<Vec<u8>> {
    let mut out = vec![ELEMENT_TYPE::VALUETYPE];
    encode_type_token(&mut out, token)?;
    Ok(out)
}

/// Consume one complete type (with leading modifiers) and return its encoded bytes.
fn read_type<'a>(parser: &mut Parser<'a>) -> Result<&'a [u8]> {
    let start = parser.pos();
    skip_type(parser)?;
    Ok(&parser.data()[start..parser.pos()])
}

fn skip_type(parser: &mut Parser) -> Result<()> {
    let element = parser.read_le::<u8>()?;
    match element {
        ELEMENT_TYPE::CMOD_REQD | ELEMENT_TYPE::CMOD_OPT => {
            parser.read_compressed_token()?;
            skip_type(parser)
        }
        ELEMENT_TYPE::SENTINEL | ELEMENT_TYPE::PINNED => skip_type(parser),
        ELEMENT_TYPE::VOID..=ELEMENT_TYPE::STRING
        | ELEMENT_TYPE::TYPEDBYREF
        | ELEMENT_TYPE::I
        | ELEMENT_TYPE::U
        | ELEMENT_TYPE::OBJECT => Ok(()),
        ELEMENT_TYPE::PTR | ELEMENT_TYPE::BYREF | ELEMENT_TYPE::SZARRAY => skip_type(parser),
        ELEMENT_TYPE::VALUETYPE | ELEMENT_TYPE::CLASS => {
            parser.read_compressed_token()?;
            Ok(())
        }
        ELEMENT_TYPE::VAR | ELEMENT_TYPE::MVAR => {
            parser.read_compressed_uint()?;
            Ok(())
        }
        ELEMENT_TYPE::ARRAY => {
            skip_type(parser)?;
            parser.read_compressed_uint()?;
            let sizes = parser.read_compressed_uint()?;
            for _ in 0..sizes {
                parser.read_compressed_uint()?;
            }
            let bounds = parser.read_compressed_uint()?;
            for _ in 0..bounds {
                parser.read_compressed_uint()?;
            }
            Ok(())
        }
        ELEMENT_TYPE::GENERICINST => {
            skip_type(parser)?;
            let count = parser.read_compressed_uint()?;
            for _ in 0..count {
                skip_type(parser)?;
            }
            Ok(())
        }
        ELEMENT_TYPE::FNPTR => {
            let calling_convention = parser.read_le::<u8>()?;
            if calling_convention & GENERIC != 0 {
                parser.read_compressed_uint()?;
            }
            let count = parser.read_compressed_uint()?;
            for _ in 0..=count {
                skip_type(parser)?;
            }
            Ok(())
        }
        other => Err(malformed_error!("Unsupported ELEMENT_TYPE - {:#04x}", other)),
    }
}
