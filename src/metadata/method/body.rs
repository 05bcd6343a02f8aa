use bitflags::bitflags;

use crate::{
    file::parser::Parser,
    metadata::method::{ExceptionHandler, ExceptionHandlerFlags},
    Result,
};

bitflags! {
    /// Method body header flags (ECMA-335 II.25.4.4).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodBodyFlags: u16 {
        /// Tiny header
        const TINY_FORMAT = 0x2;
        /// Fat header
        const FAT_FORMAT = 0x3;
        /// Extra data sections follow the code
        const MORE_SECTS = 0x8;
        /// Locals are zero-initialized
        const INIT_LOCALS = 0x10;
    }
}

bitflags! {
    /// Method data section flags (ECMA-335 II.25.4.5).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u8 {
        /// Exception handling table
        const EHTABLE = 0x1;
        /// Reserved optimization table
        const OPTIL_TABLE = 0x2;
        /// Fat section layout
        const FAT_FORMAT = 0x40;
        /// Another section follows
        const MORE_SECTS = 0x80;
    }
}

/// Default evaluation stack size implied by a tiny header.
pub const TINY_MAX_STACK: u16 = 8;

/// A decoded method body: header fields, raw IL and exception clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBody {
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// `StandAloneSig` token of the locals signature, 0 if there are no locals
    pub local_var_sig_token: u32,
    /// Locals are zero-initialized
    pub init_locals: bool,
    /// The IL byte stream
    pub code: Vec<u8>,
    /// Exception handling clauses
    pub exception_handlers: Vec<ExceptionHandler>,
    /// `true` if the body was read from a fat header
    pub is_fat: bool,
}

impl MethodBody {
    /// Decode a method body from the start of `data`.
    ///
    /// # Errors
    /// Returns an error for an unknown header format or a body that runs past `data`.
    pub fn read(data: &[u8]) -> Result<MethodBody> {
        let mut parser = Parser::new(data);
        let first = parser.peek_byte()?;

        if first & 0x3 == MethodBodyFlags::TINY_FORMAT.bits() as u8 {
            parser.advance_by(1)?;
            let code = parser.read_bytes((first >> 2) as usize)?.to_vec();
            return Ok(MethodBody {
                max_stack: TINY_MAX_STACK,
                local_var_sig_token: 0,
                init_locals: false,
                code,
                exception_handlers: Vec::new(),
                is_fat: false,
            });
        }

        let flags_and_size = parser.read_le::<u16>()?;
        let flags = MethodBodyFlags::from_bits_truncate(flags_and_size & 0x0FFF);
        if flags_and_size & 0x3 != MethodBodyFlags::FAT_FORMAT.bits() {
            return Err(malformed_error!(
                "Invalid method body header - {:#06x}",
                flags_and_size
            ));
        }

        let header_size = usize::from(flags_and_size >> 12) * 4;
        if header_size < 12 {
            return Err(malformed_error!("Fat header too small - {}", header_size));
        }

        let max_stack = parser.read_le::<u16>()?;
        let code_size = parser.read_le::<u32>()? as usize;
        let local_var_sig_token = parser.read_le::<u32>()?;
        parser.seek(header_size)?;
        let code = parser.read_bytes(code_size)?.to_vec();

        let mut exception_handlers = Vec::new();
        let mut more_sections = flags.contains(MethodBodyFlags::MORE_SECTS);
        while more_sections {
            parser.align(4)?;
            let kind = SectionFlags::from_bits_truncate(parser.read_le::<u8>()?);
            let fat = kind.contains(SectionFlags::FAT_FORMAT);

            let data_size = if fat {
                let bytes = parser.read_bytes(3)?;
                u32::from(bytes[0]) | (u32::from(bytes[1]) << 8) | (u32::from(bytes[2]) << 16)
            } else {
                let size = u32::from(parser.read_le::<u8>()?);
                parser.advance_by(2)?;
                size
            } as usize;

            if data_size < 4 {
                return Err(malformed_error!("Method data section too small - {}", data_size));
            }

            if kind.contains(SectionFlags::EHTABLE) {
                let clause_size = if fat { 24 } else { 12 };
                for _ in 0..(data_size - 4) / clause_size {
                    exception_handlers.push(read_clause(&mut parser, fat)?);
                }
            } else {
                parser.advance_by(data_size - 4)?;
            }

            more_sections = kind.contains(SectionFlags::MORE_SECTS);
        }

        Ok(MethodBody {
            max_stack,
            local_var_sig_token,
            init_locals: flags.contains(MethodBodyFlags::INIT_LOCALS),
            code,
            exception_handlers,
            is_fat: true,
        })
    }

    /// Encode the body with a fat header and, if needed, one exception handling section.
    ///
    /// Clauses use the small layout when every clause fits it and the fat layout otherwise.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the code or clause table is too large to encode.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(&self) -> Result<Vec<u8>> {
        let code_size = u32::try_from(self.code.len())
            .map_err(|_| malformed_error!("Method body too large - {}", self.code.len()))?;

        let mut flags = MethodBodyFlags::FAT_FORMAT;
        if self.init_locals {
            flags |= MethodBodyFlags::INIT_LOCALS;
        }
        if !self.exception_handlers.is_empty() {
            flags |= MethodBodyFlags::MORE_SECTS;
        }

        let mut out = Vec::with_capacity(12 + self.code.len());
        out.extend_from_slice(&(flags.bits() | (3 << 12)).to_le_bytes());
        out.extend_from_slice(&self.max_stack.to_le_bytes());
        out.extend_from_slice(&code_size.to_le_bytes());
        out.extend_from_slice(&self.local_var_sig_token.to_le_bytes());
        out.extend_from_slice(&self.code);

        if self.exception_handlers.is_empty() {
            return Ok(out);
        }

        while out.len() % 4 != 0 {
            out.push(0);
        }

        let count = self.exception_handlers.len();
        let small = count * 12 + 4 <= usize::from(u8::MAX)
            && self.exception_handlers.iter().all(ExceptionHandler::fits_small);

        if small {
            out.push(SectionFlags::EHTABLE.bits());
            out.push((count * 12 + 4) as u8);
            out.extend_from_slice(&[0, 0]);
            for clause in &self.exception_handlers {
                out.extend_from_slice(&(clause.flags.bits() as u16).to_le_bytes());
                out.extend_from_slice(&(clause.try_offset as u16).to_le_bytes());
                out.push(clause.try_length as u8);
                out.extend_from_slice(&(clause.handler_offset as u16).to_le_bytes());
                out.push(clause.handler_length as u8);
                out.extend_from_slice(&clause.class_token_or_filter.to_le_bytes());
            }
        } else {
            let data_size = count * 24 + 4;
            if data_size > 0x00FF_FFFF {
                return Err(malformed_error!("Too many exception clauses - {}", count));
            }
            out.push((SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT).bits());
            out.extend_from_slice(&(data_size as u32).to_le_bytes()[..3]);
            for clause in &self.exception_handlers {
                out.extend_from_slice(&clause.flags.bits().to_le_bytes());
                out.extend_from_slice(&clause.try_offset.to_le_bytes());
                out.extend_from_slice(&clause.try_length.to_le_bytes());
                out.extend_from_slice(&clause.handler_offset.to_le_bytes());
                out.extend_from_slice(&clause.handler_length.to_le_bytes());
                out.extend_from_slice(&clause.class_token_or_filter.to_le_bytes());
            }
        }

        Ok(out)
    }
}

fn read_clause(parser: &mut Parser, fat: bool) -> Result<ExceptionHandler> {
    let clause = if fat {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::from_bits_truncate(parser.read_le::<u32>()?),
            try_offset: parser.read_le::<u32>()?,
            try_length: parser.read_le::<u32>()?,
            handler_offset: parser.read_le::<u32>()?,
            handler_length: parser.read_le::<u32>()?,
            class_token_or_filter: parser.read_le::<u32>()?,
        }
    } else {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::from_bits_truncate(u32::from(parser.read_le::<u16>()?)),
            try_offset: u32::from(parser.read_le::<u16>()?),
            try_length: u32::from(parser.read_le::<u8>()?),
            handler_offset: u32::from(parser.read_le::<u16>()?),
            handler_length: u32::from(parser.read_le::<u8>()?),
            class_token_or_filter: parser.read_le::<u32>()?,
        }
    };
    Ok(clause)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny() {
        // 3 bytes of code: ldarg.0, pop, ret
        let data = [0x0E, 0x02, 0x26, 0x2A, 0xFF];
        let body = MethodBody::read(&data).unwrap();
        assert!(!body.is_fat);
        assert_eq!(body.max_stack, TINY_MAX_STACK);
        assert_eq!(body.code, [0x02, 0x26, 0x2A]);
        assert!(body.exception_handlers.is_empty());
    }

    #[test]
    fn fat_with_small_eh_section() {
        #[rustfmt::skip]
        let data = [
            0x1B, 0x30, 0x02, 0x00, 0x06, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x11,
            0x00, 0xDE, 0x01, 0x26, 0xDE, 0x00,
            0x00, 0x00,
            0x01, 0x10, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x03, 0x03, 0x00, 0x02, 0x05, 0x00, 0x00, 0x01,
        ];

        let body = MethodBody::read(&data).unwrap();
        assert!(body.is_fat);
        assert!(body.init_locals);
        assert_eq!(body.max_stack, 2);
        assert_eq!(body.local_var_sig_token, 0x1100_0001);
        assert_eq!(body.code.len(), 6);
        assert_eq!(body.exception_handlers.len(), 1);

        let clause = &body.exception_handlers[0];
        assert_eq!(clause.flags, ExceptionHandlerFlags::EXCEPTION);
        assert_eq!(clause.try_offset, 0);
        assert_eq!(clause.try_length, 3);
        assert_eq!(clause.handler_offset, 3);
        assert_eq!(clause.handler_length, 2);
        assert_eq!(clause.class_token_or_filter, 0x0100_0005);

        assert_eq!(body.write().unwrap(), data);
    }

    #[test]
    fn tiny_is_rewritten_fat() {
        let data = [0x06, 0x2A];
        let body = MethodBody::read(&data).unwrap();
        let written = body.write().unwrap();
        assert_eq!(&written[..2], &[0x03, 0x30]);

        let reread = MethodBody::read(&written).unwrap();
        assert!(reread.is_fat);
        assert_eq!(reread.code, body.code);
        assert_eq!(reread.max_stack, body.max_stack);
    }

    #[test]
    fn large_clauses_use_fat_section() {
        let body = MethodBody {
            max_stack: 1,
            local_var_sig_token: 0,
            init_locals: false,
            code: vec![0x00; 0x200],
            exception_handlers: vec![ExceptionHandler {
                flags: ExceptionHandlerFlags::FINALLY,
                try_offset: 0,
                try_length: 0x100,
                handler_offset: 0x100,
                handler_length: 0x100,
                class_token_or_filter: 0,
            }],
            is_fat: true,
        };

        let written = body.write().unwrap();
        assert_eq!(written[12 + 0x200], 0x41);
        assert_eq!(MethodBody::read(&written).unwrap(), body);
    }

    #[test]
    fn invalid_header() {
        assert!(MethodBody::read(&[0x01]).is_err());
        assert!(MethodBody::read(&[]).is_err());
        // Tiny body claiming more code than available
        assert!(MethodBody::read(&[0x12, 0x00]).is_err());
    }
}
