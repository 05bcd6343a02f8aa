//! Exception handling clauses of CIL method bodies (ECMA-335 II.25.4.6).

use bitflags::bitflags;

bitflags! {
    /// Kind of an exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u32 {
        /// A typed catch clause
        const EXCEPTION = 0x0000;
        /// An exception filter
        const FILTER = 0x0001;
        /// A finally clause
        const FINALLY = 0x0002;
        /// A fault clause
        const FAULT = 0x0004;
    }
}

/// One clause of a method's exception handling table, with byte offsets into the IL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Clause kind
    pub flags: ExceptionHandlerFlags,
    /// Start of the protected region
    pub try_offset: u32,
    /// Length of the protected region
    pub try_length: u32,
    /// Start of the handler
    pub handler_offset: u32,
    /// Length of the handler
    pub handler_length: u32,
    /// Catch type token, or the filter's start offset for [`ExceptionHandlerFlags::FILTER`]
    pub class_token_or_filter: u32,
}

impl ExceptionHandler {
    /// Returns `true` if the clause is representable in the small section format.
    #[must_use]
    pub fn fits_small(&self) -> bool {
        self.try_offset <= u32::from(u16::MAX)
            && self.try_length <= u32::from(u8::MAX)
            && self.handler_offset <= u32::from(u16::MAX)
            && self.handler_length <= u32::from(u8::MAX)
            && self.flags.bits() <= u32::from(u16::MAX)
    }

    /// Returns `true` for filter clauses, whose last field is an IL offset.
    #[must_use]
    pub fn is_filter(&self) -> bool {
        self.flags.contains(ExceptionHandlerFlags::FILTER)
    }
}
