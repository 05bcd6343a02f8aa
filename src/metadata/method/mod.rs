//! CIL method bodies (ECMA-335 II.25.4).
//!
//! [`MethodBody`] decodes tiny and fat headers together with their exception handling
//! sections, and always writes bodies back with a fat header so edited code can grow its
//! evaluation stack and code size freely.

mod body;
mod exceptions;

pub use body::{MethodBody, MethodBodyFlags, SectionFlags, TINY_MAX_STACK};
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
