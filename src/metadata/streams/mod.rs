//! Metadata streams.
//!
//! - [`Strings`] - the `#Strings` identifier heap
//! - [`Blob`] - the `#Blob` heap of signatures and attribute values
//! - [`TablesStream`] - the `#~` tables stream
//! - [`StreamHeader`] - the per-stream directory entries of the metadata root
//!
//! `#GUID` and `#US` are carried through unchanged as raw bytes.

mod blob;
mod streamheader;
mod strings;
mod tablesheader;

pub use blob::Blob;
pub use streamheader::StreamHeader;
pub use strings::Strings;
pub use tablesheader::TablesStream;
