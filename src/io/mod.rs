//! Byte-source layer.
//!
//! Resolving URIs and fetching bytes from network, disk or bundled assets is
//! the job of the surrounding system. The decode core only needs a re-openable
//! byte source, described by [`ByteSource`]. Two simple implementations are
//! provided for local use and tests.

mod source;

pub use source::{ByteSource, FileSource, MemorySource};
