use thiserror::Error;

use crate::decode::ExifOrientation;

/// I/O errors that can occur when opening a byte source
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Source does not exist
    #[error("Source not found: {0}")]
    NotFound(String),

    /// Reading the source failed
    #[error("Read error for {source_id}: {message}")]
    Read { source_id: String, message: String },

    /// Source opened but contained no bytes
    #[error("Source is empty: {0}")]
    Empty(String),
}

/// Errors reported by a platform decoder.
///
/// A decoder must distinguish at least stream failures, unsupported formats,
/// reuse-buffer mismatches and allocation failures so the pipeline can decide
/// whether a retry without buffer reuse is worthwhile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// The byte stream could not be read
    #[error("Stream error: {0}")]
    Stream(String),

    /// The image format is not recognized or not decodable
    #[error("Unsupported format: {0}")]
    FormatUnsupported(String),

    /// The supplied reuse buffer cannot hold the decoded pixels
    #[error("Reuse buffer mismatch: {0}")]
    BufferMismatch(String),

    /// Pixel memory could not be allocated
    #[error("Out of memory: requested {requested} bytes")]
    OutOfMemory { requested: usize },

    /// The stream is recognized but its content is corrupt
    #[error("Malformed image data: {0}")]
    Malformed(String),
}

impl PlatformError {
    /// Whether the failure may have been caused by the supplied reuse buffer.
    ///
    /// Allocation failures count as well: the reuse buffer itself may be the
    /// reason the decoder ran out of memory.
    pub fn implicates_reuse_buffer(&self) -> bool {
        matches!(
            self,
            PlatformError::BufferMismatch(_) | PlatformError::OutOfMemory { .. }
        )
    }
}

/// Coarse classification of [`DecodeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeErrorKind {
    BoundsUnreadable,
    DecodeFailed,
    InvalidResult,
    CorrectOrientationFailed,
    Cancelled,
}

/// Terminal errors of a single decode request.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// Bounds could not be read without materializing pixels
    #[error("Bounds unreadable for {source_id}: {message}")]
    BoundsUnreadable { source_id: String, message: String },

    /// Pixel decoding failed (possibly after the single retry without reuse)
    #[error("Decode failed for {source_id} (retried: {retried}): {cause}")]
    DecodeFailed {
        source_id: String,
        retried: bool,
        #[source]
        cause: PlatformError,
    },

    /// The decoder produced a recycled or degenerate buffer
    #[error("Invalid decode result for {source_id}: {reason}")]
    InvalidResult { source_id: String, reason: String },

    /// The buffer was recycled while orientation correction was running
    #[error("Orientation correction failed for {source_id}: buffer recycled (orientation {orientation})")]
    CorrectOrientationFailed {
        source_id: String,
        orientation: ExifOrientation,
    },

    /// The owner cancelled the request
    #[error("Decode cancelled for {source_id}")]
    Cancelled { source_id: String },
}

impl DecodeError {
    pub fn kind(&self) -> DecodeErrorKind {
        match self {
            DecodeError::BoundsUnreadable { .. } => DecodeErrorKind::BoundsUnreadable,
            DecodeError::DecodeFailed { .. } => DecodeErrorKind::DecodeFailed,
            DecodeError::InvalidResult { .. } => DecodeErrorKind::InvalidResult,
            DecodeError::CorrectOrientationFailed { .. } => {
                DecodeErrorKind::CorrectOrientationFailed
            }
            DecodeError::Cancelled { .. } => DecodeErrorKind::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DecodeError::Cancelled { .. })
    }
}

/// Errors raised while ordering tiles.
///
/// These never reach the caller of `update_tiles`: the coordinator falls back
/// to insertion order and only reports them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileSortError {
    /// The comparator observed inconsistent input
    #[error("Inconsistent tile ordering: {0}")]
    Inconsistent(String),

    /// A tile has an empty source rectangle
    #[error("Degenerate tile rectangle: {0}")]
    DegenerateTile(String),

    /// Sorting panicked (comparator violated total order)
    #[error("Tile sort panicked: {0}")]
    Panicked(String),
}
