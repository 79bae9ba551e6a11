use core::fmt;

pub type FrameResult<T> = core::result::Result<T, FrameError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("payload of {size} bytes exceeds the {max} byte frame limit")]
    PayloadTooLarge { size: usize, max: usize },

    /// The payload region is not valid UTF-8. The raw bytes are kept so the
    /// caller can log them.
    #[error("payload is not valid UTF-8 after {valid_up_to} bytes: {}", Hex(.raw))]
    InvalidEncoding { raw: Box<[u8]>, valid_up_to: usize },

    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("incomplete frame: need {needed} bytes, have {available}")]
    Incomplete { needed: usize, available: usize },

    #[error("frame length {length} is shorter than its {header} byte header")]
    ShortFrame { length: usize, header: usize },

    #[error("unsupported API frame type {0:#04x}")]
    UnsupportedFrameType(u8),

    #[error("buffered {size} bytes without a delimiter (limit {max})")]
    Overflow { size: usize, max: usize },
}

impl FrameError {
    /// Whether more input could still turn this into a valid frame.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, FrameError::Incomplete { .. })
    }
}

/// Lowercase hex rendering for byte slices in log lines.
pub struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}
