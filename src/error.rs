//! Canonical error enumeration shared by every module in this crate.

/// Errors returned by the packet-framing, front-end DSP and frame-sizing
/// routines.
///
/// Each variant carries the same encoded integer the reference Opus API
/// uses for its `OPUS_*` error codes, obtainable through [`OpusError::code`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpusError {
    /// No error.
    Success,
    /// One or more invalid/out of range arguments.
    BadArg,
    /// The mode struct passed is invalid.
    BufferTooSmall,
    /// An internal error was detected.
    Internal,
    /// The compressed data passed is corrupted.
    InvalidPacket,
    /// Invalid/unsupported request number.
    Unimplemented,
    /// An encoder or decoder structure is invalid or already freed.
    InvalidState,
    /// Memory allocation has failed.
    AllocFailed,
}

impl OpusError {
    /// Returns the canonical encoded integer for this error, matching the
    /// reference Opus `OPUS_*` codes (`0` for success, negative otherwise).
    #[inline]
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            OpusError::Success => 0,
            OpusError::BadArg => -1,
            OpusError::BufferTooSmall => -2,
            OpusError::Internal => -3,
            OpusError::InvalidPacket => -4,
            OpusError::Unimplemented => -5,
            OpusError::InvalidState => -6,
            OpusError::AllocFailed => -7,
        }
    }

    /// Looks up the error whose [`code`](OpusError::code) matches `code`,
    /// or `None` if it does not correspond to any known error.
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(OpusError::Success),
            -1 => Some(OpusError::BadArg),
            -2 => Some(OpusError::BufferTooSmall),
            -3 => Some(OpusError::Internal),
            -4 => Some(OpusError::InvalidPacket),
            -5 => Some(OpusError::Unimplemented),
            -6 => Some(OpusError::InvalidState),
            -7 => Some(OpusError::AllocFailed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OpusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(strerror(self.code()))
    }
}

impl std::error::Error for OpusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// Returns the lower-case, human readable string for an encoded error
/// `code` (see [`OpusError::code`]).
///
/// Unrecognized codes map to `"unknown error"`, matching the reference
/// `opus_strerror` behaviour.
#[must_use]
pub fn strerror(code: i32) -> &'static str {
    match OpusError::from_code(code) {
        Some(OpusError::Success) => "success",
        Some(OpusError::BadArg) => "bad argument",
        Some(OpusError::BufferTooSmall) => "buffer too small",
        Some(OpusError::Internal) => "internal error",
        Some(OpusError::InvalidPacket) => "invalid packet",
        Some(OpusError::Unimplemented) => "unimplemented",
        Some(OpusError::InvalidState) => "invalid state",
        Some(OpusError::AllocFailed) => "memory allocation failed",
        None => "unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_round_trips() {
        let all = [
            OpusError::Success,
            OpusError::BadArg,
            OpusError::BufferTooSmall,
            OpusError::Internal,
            OpusError::InvalidPacket,
            OpusError::Unimplemented,
            OpusError::InvalidState,
            OpusError::AllocFailed,
        ];
        for err in all {
            assert_eq!(OpusError::from_code(err.code()), Some(err));
        }
    }

    #[test]
    fn codes_match_reference_values() {
        assert_eq!(OpusError::Success.code(), 0);
        assert_eq!(OpusError::BadArg.code(), -1);
        assert_eq!(OpusError::BufferTooSmall.code(), -2);
        assert_eq!(OpusError::Internal.code(), -3);
        assert_eq!(OpusError::InvalidPacket.code(), -4);
        assert_eq!(OpusError::Unimplemented.code(), -5);
        assert_eq!(OpusError::InvalidState.code(), -6);
        assert_eq!(OpusError::AllocFailed.code(), -7);
    }

    #[test]
    fn unknown_code_reports_unknown_error() {
        assert_eq!(strerror(42), "unknown error");
        assert_eq!(strerror(-100), "unknown error");
    }

    #[test]
    fn strerror_is_lower_case() {
        for code in -7..=0 {
            assert!(strerror(code).chars().all(|c| !c.is_uppercase()));
        }
    }
}
