//! Opaque execution stream token

use std::ffi::c_void;
use std::ptr;

// SAFETY: StreamToken is an opaque handle that is only ever forwarded to the
// runtime, never dereferenced on the host
unsafe impl Send for StreamToken {}
unsafe impl Sync for StreamToken {}

/// Ordering token passed through to allocate/free calls.
///
/// Buffers do not interpret the token. A null token is the runtime's default
/// (legacy) stream. The token does not own the stream; the caller keeps the
/// stream alive for as long as tokens derived from it are in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamToken(*mut c_void);

impl StreamToken {
    /// The runtime's default stream
    pub const DEFAULT: StreamToken = StreamToken(ptr::null_mut());

    /// Wrap a raw stream handle (e.g. a `hipStream_t` owned elsewhere)
    pub fn from_raw(stream: *mut c_void) -> Self {
        StreamToken(stream)
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.0
    }

    pub fn is_default(&self) -> bool {
        self.0.is_null()
    }
}

impl Default for StreamToken {
    fn default() -> Self {
        StreamToken::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_token_is_null() {
        assert!(StreamToken::DEFAULT.is_default());
        assert!(StreamToken::default().as_raw().is_null());
    }

    #[test]
    fn test_raw_round_trip() {
        let raw = 0x1000usize as *mut c_void;
        let token = StreamToken::from_raw(raw);
        assert!(!token.is_default());
        assert_eq!(token.as_raw(), raw);
        assert_ne!(token, StreamToken::DEFAULT);
    }
}
