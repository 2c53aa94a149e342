//! Incremental UTF-8 decoding for chunked response bodies.
//!
//! The transport delivers byte chunks at arbitrary boundaries, so a
//! multi-byte code point can be split across two chunks. The decoder keeps
//! the incomplete tail buffered and emits only whole characters.

use thiserror::Error;

/// Errors from incremental UTF-8 decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The body contains a byte sequence that is not valid UTF-8.
    #[error("invalid UTF-8 in response body at byte {position}")]
    Invalid {
        /// Offset of the offending byte within the buffered input.
        position: usize,
    },

    /// The body ended in the middle of a multi-byte code point.
    #[error("response body truncated mid code point ({dangling} dangling bytes)")]
    Truncated {
        /// Number of buffered bytes with no completing continuation.
        dangling: usize,
    },
}

/// Streaming UTF-8 decoder with carry-over for split code points.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a byte chunk and return the text decoded so far.
    ///
    /// An incomplete trailing code point is buffered until the next chunk
    /// completes it; the returned string may therefore be empty.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Invalid`] when the input can never become
    /// valid UTF-8, regardless of future chunks.
    pub fn push(&mut self, bytes: &[u8]) -> Result<String, DecodeError> {
        self.pending.extend_from_slice(bytes);

        let valid_len = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // error_len() of None marks an incomplete trailing sequence.
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                return Err(DecodeError::Invalid {
                    position: e.valid_up_to(),
                })
            }
        };

        let rest = self.pending.split_off(valid_len);
        let complete = std::mem::replace(&mut self.pending, rest);
        // valid_len is a char boundary, so this cannot fail.
        String::from_utf8(complete).map_err(|e| DecodeError::Invalid {
            position: e.utf8_error().valid_up_to(),
        })
    }

    /// Assert that no partial code point remains buffered.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] when the stream ended mid code
    /// point.
    pub fn finish(&self) -> Result<(), DecodeError> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::Truncated {
                dangling: self.pending.len(),
            })
        }
    }
}
