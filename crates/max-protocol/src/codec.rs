// SPDX-License-Identifier: MIT OR Apache-2.0
//! Batch JSONL encode/decode helpers, mainly useful for tests and replay
//! tooling that work with a whole transcript at once.

use crate::{JsonlCodec, ProtocolError};
use serde::{Deserialize, Serialize};

/// Batch JSONL encoder/decoder over a generic message type.
#[derive(Debug, Clone, Copy)]
pub struct StreamingCodec;

impl StreamingCodec {
    /// Encode multiple messages into a single JSONL string.
    #[must_use]
    pub fn encode_batch<T: Serialize>(messages: &[T]) -> String {
        let mut out = String::new();
        for msg in messages {
            if let Ok(line) = JsonlCodec::encode(msg) {
                out.push_str(&line);
            }
        }
        out
    }

    /// Decode a JSONL string into a vec of results, one per non-blank line.
    pub fn decode_batch<T: for<'de> Deserialize<'de>>(input: &str) -> Vec<Result<T, ProtocolError>> {
        input
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| JsonlCodec::decode(l.trim()))
            .collect()
    }

    /// Count the number of non-blank lines in a JSONL string.
    #[must_use]
    pub fn line_count(input: &str) -> usize {
        input.lines().filter(|l| !l.trim().is_empty()).count()
    }
}
