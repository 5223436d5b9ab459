//! Deep link payload codec.
//!
//! Payloads are `get-<A>` or `get-<A>-<B>` where each number is
//! `message_id * |channel_id|`, wrapped in URL-safe base64 without padding
//! so message IDs are not readable in shared links.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use thiserror::Error;

/// Longest range a single link may expand to.
pub const MAX_RANGE_LEN: u64 = 10_000;

/// Errors from decoding or interpreting a link payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("payload is not valid base64")]
    InvalidEncoding,

    #[error("payload is not a get- link")]
    Malformed,

    #[error("channel id must be non-zero")]
    ZeroChannel,

    #[error("message id out of range")]
    Overflow,

    #[error("range of {0} messages is too large")]
    RangeTooLarge(u64),
}

/// Encode a plaintext payload into an opaque token.
pub fn encode(plaintext: &str) -> String {
    URL_SAFE_NO_PAD.encode(plaintext.as_bytes())
}

/// Decode a token back into its plaintext payload.
///
/// Accepts tokens with or without trailing `=` padding.
pub fn decode(token: &str) -> Result<String, LinkError> {
    let trimmed = token.trim().trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed)
        .map_err(|_| LinkError::InvalidEncoding)?;
    String::from_utf8(bytes).map_err(|_| LinkError::InvalidEncoding)
}

/// A decoded `get-` payload, still in channel-keyed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPayload {
    Single(i64),
    Range(i64, i64),
}

impl LinkPayload {
    /// Build a payload for one message of the channel.
    pub fn single(message_id: i32, channel_id: i64) -> Result<Self, LinkError> {
        Ok(Self::Single(key(message_id, channel_id)?))
    }

    /// Build a payload covering `first..=last` (either direction).
    ///
    /// Collapses to a single link when both ends are the same message.
    pub fn range(first: i32, last: i32, channel_id: i64) -> Result<Self, LinkError> {
        if first == last {
            return Self::single(first, channel_id);
        }
        Ok(Self::Range(key(first, channel_id)?, key(last, channel_id)?))
    }

    /// Parse the plaintext grammar `get-<int>` / `get-<int>-<int>`.
    pub fn parse(plaintext: &str) -> Result<Self, LinkError> {
        let rest = plaintext.strip_prefix("get-").ok_or(LinkError::Malformed)?;
        let parts: Vec<&str> = rest.split('-').collect();
        let num = |s: &str| s.parse::<i64>().map_err(|_| LinkError::Malformed);

        match parts.as_slice() {
            [a] => Ok(Self::Single(num(a)?)),
            [a, b] => Ok(Self::Range(num(a)?, num(b)?)),
            _ => Err(LinkError::Malformed),
        }
    }

    /// Decode a token straight into a payload.
    pub fn from_token(token: &str) -> Result<Self, LinkError> {
        Self::parse(&decode(token)?)
    }

    /// Render back to the plaintext grammar.
    pub fn to_plaintext(&self) -> String {
        match self {
            Self::Single(a) => format!("get-{}", a),
            Self::Range(a, b) => format!("get-{}-{}", a, b),
        }
    }

    /// Encode into a deep link token.
    pub fn to_token(&self) -> String {
        encode(&self.to_plaintext())
    }

    /// Recover the message IDs this payload addresses, in link order.
    pub fn message_ids(&self, channel_id: i64) -> Result<Vec<i32>, LinkError> {
        match *self {
            Self::Single(a) => Ok(vec![unkey(a, channel_id)?]),
            Self::Range(a, b) => {
                let first = unkey(a, channel_id)?;
                let last = unkey(b, channel_id)?;
                let len = u64::from(first.abs_diff(last)) + 1;
                if len > MAX_RANGE_LEN {
                    return Err(LinkError::RangeTooLarge(len));
                }
                if first <= last {
                    Ok((first..=last).collect())
                } else {
                    Ok((last..=first).rev().collect())
                }
            }
        }
    }
}

/// Build `https://t.me/<bot>?start=<token>`.
pub fn deep_link(bot_username: &str, payload: &LinkPayload) -> String {
    format!("https://t.me/{}?start={}", bot_username, payload.to_token())
}

fn key(message_id: i32, channel_id: i64) -> Result<i64, LinkError> {
    if channel_id == 0 {
        return Err(LinkError::ZeroChannel);
    }
    i64::from(message_id)
        .checked_mul(channel_id.checked_abs().ok_or(LinkError::Overflow)?)
        .ok_or(LinkError::Overflow)
}

fn unkey(value: i64, channel_id: i64) -> Result<i32, LinkError> {
    if channel_id == 0 {
        return Err(LinkError::ZeroChannel);
    }
    let divisor = channel_id.checked_abs().ok_or(LinkError::Overflow)?;
    i32::try_from(value / divisor).map_err(|_| LinkError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_plaintexts() {
        for p in ["get-1", "get-42000", "get-5000-10000", "get-10000-5000"] {
            assert_eq!(decode(&encode(p)).unwrap(), p);
        }
    }

    #[test]
    fn test_token_has_no_padding() {
        let token = encode("get-1");
        assert!(!token.contains('='));
        assert!(!token.contains('+') && !token.contains('/'));
    }

    #[test]
    fn test_decode_accepts_padding() {
        let padded = base64::engine::general_purpose::URL_SAFE.encode("get-7");
        assert_eq!(decode(&padded).unwrap(), "get-7");
    }

    #[test]
    fn test_single_message_scenario() {
        let payload = LinkPayload::single(42, -1000).unwrap();
        assert_eq!(payload.to_plaintext(), "get-42000");

        let back = LinkPayload::from_token(&payload.to_token()).unwrap();
        assert_eq!(back.message_ids(-1000).unwrap(), vec![42]);
    }

    #[test]
    fn test_range_scenario() {
        let payload = LinkPayload::range(10, 20, 500).unwrap();
        let token = payload.to_token();
        assert_eq!(decode(&token).unwrap(), "get-5000-10000");

        let ids = LinkPayload::from_token(&token).unwrap().message_ids(500).unwrap();
        assert_eq!(ids, (10..=20).collect::<Vec<_>>());
    }

    #[test]
    fn test_descending_range() {
        let payload = LinkPayload::range(5, 2, -100).unwrap();
        assert_eq!(payload.message_ids(-100).unwrap(), vec![5, 4, 3, 2]);
    }

    #[test]
    fn test_equal_ends_collapse_to_single() {
        let payload = LinkPayload::range(9, 9, -77).unwrap();
        assert_eq!(payload, LinkPayload::Single(9 * 77));
    }

    #[test]
    fn test_recovers_ids_for_large_channel() {
        let channel = -1_001_234_567_890_i64;
        for id in [1, 17, 999_999, 9_000_000] {
            let payload = LinkPayload::single(id, channel).unwrap();
            assert_eq!(payload.message_ids(channel).unwrap(), vec![id]);
        }
    }

    #[test]
    fn test_overflow_is_an_error() {
        assert_eq!(
            LinkPayload::single(i32::MAX, -1_001_234_567_890),
            Err(LinkError::Overflow)
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(LinkPayload::from_token("!!!"), Err(LinkError::InvalidEncoding));
        assert_eq!(LinkPayload::parse("foo-1"), Err(LinkError::Malformed));
        assert_eq!(LinkPayload::parse("get-"), Err(LinkError::Malformed));
        assert_eq!(LinkPayload::parse("get-1-2-3"), Err(LinkError::Malformed));
        assert_eq!(LinkPayload::parse("get-x"), Err(LinkError::Malformed));
        // Valid base64 of something that is not a payload.
        assert_eq!(LinkPayload::from_token(&encode("hello")), Err(LinkError::Malformed));
    }

    #[test]
    fn test_zero_channel() {
        assert_eq!(LinkPayload::single(1, 0), Err(LinkError::ZeroChannel));
        assert_eq!(LinkPayload::Single(5).message_ids(0), Err(LinkError::ZeroChannel));
    }

    #[test]
    fn test_range_too_large() {
        let payload = LinkPayload::range(1, 20_001, 3).unwrap();
        assert!(matches!(payload.message_ids(3), Err(LinkError::RangeTooLarge(20_001))));
    }

    #[test]
    fn test_deep_link() {
        let payload = LinkPayload::Single(42000);
        let link = deep_link("vault_bot", &payload);
        assert_eq!(link, format!("https://t.me/vault_bot?start={}", encode("get-42000")));
    }
}
