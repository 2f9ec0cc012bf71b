//! Deposit memo wire codec.
//!
//! A valid deposit memo is the UTF-8 encoding of the 64-character lowercase
//! hex recipient hash, optionally `0x`-prefixed. Anything else marks the
//! deposit unclaimable.

use miden_objects::Word;

/// Encode a recipient hash as the memo attached to the source-chain deposit.
pub fn encode_deposit_memo(recipient_hash: &Word) -> String {
    recipient_hash.to_hex()
}

/// Parse a deposit memo into a recipient hash.
///
/// Returns `None` for any memo that is not exactly the 32-byte hex shape,
/// including hex whose limbs are not valid field elements.
pub fn parse_deposit_memo(memo: &str) -> Option<Word> {
    let trimmed = memo.trim();
    let hex_str = trimmed.strip_prefix("0x").unwrap_or(trimmed);

    if hex_str.len() != 64 {
        return None;
    }
    if !hex_str
        .chars()
        .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
    {
        return None;
    }

    Word::try_from(format!("0x{hex_str}").as_str()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH_HEX: &str = "33de110b5f9b695a98f1539a5f83325602fa559b816990d814224a53eea2f7c5";

    #[test]
    fn parses_with_and_without_prefix() {
        let a = parse_deposit_memo(HASH_HEX).unwrap();
        let b = parse_deposit_memo(&format!("0x{HASH_HEX}")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn round_trips_through_encode() {
        let word = parse_deposit_memo(HASH_HEX).unwrap();
        let memo = encode_deposit_memo(&word);
        assert_eq!(parse_deposit_memo(&memo).unwrap(), word);
    }

    #[test]
    fn rejects_malformed_memos() {
        assert!(parse_deposit_memo("hello").is_none());
        assert!(parse_deposit_memo("").is_none());
        assert!(parse_deposit_memo(&HASH_HEX[..62]).is_none());
        assert!(parse_deposit_memo(&format!("{HASH_HEX}00")).is_none());
        // uppercase hex is not the wire shape
        assert!(parse_deposit_memo(&HASH_HEX.to_uppercase()).is_none());
    }
}
