//! Destination Address Validation
//!
//! Per-currency format rules for payout addresses. These are syntactic checks
//! only: an address that matches its pattern may still carry a bad checksum,
//! belong to another network, or be unspendable. Callers must not treat a
//! passing result as proof that funds will arrive.

use crate::types::Currency;

/// Base58 alphabet (no 0, O, I, l)
const BASE58: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Validate `address` for a currency symbol. Unknown symbols are rejected.
pub fn validate(address: &str, currency: &str) -> bool {
    currency
        .parse::<Currency>()
        .map(|c| is_valid_address(address, c))
        .unwrap_or(false)
}

/// Validate `address` against the pattern for `currency`
pub fn is_valid_address(address: &str, currency: Currency) -> bool {
    match currency {
        Currency::Btc => prefixed_body(address, &["bc1", "1", "3"], 25, 39, is_btc_char),
        Currency::Eth => is_eth_address(address),
        Currency::Usdt | Currency::Trx => is_tron_address(address),
        Currency::Ltc => prefixed_body(address, &["ltc1", "L", "M", "3"], 25, 39, is_btc_char),
        Currency::Doge => is_doge_address(address),
    }
}

/// `[a-zA-HJ-NP-Z0-9]`: lowercase is unrestricted, uppercase drops I and O
fn is_btc_char(c: char) -> bool {
    c.is_ascii_digit() || c.is_ascii_lowercase() || (c.is_ascii_uppercase() && c != 'I' && c != 'O')
}

/// Any of `prefixes` followed by `min..=max` characters accepted by `valid`
fn prefixed_body(
    address: &str,
    prefixes: &[&str],
    min: usize,
    max: usize,
    valid: fn(char) -> bool,
) -> bool {
    prefixes.iter().any(|prefix| {
        address.strip_prefix(prefix).map_or(false, |body| {
            (min..=max).contains(&body.len()) && body.chars().all(valid)
        })
    })
}

/// `0x` followed by 40 hex digits
fn is_eth_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(body) => body.len() == 40 && hex::decode(body).is_ok(),
        None => false,
    }
}

/// `T` followed by 33 characters of `[A-Za-z1-9]`
fn is_tron_address(address: &str) -> bool {
    prefixed_body(address, &["T"], 33, 33, |c| {
        c.is_ascii_alphabetic() || ('1'..='9').contains(&c)
    })
}

/// `D`, a version character in `[5-9A-HJ-NP-U]`, then 32 base58 characters
fn is_doge_address(address: &str) -> bool {
    let mut chars = address.chars();
    if chars.next() != Some('D') {
        return false;
    }

    match chars.next() {
        Some(c) if ('5'..='9').contains(&c) || (('A'..='U').contains(&c) && c != 'I' && c != 'O') => {}
        _ => return false,
    }

    let rest = chars.as_str();
    rest.len() == 32 && rest.chars().all(|c| BASE58.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_samples() {
        assert!(validate("bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh", "BTC"));
        assert!(validate("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2", "BTC"));
        assert!(validate("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy", "BTC"));
        assert!(validate("0x742d35Cc6634C0532925a3b844Bc454e4438f44e", "ETH"));
        assert!(validate("TLa2f6VPqDgRE67v1736s7bJ8Ray5wYjU7", "TRX"));
        assert!(validate("TLa2f6VPqDgRE67v1736s7bJ8Ray5wYjU7", "USDT"));
        assert!(validate("LdP8Qox1VAhCzLJNqrr74YovaWYyNBUWvL", "LTC"));
        assert!(validate("ltc1qg82mv2g3l9ka3u5wlfsrdd3qde5p5tvnv2q5xp", "LTC"));
        assert!(validate("DH5yaieqoZN36fDVciNyRueRGvGLR3mr7L", "DOGE"));
    }

    #[test]
    fn test_malformed_rejected() {
        // Wrong prefix
        assert!(!validate("2BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2", "BTC"));
        // Too short
        assert!(!validate("bc1qxy2k", "BTC"));
        // Too long
        assert!(!validate(&format!("bc1{}", "q".repeat(40)), "BTC"));
        // Forbidden uppercase letter
        assert!(!validate("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVNO", "BTC"));

        assert!(!validate("not_an_address", "ETH"));
        assert!(!validate("742d35Cc6634C0532925a3b844Bc454e4438f44e", "ETH"));
        assert!(!validate("0x742d35Cc6634C0532925a3b844Bc454e4438f44", "ETH"));
        assert!(!validate("0x742d35Cc6634C0532925a3b844Bc454e4438f44g", "ETH"));

        assert!(!validate("XLa2f6VPqDgRE67v1736s7bJ8Ray5wYjU7", "TRX"));
        assert!(!validate("TLa2f6VPqDgRE67v1736s7bJ8Ray5wYjU", "USDT"));
        assert!(!validate("TLa2f6VPqDgRE67v1736s7bJ8Ray5wYj0U", "TRX"));

        assert!(!validate("XdP8Qox1VAhCzLJNqrr74YovaWYyNBUWvL", "LTC"));
        assert!(!validate("D05yaieqoZN36fDVciNyRueRGvGLR3mr7L", "DOGE"));
        assert!(!validate("DH5yaieqoZN36fDVciNyRueRGvGLR3mr7", "DOGE"));
    }

    #[test]
    fn test_unknown_currency_rejected() {
        assert!(!validate("bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh", "XMR"));
        assert!(!validate("", "BTC"));
    }

    #[test]
    fn test_currency_specific() {
        // An ETH address is not a BTC address and vice versa
        assert!(!validate("0x742d35Cc6634C0532925a3b844Bc454e4438f44e", "BTC"));
        assert!(!validate("bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh", "ETH"));
    }
}
