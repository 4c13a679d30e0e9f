//! Helper functions for creating and parsing byte sizes.
use super::umem;
use crate::error::{Error, ErrorKind, ErrorOrigin, Result};

/// Returns a umem representing the length in bytes from the given number of kilobytes.
pub const fn kb(kb: umem) -> umem {
    kb * 1024
}

/// Returns a umem representing the length in bytes from the given number of megabytes.
pub const fn mb(mb: umem) -> umem {
    kb(mb) * 1024
}

/// Returns a umem representing the length in bytes from the given number of gigabytes.
pub const fn gb(gb: umem) -> umem {
    mb(gb) * 1024
}

/// Parses a size string such as `16m`, `0x1000` or `2G`.
///
/// The number is read as hex when prefixed with `0x`, decimal otherwise. An optional `k`, `m` or
/// `g` suffix (case insensitive) multiplies the value.
pub fn parse_size(input: &str) -> Result<umem> {
    let input = input.trim();
    let err = || Error(ErrorOrigin::Args, ErrorKind::InvalidMemorySize);

    let (num, mul) = match input.char_indices().last() {
        Some((idx, c)) if c.eq_ignore_ascii_case(&'k') => (&input[..idx], kb(1)),
        Some((idx, c)) if c.eq_ignore_ascii_case(&'m') => (&input[..idx], mb(1)),
        Some((idx, c)) if c.eq_ignore_ascii_case(&'g') => (&input[..idx], gb(1)),
        Some(_) => (input, 1),
        None => return Err(err()),
    };

    let value = if let Some(hex) = num.strip_prefix("0x").or_else(|| num.strip_prefix("0X")) {
        umem::from_str_radix(hex, 16)
    } else {
        num.parse::<umem>()
    }
    .map_err(|_| err())?;

    value.checked_mul(mul).ok_or_else(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from() {
        assert_eq!(kb(20), 20480);
        assert_eq!(mb(20), 20_971_520);
        assert_eq!(gb(20), 21_474_836_480);
    }

    #[test]
    fn parse() {
        assert_eq!(parse_size("4096"), Ok(4096));
        assert_eq!(parse_size("0x1000"), Ok(0x1000));
        assert_eq!(parse_size("16m"), Ok(mb(16)));
        assert_eq!(parse_size("2G"), Ok(gb(2)));
        assert_eq!(parse_size(" 0x10k "), Ok(kb(16)));
    }

    #[test]
    fn parse_invalid() {
        assert!(parse_size("").is_err());
        assert!(parse_size("m").is_err());
        assert!(parse_size("12q").is_err());
        assert!(parse_size("0xzz").is_err());
        assert!(parse_size("ffffffffffffffffg").is_err());
    }
}
