/// A ring position derived from a byte string by IEEE-polynomial CRC32.
///
/// The empty string always hashes to token `0`, which matters for the ring
/// wrap-around rule used by [`crate::resolver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Token(pub u32);

impl Token {
    /// # Test
    ///
    /// ```
    /// use fabric_core::token::Token;
    ///
    /// assert_eq!(Token::hash(""), Token(0));
    /// assert_eq!(Token::hash("/ping"), Token(crc32fast::hash(b"/ping")));
    /// ```
    pub fn hash(bytes: impl AsRef<[u8]>) -> Self {
        let bytes = bytes.as_ref();
        if bytes.is_empty() {
            return Self(0);
        }

        Self(crc32fast::hash(bytes))
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_hashes_to_zero() {
        assert_eq!(Token::hash(""), Token(0));
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(Token::hash("/alpha"), Token::hash("/alpha"));
        assert_ne!(Token::hash("/alpha"), Token::hash("/zulu"));
    }
}
