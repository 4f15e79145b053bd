//! Message-matching patterns for the receive buffer search API
//!
//! The device matches candidate messages server-side against a limited
//! glob-style expression applied to the printable (or hex-decoded)
//! representation of each message:
//!
//! - `*` matches any run of characters (including none)
//! - `?` matches exactly one character
//! - `[abc]` matches one character out of the listed set
//! - an empty pattern matches every message
//!
//! Matching is ASCII case-insensitive, since binary protocols are compared
//! through their hexadecimal text form.
//!
//! [`MessagePattern`] is the typed representation; [`MessagePattern::modbus`]
//! derives the reply-matching expression for a MODBUS exchange as a pure
//! function of `(slave, function)`, so the nibble arithmetic lives in exactly
//! one place. The derived class `[n n+8]` also captures the exception variant
//! of the same function, whose code is `function | 0x80`; the decoder, not
//! the matcher, tells the two apart.

use std::fmt;

/// One element of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// A literal character (stored lowercased).
    Literal(char),
    /// `?`: any single character.
    AnyOne,
    /// `*`: any run of characters.
    AnyRun,
    /// `[..]`: one character out of a set (stored lowercased).
    Class(Vec<char>),
}

/// A compiled message-matching pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePattern {
    tokens: Vec<Token>,
}

impl MessagePattern {
    /// The empty pattern: matches every message.
    pub fn any() -> Self {
        Self { tokens: Vec::new() }
    }

    /// Compile a pattern string.
    ///
    /// Returns `None` on an unterminated `[` class.
    pub fn parse(pattern: &str) -> Option<Self> {
        let mut tokens = Vec::new();
        let mut chars = pattern.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '*' => tokens.push(Token::AnyRun),
                '?' => tokens.push(Token::AnyOne),
                '[' => {
                    let mut set = Vec::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(c) => set.push(c.to_ascii_lowercase()),
                            None => return None,
                        }
                    }
                    tokens.push(Token::Class(set));
                }
                c => tokens.push(Token::Literal(c.to_ascii_lowercase())),
            }
        }
        Some(Self { tokens })
    }

    /// Derive the reply-matching pattern for a MODBUS query.
    ///
    /// For `nib = function >> 4`, the expression is
    /// `{slave:02x}[{nib}{nib+8}]{function & 0xF:x}*`: it matches replies
    /// whose echoed function code is either the request code or its
    /// exception variant. `function` must be a 7-bit request code.
    pub fn modbus(slave: u8, function: u8) -> Self {
        let nib = (function >> 4) & 0x7;
        let slave_hex = format!("{:02x}", slave);
        let mut tokens: Vec<Token> = slave_hex.chars().map(Token::Literal).collect();
        tokens.push(Token::Class(vec![
            char::from_digit(u32::from(nib), 16).unwrap_or('0'),
            char::from_digit(u32::from(nib + 8), 16).unwrap_or('8'),
        ]));
        tokens.push(Token::Literal(
            char::from_digit(u32::from(function & 0xF), 16).unwrap_or('0'),
        ));
        tokens.push(Token::AnyRun);
        Self { tokens }
    }

    /// True when this is the match-everything pattern.
    pub fn is_any(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Match a message's printable/hex text against this pattern.
    pub fn matches(&self, text: &str) -> bool {
        if self.is_any() {
            return true;
        }
        let chars: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();
        self.matches_at(0, &chars, 0)
    }

    fn matches_at(&self, mut token_idx: usize, chars: &[char], mut pos: usize) -> bool {
        // Classic glob walk with backtracking over the last `*`.
        let mut star: Option<(usize, usize)> = None;
        loop {
            if token_idx == self.tokens.len() {
                if pos == chars.len() {
                    return true;
                }
            } else {
                match &self.tokens[token_idx] {
                    Token::AnyRun => {
                        star = Some((token_idx, pos));
                        token_idx += 1;
                        continue;
                    }
                    Token::AnyOne => {
                        if pos < chars.len() {
                            token_idx += 1;
                            pos += 1;
                            continue;
                        }
                    }
                    Token::Literal(c) => {
                        if pos < chars.len() && chars[pos] == *c {
                            token_idx += 1;
                            pos += 1;
                            continue;
                        }
                    }
                    Token::Class(set) => {
                        if pos < chars.len() && set.contains(&chars[pos]) {
                            token_idx += 1;
                            pos += 1;
                            continue;
                        }
                    }
                }
            }
            // Mismatch: widen the last `*` by one character, if there is one.
            match star {
                Some((star_token, star_pos)) if star_pos < chars.len() => {
                    star = Some((star_token, star_pos + 1));
                    token_idx = star_token + 1;
                    pos = star_pos + 1;
                }
                _ => return false,
            }
        }
    }
}

impl fmt::Display for MessagePattern {
    /// Render the wire form used in the `pat=` query parameter.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            match token {
                Token::Literal(c) => write!(f, "{}", c)?,
                Token::AnyOne => write!(f, "?")?,
                Token::AnyRun => write!(f, "*")?,
                Token::Class(set) => {
                    write!(f, "[")?;
                    for c in set {
                        write!(f, "{}", c)?;
                    }
                    write!(f, "]")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pattern_matches_everything() {
        let pat = MessagePattern::any();
        assert!(pat.matches(""));
        assert!(pat.matches("anything at all"));
        assert!(MessagePattern::parse("").unwrap().is_any());
    }

    #[test]
    fn test_literal_match_is_case_insensitive() {
        let pat = MessagePattern::parse("01ab").unwrap();
        assert!(pat.matches("01AB"));
        assert!(pat.matches("01ab"));
        assert!(!pat.matches("01ac"));
        assert!(!pat.matches("01ab0"));
    }

    #[test]
    fn test_wildcards() {
        let pat = MessagePattern::parse("ok:*").unwrap();
        assert!(pat.matches("OK:"));
        assert!(pat.matches("ok:ready"));
        assert!(!pat.matches("ko:ready"));

        let pat = MessagePattern::parse("v?.?").unwrap();
        assert!(pat.matches("v1.2"));
        assert!(!pat.matches("v12"));
    }

    #[test]
    fn test_star_backtracking() {
        let pat = MessagePattern::parse("*end").unwrap();
        assert!(pat.matches("end"));
        assert!(pat.matches("the end"));
        assert!(pat.matches("end end"));
        assert!(!pat.matches("endless"));
    }

    #[test]
    fn test_character_class() {
        let pat = MessagePattern::parse("0[13]ff").unwrap();
        assert!(pat.matches("01ff"));
        assert!(pat.matches("03FF"));
        assert!(!pat.matches("02ff"));
    }

    #[test]
    fn test_unterminated_class() {
        assert!(MessagePattern::parse("01[8").is_none());
    }

    #[test]
    fn test_modbus_pattern_derivation() {
        // fc 0x03: nib 0, low nibble 3.
        let pat = MessagePattern::modbus(0x01, 0x03);
        assert_eq!(pat.to_string(), "01[08]3*");
        // fc 0x17: nib 1, low nibble 7.
        let pat = MessagePattern::modbus(0x10, 0x17);
        assert_eq!(pat.to_string(), "10[19]7*");
    }

    #[test]
    fn test_modbus_pattern_matches_success_and_exception() {
        let pat = MessagePattern::modbus(0x01, 0x03);
        // Success echo: slave 01, fc 03, payload.
        assert!(pat.matches("0103040000002a"));
        // Exception echo: slave 01, fc 83, code.
        assert!(pat.matches("018302"));
        // Wrong slave or unrelated function never match.
        assert!(!pat.matches("0203040000002a"));
        assert!(!pat.matches("0104040000002a"));
    }
}
