use std::fmt;

/// Label for a lexical category.
///
/// Tokens are compared and hashed by their text, so two tokens created from
/// the same text are the same token. Grammars usually declare them as
/// constants:
///
/// ```
/// use kiln::Token;
///
/// const PLUS: Token = Token::new("+");
/// assert_eq!(PLUS.text(), "+");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(&'static str);

impl Token {
    /// Marks the end of the input. Always the last item of a successful scan.
    pub const EOF: Token = Token::new("EOF");
    /// Marks a scanning failure. The item's lexeme holds the message.
    pub const ERROR: Token = Token::new("err");

    pub const fn new(text: &'static str) -> Self {
        Self(text)
    }

    pub const fn text(&self) -> &'static str {
        self.0
    }

    /// Whether this token ends an item sequence.
    pub fn is_terminal(&self) -> bool {
        *self == Token::EOF || *self == Token::ERROR
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}
