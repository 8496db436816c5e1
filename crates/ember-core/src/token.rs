/// The closed set of token kinds produced by the scanner.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TokenType {
    // Single-character tokens.
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,
    // One- or two-character tokens.
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    // Literals.
    Identifier,
    String,
    Number,
    // Keywords.
    And,
    Class,
    Else,
    False,
    For,
    Fun,
    If,
    Nil,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    Var,
    While,
    // Sentinels.
    Error,
    Eof,
}

/// One token of source, borrowing its lexeme from the source string.
///
/// For `Error` tokens the lexeme carries the error message instead.
#[derive(Copy, Clone, Debug)]
pub struct Token<'src> {
    pub ty: TokenType,
    pub lexeme: &'src str,
    pub line: u32,
}

impl<'src> Token<'src> {
    /// A synthetic token not backed by any source text. The compiler uses
    /// these to seed state before the first real token arrives and for
    /// implicit names like `this` and `super`.
    pub fn synthetic(ty: TokenType, lexeme: &'src str) -> Self {
        Self { ty, lexeme, line: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_token() {
        let token = Token::synthetic(TokenType::This, "this");
        assert_eq!(token.ty, TokenType::This);
        assert_eq!(token.lexeme, "this");
        assert_eq!(token.line, 0);
    }
}
