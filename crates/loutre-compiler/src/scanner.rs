//! scanner.rs — Analyse lexicale du langage Loutre.
//!
//! Objectifs :
//! - Zéro dépendance, lignes précises, lexèmes empruntés à la source.
//! - Commentaires : `// ...` jusqu'à la fin de ligne.
//! - Littéraux : nombres (`12`, `3.5`), chaînes `"..."` sans échappes,
//!   identifiants ASCII + `_`.
//! - Les erreurs lexicales sont des tokens `Error` dont le lexème porte le
//!   message ; c'est le parseur qui les rapporte.

/// Nature d'un token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Ponctuation simple
    LeftParen, RightParen, LeftBrace, RightBrace,
    Comma, Dot, Minus, Plus, Semicolon, Slash, Star,
    // Un ou deux caractères
    Bang, BangEqual, Equal, EqualEqual,
    Greater, GreaterEqual, Less, LessEqual,
    // Littéraux
    Identifier, Str, Number,
    // Mots-clés
    And, Class, Else, False, For, Fun, If, Nil, Or,
    Print, Return, Super, This, True, Var, While,
    // Spéciaux
    Error, Eof,
}

/// Un token : nature + lexème (tranche de la source) + ligne.
#[derive(Debug, Clone, Copy)]
pub struct Token<'s> {
    pub kind: TokenKind,
    pub lexeme: &'s str,
    pub line: u32,
}

impl Token<'_> {
    /// Token neutre pour amorcer le parseur.
    pub fn placeholder() -> Token<'static> {
        Token { kind: TokenKind::Eof, lexeme: "", line: 0 }
    }
}

/// Lexer à la demande : un token par appel à [`Scanner::scan_token`].
pub struct Scanner<'s> {
    source: &'s str,
    start: usize,
    current: usize,
    line: u32,
}

impl<'s> Scanner<'s> {
    pub fn new(source: &'s str) -> Self {
        Self { source, start: 0, current: 0, line: 1 }
    }

    pub fn scan_token(&mut self) -> Token<'s> {
        self.skip_whitespace();
        self.start = self.current;

        if self.is_at_end() {
            return self.make_token(TokenKind::Eof);
        }

        let c = self.advance();
        match c {
            b'(' => self.make_token(TokenKind::LeftParen),
            b')' => self.make_token(TokenKind::RightParen),
            b'{' => self.make_token(TokenKind::LeftBrace),
            b'}' => self.make_token(TokenKind::RightBrace),
            b';' => self.make_token(TokenKind::Semicolon),
            b',' => self.make_token(TokenKind::Comma),
            b'.' => self.make_token(TokenKind::Dot),
            b'-' => self.make_token(TokenKind::Minus),
            b'+' => self.make_token(TokenKind::Plus),
            b'/' => self.make_token(TokenKind::Slash),
            b'*' => self.make_token(TokenKind::Star),
            b'!' => {
                let kind = if self.matches(b'=') { TokenKind::BangEqual } else { TokenKind::Bang };
                self.make_token(kind)
            }
            b'=' => {
                let kind = if self.matches(b'=') { TokenKind::EqualEqual } else { TokenKind::Equal };
                self.make_token(kind)
            }
            b'<' => {
                let kind = if self.matches(b'=') { TokenKind::LessEqual } else { TokenKind::Less };
                self.make_token(kind)
            }
            b'>' => {
                let kind =
                    if self.matches(b'=') { TokenKind::GreaterEqual } else { TokenKind::Greater };
                self.make_token(kind)
            }
            b'"' => self.string(),
            b'0'..=b'9' => self.number(),
            c if is_alpha(c) => self.identifier(),
            _ => self.error_token("Unexpected character."),
        }
    }

    // ---------- Curseur ----------

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn advance(&mut self) -> u8 {
        let b = self.source.as_bytes()[self.current];
        self.current += 1;
        b
    }

    fn peek(&self) -> u8 {
        if self.is_at_end() { 0 } else { self.source.as_bytes()[self.current] }
    }

    fn peek_next(&self) -> u8 {
        if self.current + 1 >= self.source.len() {
            0
        } else {
            self.source.as_bytes()[self.current + 1]
        }
    }

    fn matches(&mut self, expected: u8) -> bool {
        if self.is_at_end() || self.peek() != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\r' | b'\t' => {
                    self.current += 1;
                }
                b'\n' => {
                    self.line += 1;
                    self.current += 1;
                }
                b'/' if self.peek_next() == b'/' => {
                    while self.peek() != b'\n' && !self.is_at_end() {
                        self.current += 1;
                    }
                }
                _ => return,
            }
        }
    }

    // ---------- Littéraux ----------

    fn string(&mut self) -> Token<'s> {
        while self.peek() != b'"' && !self.is_at_end() {
            if self.peek() == b'\n' {
                self.line += 1;
            }
            self.current += 1;
        }
        if self.is_at_end() {
            return self.error_token("Unterminated string.");
        }
        self.current += 1; // guillemet fermant
        self.make_token(TokenKind::Str)
    }

    fn number(&mut self) -> Token<'s> {
        while self.peek().is_ascii_digit() {
            self.current += 1;
        }
        // partie fractionnaire seulement si un chiffre la suit
        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.current += 1;
            while self.peek().is_ascii_digit() {
                self.current += 1;
            }
        }
        self.make_token(TokenKind::Number)
    }

    fn identifier(&mut self) -> Token<'s> {
        while is_alpha(self.peek()) || self.peek().is_ascii_digit() {
            self.current += 1;
        }
        self.make_token(self.identifier_kind())
    }

    fn identifier_kind(&self) -> TokenKind {
        match &self.source[self.start..self.current] {
            "and"    => TokenKind::And,
            "class"  => TokenKind::Class,
            "else"   => TokenKind::Else,
            "false"  => TokenKind::False,
            "for"    => TokenKind::For,
            "fun"    => TokenKind::Fun,
            "if"     => TokenKind::If,
            "nil"    => TokenKind::Nil,
            "or"     => TokenKind::Or,
            "print"  => TokenKind::Print,
            "return" => TokenKind::Return,
            "super"  => TokenKind::Super,
            "this"   => TokenKind::This,
            "true"   => TokenKind::True,
            "var"    => TokenKind::Var,
            "while"  => TokenKind::While,
            _        => TokenKind::Identifier,
        }
    }

    // ---------- Fabrique ----------

    fn make_token(&self, kind: TokenKind) -> Token<'s> {
        Token { kind, lexeme: &self.source[self.start..self.current], line: self.line }
    }

    fn error_token(&self, message: &'static str) -> Token<'s> {
        Token { kind: TokenKind::Error, lexeme: message, line: self.line }
    }
}

fn is_alpha(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(source);
        let mut out = Vec::new();
        loop {
            let tok = scanner.scan_token();
            out.push(tok.kind);
            if tok.kind == TokenKind::Eof {
                return out;
            }
        }
    }

    #[test]
    fn punctuation_and_operators() {
        use TokenKind::*;
        assert_eq!(
            kinds("(){};,.-+/* ! != = == < <= > >="),
            vec![
                LeftParen, RightParen, LeftBrace, RightBrace, Semicolon, Comma, Dot, Minus,
                Plus, Slash, Star, Bang, BangEqual, Equal, EqualEqual, Less, LessEqual,
                Greater, GreaterEqual, Eof
            ]
        );
    }

    #[test]
    fn keywords_versus_identifiers() {
        use TokenKind::*;
        assert_eq!(
            kinds("class classe var varx superbe super"),
            vec![Class, Identifier, Var, Identifier, Identifier, Super, Eof]
        );
    }

    #[test]
    fn numbers_do_not_eat_method_dots() {
        use TokenKind::*;
        assert_eq!(kinds("12.5"), vec![Number, Eof]);
        // `12.` n'est pas un nombre fractionnaire : le point reste un Dot
        assert_eq!(kinds("12.abs"), vec![Number, Dot, Identifier, Eof]);
    }

    #[test]
    fn strings_keep_quotes_and_count_lines() {
        let mut scanner = Scanner::new("\"bon\njour\"");
        let tok = scanner.scan_token();
        assert_eq!(tok.kind, TokenKind::Str);
        assert_eq!(tok.lexeme, "\"bon\njour\"");
        assert_eq!(tok.line, 2); // la ligne du guillemet fermant
    }

    #[test]
    fn unterminated_string_is_an_error_token() {
        let mut scanner = Scanner::new("\"oups");
        let tok = scanner.scan_token();
        assert_eq!(tok.kind, TokenKind::Error);
        assert_eq!(tok.lexeme, "Unterminated string.");
    }

    #[test]
    fn comments_are_skipped() {
        use TokenKind::*;
        assert_eq!(kinds("// rien à voir\nvar x; // fin"), vec![Var, Identifier, Semicolon, Eof]);
    }
}
