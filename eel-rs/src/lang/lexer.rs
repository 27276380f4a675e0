//! Two-mode tokenizer.
//!
//! *Interpolation mode* scans literal template text, decoding escapes, and
//! stops at the openers `${`, `$(`, `$[` and `$name`, or at the caller's
//! follow character (the closing quote of a nested template).
//!
//! *Expression mode* skips whitespace and `##` comments, then produces
//! numbers, identifiers, keywords, quotes and operators, always preferring
//! the longest operator that matches.
//!
//! The parser decides which mode to request for every token, so the lexer
//! itself keeps no mode state.

use crate::error::{Error, Result};

use super::number::{self, NumberLiteral};
use super::source::{Source, END};

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    // Interpolation mode
    /// Literal template text; the lexeme holds the decoded characters.
    Text,
    /// `${`
    ValueOpen,
    /// `$(`
    ExpressionOpen,
    /// `$[`
    LookBackOpen,
    /// `$name`; the lexeme holds the name.
    FunctionOpen,
    /// The follow character that closes a nested template.
    Follow,

    // Literals and names
    Number,
    Identifier,
    /// `"` or `'` opening a nested template.
    Quote,

    // Keywords
    True,
    False,
    And,
    Or,
    Not,
    Xor,
    IsBefore,
    IsAfter,
    ToText,
    ToNumber,
    ToLogic,
    ToDate,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    CommaComma,
    Question,
    Colon,
    Hash,

    // Operators
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    Pipe,
    Amp,
    Caret,
    CaretCaret,
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    MinusSlash,
    Percent,
    Power,
    Concat,
    Tilde,
    TildeTilde,

    End,
}

/// One token with its source text and 1-based starting position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminal {
    pub token: Token,
    pub lexeme: String,
    pub number: Option<NumberLiteral>,
    pub position: usize,
}

impl Terminal {
    fn new(token: Token, lexeme: impl Into<String>, position: usize) -> Self {
        Terminal {
            token,
            lexeme: lexeme.into(),
            number: None,
            position,
        }
    }

    /// Syntax error naming this terminal as unexpected.
    pub fn unexpected(&self) -> Error {
        if self.token == Token::End {
            Error::syntax(self.position, "unexpected end of expression")
        } else {
            Error::syntax(self.position, format!("unexpected '{}'", self.lexeme))
        }
    }
}

const TWO_CHAR: &[(&str, Token)] = &[
    ("${", Token::ValueOpen),
    ("**", Token::Power),
    ("~>", Token::Concat),
    ("//", Token::SlashSlash),
    ("-/", Token::MinusSlash),
    ("<<", Token::Shl),
    (">>", Token::Shr),
    ("<=", Token::Le),
    (">=", Token::Ge),
    ("<>", Token::Ne),
    ("^^", Token::CaretCaret),
    (",,", Token::CommaComma),
    ("~~", Token::TildeTilde),
];

fn one_char(c: char) -> Option<Token> {
    Some(match c {
        '(' => Token::LParen,
        ')' => Token::RParen,
        '[' => Token::LBracket,
        ']' => Token::RBracket,
        '{' => Token::LBrace,
        '}' => Token::RBrace,
        ',' => Token::Comma,
        '?' => Token::Question,
        ':' => Token::Colon,
        '=' => Token::Eq,
        '<' => Token::Lt,
        '>' => Token::Gt,
        '|' => Token::Pipe,
        '&' => Token::Amp,
        '^' => Token::Caret,
        '+' => Token::Plus,
        '-' => Token::Minus,
        '*' => Token::Star,
        '/' => Token::Slash,
        '%' => Token::Percent,
        '~' => Token::Tilde,
        '#' => Token::Hash,
        _ => return None,
    })
}

fn keyword(word: &str) -> Option<Token> {
    Some(match word {
        "true" => Token::True,
        "false" => Token::False,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "xor" => Token::Xor,
        "isBefore" => Token::IsBefore,
        "isAfter" => Token::IsAfter,
        "text" => Token::ToText,
        "number" => Token::ToNumber,
        "logic" => Token::ToLogic,
        "date" => Token::ToDate,
        _ => return None,
    })
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']')
}

/// Characters that may never appear raw in template text.
fn is_forbidden(c: char) -> bool {
    c.is_control() || ('\u{FFF0}'..='\u{FFFF}').contains(&c)
}

fn unexpected_char(c: char, position: usize) -> Error {
    Error::syntax(
        position,
        format!("unexpected character '{}' (0x{:04X})", c.escape_default(), c as u32),
    )
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

pub struct Lexer<'a> {
    source: Source<'a>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: Source<'a>) -> Self {
        Lexer { source }
    }

    pub fn position(&self) -> usize {
        self.source.position()
    }

    // ── Interpolation mode ────────────────────────────────────────────────────

    /// Next token of template text. `follow` is the character that closes
    /// the enclosing nested template, if any.
    pub fn next_text(&mut self, follow: Option<char>) -> Result<Terminal> {
        let start = self.source.position();
        let c = self.source.current();
        if c == END {
            return Ok(Terminal::new(Token::End, "", start));
        }
        if Some(c) == follow {
            self.source.read()?;
            return Ok(Terminal::new(Token::Follow, c.to_string(), start));
        }
        if c == '$' {
            let opener = match self.source.next() {
                '{' => Some((Token::ValueOpen, "${")),
                '(' => Some((Token::ExpressionOpen, "$(")),
                '[' => Some((Token::LookBackOpen, "$[")),
                _ => None,
            };
            if let Some((token, lexeme)) = opener {
                self.source.read()?;
                self.source.read()?;
                return Ok(Terminal::new(token, lexeme, start));
            }
            if is_identifier_start(self.source.next()) {
                self.source.read()?;
                let name = self.identifier()?;
                return Ok(Terminal::new(Token::FunctionOpen, name, start));
            }
        }

        let mut text = String::new();
        loop {
            let c = self.source.current();
            if c == END || Some(c) == follow || (c == '$' && self.opens_interpolation()) {
                break;
            }
            if c == '\\' {
                self.escape(&mut text)?;
                continue;
            }
            if is_forbidden(c) {
                return Err(unexpected_char(c, self.source.position()));
            }
            text.push(self.source.read()?);
        }
        Ok(Terminal::new(Token::Text, text, start))
    }

    fn opens_interpolation(&self) -> bool {
        let next = self.source.next();
        matches!(next, '{' | '(' | '[') || is_identifier_start(next)
    }

    /// Decode one backslash escape into `out`. An unknown escape keeps the
    /// backslash and leaves the following character to be read normally.
    fn escape(&mut self, out: &mut String) -> Result<()> {
        self.source.read()?;
        let decoded = match self.source.current() {
            't' => '\t',
            'n' => '\n',
            'r' => '\r',
            'f' => '\u{000C}',
            'b' => '\u{0008}',
            '\\' => '\\',
            '"' => '"',
            '\'' => '\'',
            '$' => '$',
            'u' => {
                self.source.read()?;
                return self.unicode_escape(out);
            }
            _ => {
                out.push('\\');
                return Ok(());
            }
        };
        self.source.read()?;
        out.push(decoded);
        Ok(())
    }

    fn unicode_escape(&mut self, out: &mut String) -> Result<()> {
        let start = self.source.position();
        let mut code = 0u32;
        for _ in 0..4 {
            let c = self.source.current();
            let digit = c
                .to_digit(16)
                .ok_or_else(|| Error::syntax(self.source.position(), "malformed unicode escape"))?;
            code = code * 16 + digit;
            self.source.read()?;
        }
        let c = char::from_u32(code)
            .ok_or_else(|| Error::syntax(start, "malformed unicode escape"))?;
        out.push(c);
        Ok(())
    }

    // ── Expression mode ───────────────────────────────────────────────────────

    /// Next expression token.
    pub fn next_expression(&mut self) -> Result<Terminal> {
        self.skip_trivia()?;
        let start = self.source.position();
        let c = self.source.current();
        let next = self.source.next();

        if c == END {
            return Ok(Terminal::new(Token::End, "", start));
        }
        if c.is_ascii_digit() || (c == '.' && next.is_ascii_digit()) {
            let literal = number::parse(&mut self.source)?;
            return Ok(Terminal {
                token: Token::Number,
                lexeme: literal.text.clone(),
                number: Some(literal),
                position: start,
            });
        }
        if is_identifier_start(c) {
            let word = self.identifier()?;
            let token = keyword(&word).unwrap_or(Token::Identifier);
            return Ok(Terminal::new(token, word, start));
        }
        if c == '"' || c == '\'' {
            self.source.read()?;
            return Ok(Terminal::new(Token::Quote, c.to_string(), start));
        }
        for (pair, token) in TWO_CHAR {
            let mut chars = pair.chars();
            if chars.next() == Some(c) && chars.next() == Some(next) {
                self.source.read()?;
                self.source.read()?;
                return Ok(Terminal::new(*token, *pair, start));
            }
        }
        if let Some(token) = one_char(c) {
            self.source.read()?;
            return Ok(Terminal::new(token, c.to_string(), start));
        }
        Err(unexpected_char(c, start))
    }

    fn identifier(&mut self) -> Result<String> {
        let mut name = String::new();
        while is_identifier_part(self.source.current()) {
            name.push(self.source.read()?);
        }
        Ok(name)
    }

    /// Whitespace, `## … ##` and `## … end of line`.
    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            while self.source.current().is_whitespace() {
                self.source.read()?;
            }
            if self.source.current() != '#' || self.source.next() != '#' {
                return Ok(());
            }
            self.source.read()?;
            self.source.read()?;
            loop {
                let c = self.source.current();
                if c == END {
                    break;
                }
                if c == '#' && self.source.next() == '#' {
                    self.source.read()?;
                    self.source.read()?;
                    break;
                }
                self.source.read()?;
                if c == '\n' {
                    break;
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn lexer(text: &str) -> Lexer<'_> {
        Lexer::new(Source::from_str(text, 1024).unwrap())
    }

    fn expression_tokens(text: &str) -> Vec<Token> {
        let mut lx = lexer(text);
        let mut out = Vec::new();
        loop {
            let t = lx.next_expression().unwrap();
            if t.token == Token::End {
                return out;
            }
            out.push(t.token);
        }
    }

    #[test]
    fn longest_operator_wins() {
        use Token::*;
        assert_eq!(
            expression_tokens("** * ~> ~~ ~ // -/ - / << <= <> < >> >= >"),
            vec![Power, Star, Concat, TildeTilde, Tilde, SlashSlash, MinusSlash, Minus, Slash,
                 Shl, Le, Ne, Lt, Shr, Ge, Gt]
        );
        assert_eq!(expression_tokens("^^^,,,"), vec![CaretCaret, Caret, CommaComma, Comma]);
    }

    #[test]
    fn keywords_and_identifiers() {
        use Token::*;
        assert_eq!(
            expression_tokens("true and x.y[0] isBefore date text_1"),
            vec![True, And, Identifier, IsBefore, ToDate, Identifier]
        );
    }

    #[test]
    fn numbers_carry_their_literal() {
        let mut lx = lexer("  0x1F .5");
        let t = lx.next_expression().unwrap();
        assert_eq!(t.token, Token::Number);
        assert_eq!(t.position, 3);
        assert_eq!(t.number.unwrap().value.to_string(), "31");
        let t = lx.next_expression().unwrap();
        assert_eq!(t.number.unwrap().value.to_string(), "0.5");
    }

    #[test]
    fn comments_are_skipped() {
        use Token::*;
        assert_eq!(expression_tokens("1 ## note ## + ## to end\n 2"), vec![Number, Plus, Number]);
        assert_eq!(expression_tokens("1 ## unterminated"), vec![Number]);
        assert_eq!(expression_tokens("# 1"), vec![Hash, Number]);
    }

    #[test]
    fn dollar_brace_opens_a_reference() {
        use Token::*;
        assert_eq!(expression_tokens("${a}"), vec![ValueOpen, Identifier, RBrace]);
    }

    #[test]
    fn unknown_character_is_reported_with_its_code() {
        let mut lx = lexer("1 @");
        lx.next_expression().unwrap();
        let err = lx.next_expression().unwrap_err();
        assert_eq!(err.to_string(), "syntax error at position 3: unexpected character '@' (0x0040)");
    }

    #[test]
    fn text_stops_at_openers() {
        let mut lx = lexer("Hi ${n}$(1)$[1]$f(x) $ 5");
        let t = lx.next_text(None).unwrap();
        assert_eq!((t.token, t.lexeme.as_str()), (Token::Text, "Hi "));
        assert_eq!(lx.next_text(None).unwrap().token, Token::ValueOpen);
    }

    #[test]
    fn function_opener_carries_the_name() {
        let mut lx = lexer("$upper(x)");
        let t = lx.next_text(None).unwrap();
        assert_eq!((t.token, t.lexeme.as_str()), (Token::FunctionOpen, "upper"));
        assert_eq!(lx.next_expression().unwrap().token, Token::LParen);
    }

    #[test]
    fn lone_dollar_is_literal() {
        let mut lx = lexer("cost: $ 5 or $");
        let t = lx.next_text(None).unwrap();
        assert_eq!(t.lexeme, "cost: $ 5 or $");
        assert_eq!(lx.next_text(None).unwrap().token, Token::End);
    }

    #[test]
    fn escapes() {
        let mut lx = lexer(r#"a\tb\n\$\{\\\"A\q"#);
        assert_eq!(lx.next_text(None).unwrap().lexeme, "a\tb\n$\\{\\\"A\\q");
    }

    #[test]
    fn escaped_dollar_does_not_open() {
        let mut lx = lexer(r"\${x}");
        let t = lx.next_text(None).unwrap();
        assert_eq!(t.lexeme, "${x}");
    }

    #[test]
    fn malformed_unicode_escape() {
        let err = lexer(r"\u12G4").next_text(None).unwrap_err();
        assert_eq!(err.position(), Some(5));
    }

    #[test]
    fn control_characters_are_rejected() {
        let err = lexer("ab\u{0007}").next_text(None).unwrap_err();
        assert_eq!(err.position(), Some(3));
        assert!(lexer("\u{FFF5}").next_text(None).is_err());
    }

    #[test]
    fn follow_character_closes_nested_text() {
        let mut lx = lexer("abc' rest");
        assert_eq!(lx.next_text(Some('\'')).unwrap().lexeme, "abc");
        assert_eq!(lx.next_text(Some('\'')).unwrap().token, Token::Follow);
        assert_eq!(lx.next_expression().unwrap().token, Token::Identifier);
    }
}
