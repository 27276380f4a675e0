//! Recursive-descent parser.
//!
//! Precedence, lowest to highest:
//!
//! ```text
//! template      segments of text and interpolations
//! conditional   c ? a : b
//! relational    =  <>  <  >  <=  >=  isBefore  isAfter
//! shift         <<  >>  or  |
//! additive      +  -  xor  ^
//! multiplicative *  /  //  -/  %  and  &
//! power         **  ~>
//! unary         -  +  not  ~  ~~
//! primary       literals, strings, ( … ), ${ … }, conversions, calls, names
//! ```
//!
//! All binary levels are left-associative. The parser asks the lexer for
//! interpolation-mode tokens while inside template text and for
//! expression-mode tokens everywhere else; at most one expression token is
//! ever held back, and never across a switch into text mode.

use crate::error::{Error, Result};
use crate::value::{Kind, Value};

use super::compiler::{BinaryOp, Bound, CaseTransform, Compiler, Segment, Slice, UnaryOp, VariableRef};
use super::lexer::{Lexer, Terminal, Token};
use super::source::Source;

pub struct Parser<'a, 'c, C: Compiler> {
    lexer: Lexer<'a>,
    compiler: &'c C,
    peeked: Option<Terminal>,
}

impl<'a, 'c, C: Compiler> Parser<'a, 'c, C> {
    pub fn new(source: Source<'a>, compiler: &'c C) -> Self {
        Parser {
            lexer: Lexer::new(source),
            compiler,
            peeked: None,
        }
    }

    /// Parse the whole source as a top-level template.
    pub fn parse(mut self) -> Result<C::Executor> {
        self.template(None, true)
    }

    // ── Token plumbing ────────────────────────────────────────────────────────

    fn peek(&mut self) -> Result<&Terminal> {
        let terminal = match self.peeked.take() {
            Some(t) => t,
            None => self.lexer.next_expression()?,
        };
        Ok(self.peeked.insert(terminal))
    }

    fn peek_token(&mut self) -> Result<Token> {
        Ok(self.peek()?.token)
    }

    fn advance(&mut self) -> Result<Terminal> {
        match self.peeked.take() {
            Some(t) => Ok(t),
            None => self.lexer.next_expression(),
        }
    }

    fn expect(&mut self, token: Token) -> Result<Terminal> {
        let t = self.advance()?;
        if t.token == token {
            Ok(t)
        } else {
            Err(t.unexpected())
        }
    }

    fn eat(&mut self, token: Token) -> Result<bool> {
        if self.peek_token()? == token {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    // ── Templates ─────────────────────────────────────────────────────────────

    fn template(&mut self, follow: Option<char>, typed: bool) -> Result<C::Executor> {
        debug_assert!(self.peeked.is_none(), "token held across a mode switch");
        let mut segments: Vec<Segment<C::Executor>> = Vec::new();
        let mut values = 0usize;
        loop {
            let t = self.lexer.next_text(follow)?;
            let executor = match t.token {
                Token::Text => {
                    match segments.last_mut() {
                        Some(Segment::Text(prev)) => prev.push_str(&t.lexeme),
                        _ => segments.push(Segment::Text(t.lexeme)),
                    }
                    continue;
                }
                Token::ValueOpen => self.reference()?,
                Token::ExpressionOpen => {
                    let e = self.expression()?;
                    self.expect(Token::RParen)?;
                    e
                }
                Token::FunctionOpen => {
                    self.expect(Token::LParen)?;
                    self.call(&t)?
                }
                Token::LookBackOpen => {
                    let distance = self.look_back(values)?;
                    segments.push(Segment::LookBack {
                        distance,
                        position: t.position,
                    });
                    continue;
                }
                Token::Follow => break,
                Token::End if follow.is_none() => break,
                _ => return Err(t.unexpected()),
            };
            segments.push(Segment::Value(executor));
            values += 1;
        }
        Ok(self.compiler.template(segments, typed))
    }

    /// `n ]` after `$[`; `n` must name one of the `available` earlier values.
    fn look_back(&mut self, available: usize) -> Result<usize> {
        let n = self.expect(Token::Number)?;
        let distance = n
            .number
            .as_ref()
            .filter(|lit| lit.plain)
            .and_then(|lit| lit.value.to_i64())
            .and_then(|d| usize::try_from(d).ok())
            .filter(|d| (1..=available).contains(d))
            .ok_or_else(|| {
                Error::syntax(
                    n.position,
                    format!("look-back '{}' does not name a previous value", n.lexeme),
                )
            })?;
        self.expect(Token::RBracket)?;
        Ok(distance)
    }

    /// The rest of a variable reference, after `${`.
    fn reference(&mut self) -> Result<C::Executor> {
        let name = self.expect(Token::Identifier)?.lexeme;
        if self.eat(Token::Question)? {
            self.expect(Token::RBrace)?;
            return Ok(self.compiler.is_defined(name));
        }

        let mut reference = VariableRef::plain(name);
        if self.eat(Token::Colon)? {
            let start = self.bound()?;
            let count = if self.eat(Token::Colon)? {
                Some(self.bound()?)
            } else {
                None
            };
            reference.slice = Some(Slice { start, count });
        }
        loop {
            let transform = match self.peek_token()? {
                Token::Caret => CaseTransform::UpperFirst,
                Token::CaretCaret => CaseTransform::Upper,
                Token::Comma => CaseTransform::LowerFirst,
                Token::CommaComma => CaseTransform::Lower,
                Token::Tilde => CaseTransform::ToggleFirst,
                Token::TildeTilde => CaseTransform::Toggle,
                _ => break,
            };
            self.advance()?;
            reference.transforms.push(transform);
        }
        reference.length = self.eat(Token::Hash)?;
        if self.eat(Token::Minus)? {
            reference.default = Some(self.expression()?);
        }
        self.expect(Token::RBrace)?;
        Ok(self.compiler.variable(reference))
    }

    fn bound(&mut self) -> Result<Bound<C::Executor>> {
        let position = self.peek()?.position;
        let executor = self.multiplicative()?;
        Ok(Bound { executor, position })
    }

    /// Arguments and the closing `)`, after `name(`.
    fn call(&mut self, name: &Terminal) -> Result<C::Executor> {
        let mut arguments = Vec::new();
        if !self.eat(Token::RParen)? {
            loop {
                arguments.push(self.expression()?);
                if !self.eat(Token::Comma)? {
                    self.expect(Token::RParen)?;
                    break;
                }
            }
        }
        self.compiler.call(&name.lexeme, arguments, name.position)
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    fn expression(&mut self) -> Result<C::Executor> {
        let condition = self.relational()?;
        if !self.eat(Token::Question)? {
            return Ok(condition);
        }
        let then = self.expression()?;
        self.expect(Token::Colon)?;
        let otherwise = self.expression()?;
        Ok(self.compiler.conditional(condition, then, otherwise))
    }

    fn binary_level(
        &mut self,
        operator: fn(Token) -> Option<BinaryOp>,
        operand: fn(&mut Self) -> Result<C::Executor>,
    ) -> Result<C::Executor> {
        let mut lhs = operand(self)?;
        while let Some(op) = operator(self.peek_token()?) {
            self.advance()?;
            let rhs = operand(self)?;
            lhs = self.compiler.binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn relational(&mut self) -> Result<C::Executor> {
        self.binary_level(
            |t| match t {
                Token::Eq => Some(BinaryOp::Eq),
                Token::Ne => Some(BinaryOp::Ne),
                Token::Lt => Some(BinaryOp::Lt),
                Token::Gt => Some(BinaryOp::Gt),
                Token::Le => Some(BinaryOp::Le),
                Token::Ge => Some(BinaryOp::Ge),
                Token::IsBefore => Some(BinaryOp::Before),
                Token::IsAfter => Some(BinaryOp::After),
                _ => None,
            },
            Self::shift,
        )
    }

    fn shift(&mut self) -> Result<C::Executor> {
        self.binary_level(
            |t| match t {
                Token::Shl => Some(BinaryOp::Shl),
                Token::Shr => Some(BinaryOp::Shr),
                Token::Or => Some(BinaryOp::Or),
                Token::Pipe => Some(BinaryOp::BitOr),
                _ => None,
            },
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<C::Executor> {
        self.binary_level(
            |t| match t {
                Token::Plus => Some(BinaryOp::Add),
                Token::Minus => Some(BinaryOp::Sub),
                Token::Xor | Token::Caret => Some(BinaryOp::Xor),
                _ => None,
            },
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<C::Executor> {
        self.binary_level(
            |t| match t {
                Token::Star => Some(BinaryOp::Mul),
                Token::Slash => Some(BinaryOp::Div),
                Token::SlashSlash => Some(BinaryOp::DivFloor),
                Token::MinusSlash => Some(BinaryOp::DivTrunc),
                Token::Percent => Some(BinaryOp::Rem),
                Token::And => Some(BinaryOp::And),
                Token::Amp => Some(BinaryOp::BitAnd),
                _ => None,
            },
            Self::power,
        )
    }

    fn power(&mut self) -> Result<C::Executor> {
        self.binary_level(
            |t| match t {
                Token::Power => Some(BinaryOp::Power),
                Token::Concat => Some(BinaryOp::Concat),
                _ => None,
            },
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<C::Executor> {
        let op = match self.peek_token()? {
            Token::Minus => UnaryOp::Negate,
            Token::Plus => UnaryOp::Plus,
            Token::Not => UnaryOp::Not,
            Token::Tilde => UnaryOp::Complement,
            Token::TildeTilde => {
                self.advance()?;
                let operand = self.unary()?;
                let once = self.compiler.unary(UnaryOp::Complement, operand);
                return Ok(self.compiler.unary(UnaryOp::Complement, once));
            }
            _ => return self.primary(),
        };
        self.advance()?;
        let operand = self.unary()?;
        Ok(self.compiler.unary(op, operand))
    }

    fn primary(&mut self) -> Result<C::Executor> {
        let t = self.advance()?;
        let kind = match t.token {
            Token::Number => {
                return match t.number {
                    Some(literal) => Ok(self.compiler.constant(Value::number(literal.value))),
                    None => Err(Error::syntax(t.position, "number without a value")),
                };
            }
            Token::True => return Ok(self.compiler.constant(Value::TRUE)),
            Token::False => return Ok(self.compiler.constant(Value::FALSE)),
            Token::Quote => {
                let quote = t.lexeme.chars().next().ok_or_else(|| t.unexpected())?;
                return self.template(Some(quote), false);
            }
            Token::LParen => {
                let e = self.expression()?;
                self.expect(Token::RParen)?;
                return Ok(e);
            }
            Token::ValueOpen => return self.reference(),
            Token::Identifier => {
                if self.eat(Token::LParen)? {
                    return self.call(&t);
                }
                return Ok(self.compiler.variable(VariableRef::plain(t.lexeme)));
            }
            Token::ToText => Kind::Text,
            Token::ToNumber => Kind::Number,
            Token::ToLogic => Kind::Logic,
            Token::ToDate => Kind::Date,
            _ => return Err(t.unexpected()),
        };
        self.expect(Token::LParen)?;
        let operand = self.expression()?;
        self.expect(Token::RParen)?;
        Ok(self.compiler.convert(kind, operand))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Renders the parse as an S-expression instead of building closures.
    struct Printer;

    impl Compiler for Printer {
        type Executor = String;

        fn constant(&self, value: Value) -> String {
            match value.kind() {
                Kind::Text => format!("{:?}", value.as_text()),
                _ => value.as_text().to_string(),
            }
        }

        fn template(&self, segments: Vec<Segment<String>>, typed: bool) -> String {
            let parts: Vec<String> = segments
                .into_iter()
                .map(|s| match s {
                    Segment::Text(t) => format!("{t:?}"),
                    Segment::Value(e) => e,
                    Segment::LookBack { distance, .. } => format!("(back {distance})"),
                })
                .collect();
            let tag = if typed { "tpl" } else { "str" };
            format!("({tag} {})", parts.join(" "))
        }

        fn variable(&self, r: VariableRef<String>) -> String {
            let mut out = format!("(var {}", r.name);
            if let Some(slice) = r.slice {
                out += &format!(" :{}@{}", slice.start.executor, slice.start.position);
                if let Some(count) = slice.count {
                    out += &format!(" :{}@{}", count.executor, count.position);
                }
            }
            for t in r.transforms {
                out += &format!(" {t:?}");
            }
            if r.length {
                out += " #";
            }
            if let Some(d) = r.default {
                out += &format!(" -{d}");
            }
            out + ")"
        }

        fn is_defined(&self, name: String) -> String {
            format!("(defined {name})")
        }

        fn conditional(&self, c: String, a: String, b: String) -> String {
            format!("(? {c} {a} {b})")
        }

        fn binary(&self, op: BinaryOp, l: String, r: String) -> String {
            format!("({op:?} {l} {r})")
        }

        fn unary(&self, op: UnaryOp, e: String) -> String {
            format!("({op:?} {e})")
        }

        fn convert(&self, kind: Kind, e: String) -> String {
            format!("({kind} {e})")
        }

        fn call(&self, name: &str, args: Vec<String>, _position: usize) -> Result<String> {
            if name == "missing" {
                return Err(crate::error::FunctionError::Unknown { name: name.into() }.into());
            }
            Ok(format!("({name} {})", args.join(" ")))
        }
    }

    fn parse(text: &str) -> Result<String> {
        Parser::new(Source::from_str(text, 1024)?, &Printer).parse()
    }

    fn tree(text: &str) -> String {
        parse(text).unwrap()
    }

    fn syntax_error(text: &str) -> (usize, String) {
        match parse(text).unwrap_err() {
            Error::Syntax { position, message } => (position, message),
            other => panic!("expected a syntax error, got {other:?}"),
        }
    }

    #[test]
    fn plain_text() {
        assert_eq!(tree("hello"), r#"(tpl "hello")"#);
        assert_eq!(tree(""), "(tpl )");
    }

    #[test]
    fn precedence_ladder() {
        assert_eq!(
            tree("$(2 * 3 ** 2 + (4 - 1))"),
            "(tpl (Add (Mul 2 (Power 3 2)) (Sub 4 1)))"
        );
        assert_eq!(
            tree("$(a = 1 | b + 2 * c ~> d)"),
            "(tpl (Eq (var a) (BitOr 1 (Add (var b) (Mul 2 (Concat (var c) (var d)))))))"
        );
    }

    #[test]
    fn left_associative() {
        assert_eq!(tree("$(8 - 4 - 2)"), "(tpl (Sub (Sub 8 4) 2))");
        assert_eq!(tree("$(2 ** 3 ** 2)"), "(tpl (Power (Power 2 3) 2))");
    }

    #[test]
    fn keyword_operators_share_their_levels() {
        assert_eq!(
            tree("$(a or b and c xor d)"),
            "(tpl (Or (var a) (Xor (And (var b) (var c)) (var d))))"
        );
        assert_eq!(tree("$(x isBefore y)"), "(tpl (Before (var x) (var y)))");
    }

    #[test]
    fn unary_binds_tighter_than_power() {
        assert_eq!(tree("$(-2 ** 2)"), "(tpl (Power (Negate 2) 2))");
        assert_eq!(tree("$(not ~~x)"), "(tpl (Not (Complement (Complement (var x)))))");
    }

    #[test]
    fn conditional_nests_to_the_right() {
        assert_eq!(tree("$(a ? 1 : b ? 2 : 3)"), "(tpl (? (var a) 1 (? (var b) 2 3)))");
    }

    #[test]
    fn nested_strings_are_text_templates() {
        assert_eq!(
            tree(r#"$("n=${n}" ~> 'x')"#),
            r#"(tpl (Concat (str "n=" (var n)) (str "x")))"#
        );
    }

    #[test]
    fn variable_reference_grammar() {
        assert_eq!(tree("${s:0:5}"), "(tpl (var s :0@5 :5@7))");
        assert_eq!(tree("${s:1^^#}"), "(tpl (var s :1@5 Upper #))");
        assert_eq!(tree("${s,,~^}"), "(tpl (var s Lower ToggleFirst UpperFirst))");
        assert_eq!(tree("${s-'none'}"), r#"(tpl (var s -(str "none")))"#);
        assert_eq!(tree("${s:0:2-1+1}"), "(tpl (var s :0@5 :2@7 -(Add 1 1)))");
        assert_eq!(tree("${s?}"), "(tpl (defined s))");
    }

    #[test]
    fn bound_positions_point_at_the_sub_expression() {
        assert_eq!(tree("${s: (1+1) : n}"), "(tpl (var s :(Add 1 1)@6 :(var n)@14))");
    }

    #[test]
    fn function_calls() {
        assert_eq!(tree("$upper(name)!"), r#"(tpl (upper (var name)) "!")"#);
        assert_eq!(tree("$(max(1, 2 + 3, x))"), "(tpl (max 1 (Add 2 3) (var x)))");
        assert_eq!(tree("$(now())"), "(tpl (now ))");
    }

    #[test]
    fn conversions() {
        assert_eq!(tree("$(number('0x10') + 1)"), r#"(tpl (Add (Number (str "0x10")) 1))"#);
    }

    #[test]
    fn look_back() {
        assert_eq!(tree("$(1) $[1]"), r#"(tpl 1 " " (back 1))"#);
        assert_eq!(tree("${a}${b}$[2]"), "(tpl (var a) (var b) (back 2))");
    }

    #[test]
    fn look_back_must_name_an_existing_value() {
        assert_eq!(syntax_error("$[1]").0, 3);
        assert_eq!(syntax_error("${a}$[2]").0, 7);
        assert!(parse("${a}$[1.0]").is_err());
        assert!(parse("${a}$[0]").is_err());
    }

    #[test]
    fn comments_inside_expressions() {
        assert_eq!(tree("$(1 ## one ## + 2)"), "(tpl (Add 1 2))");
    }

    #[test]
    fn premature_end() {
        assert_eq!(syntax_error("$(1 +"), (6, "unexpected end of expression".into()));
        assert_eq!(syntax_error("$('abc"), (7, "unexpected end of expression".into()));
        assert_eq!(syntax_error("${name"), (7, "unexpected end of expression".into()));
    }

    #[test]
    fn unexpected_terminal_names_the_lexeme() {
        assert_eq!(syntax_error("$(1 2)"), (5, "unexpected '2'".into()));
        assert_eq!(syntax_error("$(* 2)"), (3, "unexpected '*'".into()));
        assert_eq!(syntax_error("$up x"), (5, "unexpected 'x'".into()));
    }

    #[test]
    fn compile_time_call_failures_propagate() {
        assert!(matches!(parse("$(missing())"), Err(Error::Function(_))));
    }
}
