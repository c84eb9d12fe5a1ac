use crate::{BinaryOperation, Expression, Parameter};
use std::{
    fmt::{self, Display, Formatter},
    iter::Peekable,
    ops::Range,
    str::FromStr,
};
use thiserror::Error;

/// How deeply expressions may nest before the parser gives up.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Parse an [`Expression`] tree from some text.
pub fn parse(s: &str) -> Result<Expression, ParseError> {
    parse_with_depth(s, DEFAULT_MAX_DEPTH)
}

/// Parse an [`Expression`], rejecting anything nested more than `max_depth`
/// levels deep (parentheses, unary operators, and exponents all count).
pub fn parse_with_depth(
    s: &str,
    max_depth: usize,
) -> Result<Expression, ParseError> {
    Parser::new(s, max_depth).parse()
}

impl FromStr for Expression {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> { parse(s) }
}

/// A simple recursive descent parser (`LL(1)`) for converting a string into an
/// expression tree.
///
/// The grammar:
///
/// ```text
/// expression     := term (("+" | "-") term)*
///
/// term           := unary (("*" | "/") unary | power)*
///
/// unary          := "-" unary
///                 | "+" unary
///                 | power
///
/// power          := factor ("^" unary)?
///
/// factor         := variable_or_function_call
///                 | "(" expression ")"
///                 | NUMBER
///
/// variable_or_function_call = IDENTIFIER "(" expression ")"
///                           | IDENTIFIER
/// ```
///
/// A `power` directly after another operand (`2x`, `3(x + 1)`) is an implicit
/// multiplication.
#[derive(Debug, Clone)]
pub(crate) struct Parser<'a> {
    tokens: Peekable<Tokens<'a>>,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(src: &'a str, max_depth: usize) -> Self {
        Parser {
            tokens: Tokens::new(src).peekable(),
            depth: 0,
            max_depth,
        }
    }

    pub(crate) fn parse(mut self) -> Result<Expression, ParseError> {
        let expr = self.expression()?;

        match self.tokens.next() {
            None => Ok(expr),
            Some(Ok(token)) => Err(ParseError::TrailingInput {
                found: token.kind,
                span: token.span,
            }),
            Some(Err(e)) => Err(e),
        }
    }

    fn peek(&mut self) -> Option<TokenKind> {
        self.tokens
            .peek()
            .and_then(|result| result.as_ref().ok())
            .map(|tok| tok.kind)
    }

    fn advance(&mut self) -> Result<Token<'a>, ParseError> {
        match self.tokens.next() {
            Some(result) => result,
            None => Err(ParseError::UnexpectedEndOfInput),
        }
    }

    fn expression(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.term()?;

        while let Some(kind) = self.peek() {
            if kind != TokenKind::Plus && kind != TokenKind::Minus {
                break;
            }

            // skip past the operator
            let _ = self.advance()?;
            // and parse the second bit
            let right = self.term()?;
            left = binary(left, right, kind.as_binary_op());
        }

        Ok(left)
    }

    fn term(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.unary()?;

        loop {
            match self.peek() {
                Some(kind @ TokenKind::Times)
                | Some(kind @ TokenKind::Divide) => {
                    let _ = self.advance()?;
                    let right = self.unary()?;
                    left = binary(left, right, kind.as_binary_op());
                },
                Some(TokenKind::Number)
                | Some(TokenKind::Identifier)
                | Some(TokenKind::OpenParen) => {
                    let right = self.power()?;
                    left = left * right;
                },
                _ => return Ok(left),
            }
        }
    }

    fn unary(&mut self) -> Result<Expression, ParseError> {
        if self.depth >= self.max_depth {
            return Err(ParseError::TooDeep {
                limit: self.max_depth,
            });
        }

        self.depth += 1;
        let result = self.unary_operand();
        self.depth -= 1;

        result
    }

    fn unary_operand(&mut self) -> Result<Expression, ParseError> {
        match self.peek() {
            Some(TokenKind::Minus) => {
                let _ = self.advance()?;
                self.unary().map(|operand| -operand)
            },
            Some(TokenKind::Plus) => {
                let _ = self.advance()?;
                self.unary()
            },
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expression, ParseError> {
        let base = self.factor()?;

        if self.peek() == Some(TokenKind::Caret) {
            let _ = self.advance()?;
            let exponent = self.unary()?;
            Ok(base.pow(exponent))
        } else {
            Ok(base)
        }
    }

    fn factor(&mut self) -> Result<Expression, ParseError> {
        let expected = &[
            TokenKind::Number,
            TokenKind::Identifier,
            TokenKind::Minus,
            TokenKind::OpenParen,
        ];

        match self.peek() {
            Some(TokenKind::Number) => {
                return self.number();
            },
            Some(TokenKind::Identifier) => {
                return self.variable_or_function_call()
            },
            Some(TokenKind::OpenParen) => {
                let _ = self.advance()?;
                let expr = self.expression()?;
                self.close_paren()?;
                return Ok(expr);
            },
            _ => {},
        }

        // we couldn't parse the factor, return a nice error
        match self.tokens.next() {
            Some(Ok(Token { span, kind, .. })) => {
                Err(ParseError::UnexpectedToken {
                    found: kind,
                    expected,
                    span,
                })
            },
            Some(Err(e)) => Err(e),
            None => Err(ParseError::UnexpectedEndOfInput),
        }
    }

    fn close_paren(&mut self) -> Result<(), ParseError> {
        let Token { kind, span, .. } = self.advance()?;

        if kind == TokenKind::CloseParen {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                found: kind,
                span,
                expected: &[TokenKind::CloseParen],
            })
        }
    }

    fn variable_or_function_call(&mut self) -> Result<Expression, ParseError> {
        let ident = self.advance()?;
        debug_assert_eq!(ident.kind, TokenKind::Identifier);

        if self.peek() == Some(TokenKind::OpenParen) {
            self.function_call(ident)
        } else {
            Ok(Expression::Parameter(Parameter::named(ident.text)))
        }
    }

    fn function_call(
        &mut self,
        identifier: Token<'a>,
    ) -> Result<Expression, ParseError> {
        let open_paren = self.advance()?;
        debug_assert_eq!(open_paren.kind, TokenKind::OpenParen);

        let argument = self.expression()?;
        self.close_paren()?;

        Ok(Expression::call(identifier.text, argument))
    }

    fn number(&mut self) -> Result<Expression, ParseError> {
        let token = self
            .tokens
            .next()
            .ok_or(ParseError::UnexpectedEndOfInput)??;

        debug_assert_eq!(token.kind, TokenKind::Number);
        let number =
            token.text.parse().expect("Guaranteed correct by the lexer");

        Ok(Expression::Constant(number))
    }
}

fn binary(
    left: Expression,
    right: Expression,
    op: BinaryOperation,
) -> Expression {
    Expression::Binary {
        left: Box::new(left),
        right: Box::new(right),
        op,
    }
}

/// Possible errors that may occur while parsing a statement.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("invalid character {character:?} at index {index}")]
    InvalidCharacter { character: char, index: usize },
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,
    #[error(
        "found {found} at {span:?} but expected {}",
        expected_list(.expected)
    )]
    UnexpectedToken {
        found: TokenKind,
        span: Range<usize>,
        expected: &'static [TokenKind],
    },
    /// The parser finished before the end of the input, usually because of
    /// an unbalanced closing parenthesis.
    #[error("unexpected {found} at {span:?}")]
    TrailingInput { found: TokenKind, span: Range<usize> },
    #[error("the expression is nested more than {limit} levels deep")]
    TooDeep { limit: usize },
    #[error("the statement is empty")]
    EmptyStatement,
    /// Something like `a = b = c`.
    #[error("an equation must contain exactly one \"=\"")]
    ChainedEquality,
    #[error("no unknown to solve for")]
    NoUnknowns,
}

fn expected_list(expected: &[TokenKind]) -> String {
    let names: Vec<_> = expected.iter().map(ToString::to_string).collect();

    match names.split_last() {
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} or {}", rest.join(", "), last),
        None => String::from("nothing"),
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Tokens<'a> {
    src: &'a str,
    cursor: usize,
}

impl<'a> Tokens<'a> {
    fn new(src: &'a str) -> Self { Tokens { src, cursor: 0 } }

    fn rest(&self) -> &'a str { &self.src[self.cursor..] }

    fn peek(&self) -> Option<char> { self.rest().chars().next() }

    fn peek_second(&self) -> Option<char> { self.rest().chars().nth(1) }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.cursor += c.len_utf8();
        Some(c)
    }

    fn chomp(
        &mut self,
        kind: TokenKind,
        characters: usize,
    ) -> Option<Result<Token<'a>, ParseError>> {
        let start = self.cursor;
        for _ in 0..characters {
            self.advance()?;
        }
        let end = self.cursor;

        Some(Ok(Token::from_text(self.src, start..end, kind)))
    }

    fn take_while<P>(
        &mut self,
        mut predicate: P,
    ) -> Option<(&'a str, Range<usize>)>
    where
        P: FnMut(char) -> bool,
    {
        let start = self.cursor;

        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }

            self.advance();
        }

        let end = self.cursor;

        if start != end {
            let text = &self.src[start..end];
            Some((text, start..end))
        } else {
            None
        }
    }

    fn chomp_integer(&mut self) {
        let _ = self.take_while(|c| c.is_ascii_digit());
    }

    fn chomp_number(&mut self) -> Token<'a> {
        let start = self.cursor;
        self.chomp_integer();

        if self.peek() == Some('.') {
            // skip past the decimal
            self.advance();
            self.chomp_integer();
        }

        let end = self.cursor;

        Token::from_text(self.src, start..end, TokenKind::Number)
    }

    fn chomp_identifier(&mut self) -> Token<'a> {
        let mut seen_first_character = false;
        let start = self.cursor;

        let _ = self.take_while(|c| {
            if seen_first_character {
                c.is_ascii_alphanumeric() || c == '_'
            } else {
                seen_first_character = true;
                c.is_ascii_alphabetic() || c == '_'
            }
        });

        Token::from_text(self.src, start..self.cursor, TokenKind::Identifier)
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Result<Token<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            return match self.peek()? {
                space if space.is_whitespace() => {
                    self.advance();
                    continue;
                },
                '(' => self.chomp(TokenKind::OpenParen, 1),
                ')' => self.chomp(TokenKind::CloseParen, 1),
                '+' => self.chomp(TokenKind::Plus, 1),
                '-' => self.chomp(TokenKind::Minus, 1),
                '*' if self.peek_second() == Some('*') => {
                    self.chomp(TokenKind::Caret, 2)
                },
                '*' => self.chomp(TokenKind::Times, 1),
                '/' => self.chomp(TokenKind::Divide, 1),
                '^' => self.chomp(TokenKind::Caret, 1),
                '_' | 'a'..='z' | 'A'..='Z' => {
                    Some(Ok(self.chomp_identifier()))
                },
                '0'..='9' => Some(Ok(self.chomp_number())),
                '.' if self
                    .peek_second()
                    .map(|c| c.is_ascii_digit())
                    .unwrap_or(false) =>
                {
                    Some(Ok(self.chomp_number()))
                },
                other => Some(Err(ParseError::InvalidCharacter {
                    character: other,
                    index: self.cursor,
                })),
            };
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token<'a> {
    text: &'a str,
    span: Range<usize>,
    kind: TokenKind,
}

impl<'a> Token<'a> {
    fn from_text(
        original_source: &'a str,
        span: Range<usize>,
        kind: TokenKind,
    ) -> Self {
        Token {
            text: &original_source[span.clone()],
            span,
            kind,
        }
    }
}

/// The kinds of token that can appear in an [`Expression`]'s text form.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TokenKind {
    Identifier,
    Number,
    OpenParen,
    CloseParen,
    Plus,
    Minus,
    Times,
    Divide,
    Caret,
}

impl TokenKind {
    fn as_binary_op(self) -> BinaryOperation {
        match self {
            TokenKind::Plus => BinaryOperation::Plus,
            TokenKind::Minus => BinaryOperation::Minus,
            TokenKind::Times => BinaryOperation::Times,
            TokenKind::Divide => BinaryOperation::Divide,
            TokenKind::Caret => BinaryOperation::Power,
            other => unreachable!("{:?} is not a binary op", other),
        }
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Identifier => "an identifier",
            TokenKind::Number => "a number",
            TokenKind::OpenParen => "\"(\"",
            TokenKind::CloseParen => "\")\"",
            TokenKind::Plus => "\"+\"",
            TokenKind::Minus => "\"-\"",
            TokenKind::Times => "\"*\"",
            TokenKind::Divide => "\"/\"",
            TokenKind::Caret => "\"^\"",
        };

        f.write_str(name)
    }
}

#[cfg(test)]
mod tokenizer_tests {
    use super::*;

    macro_rules! tokenize_test {
        ($name:ident, $src:expr, $should_be:expr) => {
            #[test]
            fn $name() {
                let mut tokens = Tokens::new($src);

                let got = tokens.next().unwrap().unwrap();

                let Range { start, end } = got.span;
                assert_eq!(start, 0);
                assert_eq!(end, $src.len());
                assert_eq!(got.kind, $should_be);

                assert!(
                    tokens.next().is_none(),
                    "{:?} should be empty",
                    tokens
                );
            }
        };
    }

    tokenize_test!(open_paren, "(", TokenKind::OpenParen);
    tokenize_test!(close_paren, ")", TokenKind::CloseParen);
    tokenize_test!(plus, "+", TokenKind::Plus);
    tokenize_test!(minus, "-", TokenKind::Minus);
    tokenize_test!(times, "*", TokenKind::Times);
    tokenize_test!(divide, "/", TokenKind::Divide);
    tokenize_test!(caret, "^", TokenKind::Caret);
    tokenize_test!(double_star_is_a_power, "**", TokenKind::Caret);
    tokenize_test!(single_digit_integer, "3", TokenKind::Number);
    tokenize_test!(multi_digit_integer, "31", TokenKind::Number);
    tokenize_test!(number_with_trailing_dot, "31.", TokenKind::Number);
    tokenize_test!(number_with_leading_dot, ".5", TokenKind::Number);
    tokenize_test!(simple_decimal, "3.14", TokenKind::Number);
    tokenize_test!(simple_identifier, "x", TokenKind::Identifier);
    tokenize_test!(longer_identifier, "hello", TokenKind::Identifier);
    tokenize_test!(
        identifiers_can_have_underscores,
        "hello_world",
        TokenKind::Identifier
    );
    tokenize_test!(
        identifiers_can_start_with_underscores,
        "_hello_world",
        TokenKind::Identifier
    );
    tokenize_test!(
        identifiers_can_contain_numbers,
        "var5",
        TokenKind::Identifier
    );

    #[test]
    fn reject_unknown_characters() {
        let mut tokens = Tokens::new("1 $ 2");

        assert!(tokens.next().unwrap().is_ok());
        assert_eq!(
            tokens.next().unwrap(),
            Err(ParseError::InvalidCharacter {
                character: '$',
                index: 2
            })
        );
    }
}

#[cfg(test)]
mod parser_tests {
    use super::*;

    macro_rules! parser_test {
        ($name:ident, $src:expr) => {
            parser_test!($name, $src, $src);
        };
        ($name:ident, $src:expr, $should_be:expr) => {
            #[test]
            fn $name() {
                let got = parse($src).unwrap();

                let round_tripped = got.to_string();
                assert_eq!(round_tripped, $should_be);
            }
        };
    }

    parser_test!(simple_integer, "1");
    parser_test!(one_plus_one, "1 + 1");
    parser_test!(one_plus_one_plus_negative_one, "1 + -1");
    parser_test!(one_plus_one_times_three, "1 + 1*3");
    parser_test!(one_plus_one_all_times_three, "(1 + 1)*3");
    parser_test!(negative_one, "-1");
    parser_test!(negative_one_plus_one, "-1 + 1");
    parser_test!(negative_one_plus_x, "-1 + x");
    parser_test!(number_in_parens, "(1)", "1");
    parser_test!(bimdas, "1*2 + 3*4/(5 - 2)*1 - 3");
    parser_test!(subtraction_is_left_associative, "1 - 2 - 3");
    parser_test!(explicit_right_grouping, "1 - (2 - 3)");
    parser_test!(division_is_left_associative, "8/4/2");
    parser_test!(power_is_right_associative, "2^3^2");
    parser_test!(power_binds_tighter_than_negation, "-2^2", "-2^2");
    parser_test!(negative_exponent, "2^-1", "2^(-1)");
    parser_test!(python_style_power, "x**2", "x^2");
    parser_test!(implicit_multiplication, "2x + 3", "2*x + 3");
    parser_test!(implicit_multiplication_with_parens, "3(x + 1)", "3*(x + 1)");
    parser_test!(adjacent_parens_multiply, "(x + 1)(x - 1)", "(x + 1)*(x - 1)");
    parser_test!(coefficient_and_power, "4x^2", "4*x^2");
    parser_test!(unary_plus, "+x", "x");
    parser_test!(function_call, "sin(1)", "sin(1)");
    parser_test!(function_call_with_expression, "sin(1/0)");
    parser_test!(
        function_calls_function_calls_function_with_variable,
        "foo(bar(baz(pi)))"
    );
    parser_test!(implicit_function_product, "sin(x)cos(x)", "sin(x)*cos(x)");

    #[test]
    fn unbalanced_open_paren() {
        let got = parse("(1 + 2").unwrap_err();

        assert_eq!(got, ParseError::UnexpectedEndOfInput);
    }

    #[test]
    fn unbalanced_close_paren() {
        let got = parse("1 + 2)").unwrap_err();

        assert_eq!(
            got,
            ParseError::TrailingInput {
                found: TokenKind::CloseParen,
                span: 5..6
            }
        );
    }

    #[test]
    fn dangling_operator() {
        let got = parse("1 +").unwrap_err();

        assert_eq!(got, ParseError::UnexpectedEndOfInput);
    }

    #[test]
    fn operator_where_operand_expected() {
        let got = parse("1 + * 2").unwrap_err();

        match got {
            ParseError::UnexpectedToken { found, span, .. } => {
                assert_eq!(found, TokenKind::Times);
                assert_eq!(span, 4..5);
            },
            other => panic!("Unexpected error: {:?}", other),
        }
    }

    #[test]
    fn invalid_character_is_reported() {
        let got = parse("2 # 3").unwrap_err();

        assert_eq!(
            got,
            ParseError::InvalidCharacter {
                character: '#',
                index: 2
            }
        );
    }

    #[test]
    fn deeply_nested_input_is_rejected() {
        let src = format!("{}1{}", "(".repeat(20), ")".repeat(20));

        assert!(parse_with_depth(&src, 50).is_ok());
        assert_eq!(
            parse_with_depth(&src, 10).unwrap_err(),
            ParseError::TooDeep { limit: 10 }
        );
    }

    #[test]
    fn error_messages_are_readable() {
        let err = parse("1 + * 2").unwrap_err();

        assert_eq!(
            err.to_string(),
            "found \"*\" at 4..5 but expected a number, an identifier, \"-\" \
             or \"(\""
        );
    }
}
