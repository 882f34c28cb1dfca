pub mod error;
pub mod token;

use error::LexerError;
use nom::Parser;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_until},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace1, not_line_ending},
    combinator::{map, map_res, opt, recognize, value},
    multi::many0,
    sequence::{pair, preceded},
};
use smol_str::SmolStr;
use token::{Token, TokenKind};

use crate::number::Number;
use crate::range::{Position, Range, Span};

macro_rules! define_token_parser {
    ($name:ident, $tag:expr, $kind:expr) => {
        fn $name(input: Span) -> IResult<Span, Token> {
            map(tag($tag), |span: Span| Token::new(span.into(), $kind)).parse(input)
        }
    };
}

/// Splits source text into tokens, terminated by a single `Eof` token.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexerError> {
    let (rest, mut tokens) = match tokens(Span::new(input)) {
        Ok(result) => result,
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => return Err(unexpected(e.input)),
        Err(nom::Err::Incomplete(_)) => return Err(unexpected(Span::new(input))),
    };

    if !rest.fragment().is_empty() {
        return Err(unexpected(rest));
    }

    tokens.push(Token::new(rest.into(), TokenKind::Eof));
    Ok(tokens)
}

fn unexpected(rest: Span) -> LexerError {
    let start: Position = rest.into();
    let range = Range {
        start,
        end: Position::new(start.line, start.column + 1),
    };
    let token = Token::new(range, TokenKind::Eof);

    match rest.fragment().chars().next() {
        Some('"') => LexerError::UnterminatedString(token),
        Some(c) => LexerError::UnexpectedCharacter(token, c),
        None => LexerError::UnexpectedCharacter(token, ' '),
    }
}

fn comment(input: Span) -> IResult<Span, Span> {
    recognize(pair(tag("//"), not_line_ending)).parse(input)
}

fn trivia(input: Span) -> IResult<Span, ()> {
    value((), many0(alt((multispace1, comment)))).parse(input)
}

define_token_parser!(bang_equal, "!=", TokenKind::BangEqual);
define_token_parser!(equal_equal, "==", TokenKind::EqualEqual);
define_token_parser!(less_equal, "<=", TokenKind::LessEqual);
define_token_parser!(greater_equal, ">=", TokenKind::GreaterEqual);
define_token_parser!(bang, "!", TokenKind::Bang);
define_token_parser!(equal, "=", TokenKind::Equal);
define_token_parser!(less, "<", TokenKind::Less);
define_token_parser!(greater, ">", TokenKind::Greater);
define_token_parser!(l_paren, "(", TokenKind::LParen);
define_token_parser!(r_paren, ")", TokenKind::RParen);
define_token_parser!(l_brace, "{", TokenKind::LBrace);
define_token_parser!(r_brace, "}", TokenKind::RBrace);
define_token_parser!(comma, ",", TokenKind::Comma);
define_token_parser!(dot, ".", TokenKind::Dot);
define_token_parser!(minus, "-", TokenKind::Minus);
define_token_parser!(plus, "+", TokenKind::Plus);
define_token_parser!(semi_colon, ";", TokenKind::SemiColon);
define_token_parser!(slash, "/", TokenKind::Slash);
define_token_parser!(star, "*", TokenKind::Star);

fn operators(input: Span) -> IResult<Span, Token> {
    alt((
        bang_equal,
        equal_equal,
        less_equal,
        greater_equal,
        bang,
        equal,
        less,
        greater,
        l_paren,
        r_paren,
        l_brace,
        r_brace,
        comma,
        dot,
        minus,
        plus,
        semi_colon,
        slash,
        star,
    ))
    .parse(input)
}

fn number_literal(input: Span) -> IResult<Span, Token> {
    map_res(
        recognize(pair(digit1, opt(pair(char('.'), digit1)))),
        |span: Span| {
            span.fragment()
                .parse::<f64>()
                .map(|n| Token::new(span.into(), TokenKind::NumberLiteral(Number::new(n))))
        },
    )
    .parse(input)
}

fn string_literal(input: Span) -> IResult<Span, Token> {
    map(
        recognize(pair(char('"'), pair(take_until("\""), char('"')))),
        |span: Span| {
            let fragment = span.fragment();
            let text = fragment[1..fragment.len() - 1].to_string();
            Token::new(span.into(), TokenKind::StringLiteral(text))
        },
    )
    .parse(input)
}

fn ident_or_keyword(input: Span) -> IResult<Span, Token> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        |span: Span| {
            let kind = match *span.fragment() {
                "and" => TokenKind::And,
                "class" => TokenKind::Class,
                "else" => TokenKind::Else,
                "false" => TokenKind::BoolLiteral(false),
                "for" => TokenKind::For,
                "fun" => TokenKind::Fun,
                "if" => TokenKind::If,
                "nil" => TokenKind::Nil,
                "or" => TokenKind::Or,
                "print" => TokenKind::Print,
                "return" => TokenKind::Return,
                "super" => TokenKind::Super,
                "this" => TokenKind::This,
                "true" => TokenKind::BoolLiteral(true),
                "var" => TokenKind::Var,
                "while" => TokenKind::While,
                ident => TokenKind::Ident(SmolStr::new(ident)),
            };
            Token::new(span.into(), kind)
        },
    )
    .parse(input)
}

fn token(input: Span) -> IResult<Span, Token> {
    alt((operators, number_literal, string_literal, ident_or_keyword)).parse(input)
}

fn tokens(input: Span) -> IResult<Span, Vec<Token>> {
    let (rest, tokens) = many0(preceded(trivia, token)).parse(input)?;
    let (rest, _) = trivia(rest)?;
    Ok((rest, tokens))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn kinds(code: &str) -> Vec<TokenKind> {
        tokenize(code)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[rstest]
    #[case("var x = 1;", vec![
        TokenKind::Var,
        TokenKind::Ident("x".into()),
        TokenKind::Equal,
        TokenKind::NumberLiteral(1.0.into()),
        TokenKind::SemiColon,
        TokenKind::Eof,
    ])]
    #[case("a != b == c <= d >= e", vec![
        TokenKind::Ident("a".into()),
        TokenKind::BangEqual,
        TokenKind::Ident("b".into()),
        TokenKind::EqualEqual,
        TokenKind::Ident("c".into()),
        TokenKind::LessEqual,
        TokenKind::Ident("d".into()),
        TokenKind::GreaterEqual,
        TokenKind::Ident("e".into()),
        TokenKind::Eof,
    ])]
    #[case("class classy < super.this", vec![
        TokenKind::Class,
        TokenKind::Ident("classy".into()),
        TokenKind::Less,
        TokenKind::Super,
        TokenKind::Dot,
        TokenKind::This,
        TokenKind::Eof,
    ])]
    #[case("1.5 12. \"hi there\"", vec![
        TokenKind::NumberLiteral(1.5.into()),
        TokenKind::NumberLiteral(12.0.into()),
        TokenKind::Dot,
        TokenKind::StringLiteral("hi there".to_string()),
        TokenKind::Eof,
    ])]
    #[case("// only a comment\n  nil // trailing\n", vec![TokenKind::Nil, TokenKind::Eof])]
    #[case("a / b", vec![
        TokenKind::Ident("a".into()),
        TokenKind::Slash,
        TokenKind::Ident("b".into()),
        TokenKind::Eof,
    ])]
    #[case("", vec![TokenKind::Eof])]
    fn test_tokenize(#[case] code: &str, #[case] expected: Vec<TokenKind>) {
        assert_eq!(kinds(code), expected);
    }

    #[test]
    fn test_token_ranges() {
        let tokens = tokenize("var\n  answer").unwrap();

        assert_eq!(
            tokens[1].range,
            Range {
                start: Position::new(2, 3),
                end: Position::new(2, 9),
            }
        );
        assert_eq!(tokens[2].range.start, Position::new(2, 9));
    }

    #[rstest]
    #[case("var x = @;", LexerError::UnexpectedCharacter(
        Token::new(Range { start: Position::new(1, 9), end: Position::new(1, 10) }, TokenKind::Eof), '@'))]
    #[case("print \"open", LexerError::UnterminatedString(
        Token::new(Range { start: Position::new(1, 7), end: Position::new(1, 8) }, TokenKind::Eof)))]
    fn test_tokenize_error(#[case] code: &str, #[case] expected: LexerError) {
        assert_eq!(tokenize(code), Err(expected));
    }
}
