//! Source text to tokens.
//!
//! A program is a flat run of symbols, literals and line breaks. Symbols are
//! matched longest first against the vocabulary and the fixed combinator
//! table, so multi-character primitives win over their prefixes.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_while,
    character::complete::{anychar, char, digit1, multispace0},
    combinator::{cut, map, opt, recognize, value},
    error::ErrorKind,
    multi::separated_list0,
    sequence::{pair, preceded},
};

use crate::ast::{IntType, Value};
use crate::builtinops::Vocabulary;
use crate::link::{Arity, LoopResult};
use crate::program::{Quick, Token};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Symbols that are not primitives: combinators, separators and the register
fn fixed_token(symbol: &str) -> Option<Token> {
    let quick = match symbol {
        "'" => Quick::Flat,
        "@" => Quick::Swap,
        "/" => Quick::Reduce,
        "\\" => Quick::Scan,
        "{" => Quick::FixLeft,
        "}" => Quick::FixRight,
        "e" => Quick::Each,
        "z" => Quick::ZipWith,
        "s" => Quick::SelfReference,
        "k" => Quick::Sparse,
        "n" => Quick::Repeat,
        "w" => Quick::While,
        "#" => Quick::Search,
        "?" => Quick::Conditional,
        "c" => Quick::Store,
        "o" => Quick::NiladGroup,
        "$" => Quick::MonadGroup,
        "y" => Quick::DyadGroup,
        "`b" => Quick::Previous(Arity::Niladic),
        "`m" => Quick::Previous(Arity::Monadic),
        "`d" => Quick::Previous(Arity::Dyadic),
        "`M" => Quick::Next(Arity::Monadic),
        "`D" => Quick::Next(Arity::Dyadic),
        "`i" => Quick::Indexed(Arity::Niladic),
        "`j" => Quick::Indexed(Arity::Monadic),
        "`k" => Quick::Indexed(Arity::Dyadic),
        "`n" => Quick::CumulativeRepeat,
        "`w" => Quick::CumulativeWhile,
        "`f" => Quick::Filter,
        "`F" => Quick::FilterFalse,
        "`L" => Quick::Loop(LoopResult::Last),
        "`A" => Quick::Loop(LoopResult::All),
        "`C" => Quick::Loop(LoopResult::Cycle),
        "r" => return Some(Token::Register),
        "ø" => return Some(Token::Separator(Arity::Niladic)),
        "µ" => return Some(Token::Separator(Arity::Monadic)),
        "ð" => return Some(Token::Separator(Arity::Dyadic)),
        _ => return None,
    };
    Some(Token::Quick(quick))
}

/// Longest fixed symbol, in characters
const LONGEST_FIXED: usize = 2;

fn char_offset(source: &str, rest: &str) -> usize {
    let consumed = source.len().saturating_sub(rest.len());
    source[..consumed].chars().count()
}

/// Convert a nom failure into a structured parse error
fn to_parse_error(source: &str, error: nom::Err<nom::error::Error<&str>>) -> Error {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let offset = char_offset(source, e.input);
            let (kind, message) = match e.code {
                ErrorKind::TooLarge => (
                    ParseErrorKind::TooDeeplyNested,
                    format!("List literal too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                ),
                ErrorKind::Digit => (
                    ParseErrorKind::ImplementationLimit,
                    "Integer literal out of range".to_owned(),
                ),
                _ if e.input.is_empty() => (
                    ParseErrorKind::Incomplete,
                    "Unexpected end of input".to_owned(),
                ),
                _ => {
                    let near: String = e.input.chars().take(10).collect();
                    (
                        ParseErrorKind::InvalidSyntax,
                        format!("Invalid syntax near '{near}'"),
                    )
                }
            };
            ParseError::with_context(kind, message, source, offset).into()
        }
        nom::Err::Incomplete(_) => {
            ParseError::from_message(ParseErrorKind::Incomplete, "Incomplete input").into()
        }
    }
}

fn unknown_token(source: &str, rest: &str) -> Error {
    let found = rest.chars().next().map(String::from);
    let message = match &found {
        Some(symbol) => format!("Unknown symbol '{symbol}'"),
        None => "Unknown symbol".to_owned(),
    };
    ParseError::with_context_and_found(
        ParseErrorKind::UnknownToken,
        message,
        source,
        char_offset(source, rest),
        found,
    )
    .into()
}

/// Spaces, tabs and carriage returns separate tokens and are otherwise ignored
fn blank(input: &str) -> IResult<&str, &str> {
    take_while(|c: char| matches!(c, ' ' | '\t' | '\r')).parse(input)
}

/// Parse a number literal: an optional minus sign directly followed by digits,
/// with an optional fractional part
fn parse_number(input: &str) -> IResult<&str, Value> {
    let (rest, number_str) = recognize(pair(
        pair(opt(char('-')), digit1),
        opt(pair(char('.'), digit1)),
    ))
    .parse(input)?;

    if number_str.contains('.') {
        return match number_str.parse::<f64>() {
            Ok(x) => Ok((rest, Value::float(x))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                ErrorKind::Float,
            ))),
        };
    }
    match number_str.parse::<IntType>() {
        Ok(n) => Ok((rest, Value::int(n))),
        Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::Digit,
        ))),
    }
}

/// Parse a character literal: `”` followed by any single character
fn parse_char_literal(input: &str) -> IResult<&str, Value> {
    map(preceded(char('”'), cut(anychar)), Value::Char).parse(input)
}

/// Parse a string literal into a character sequence
fn parse_string(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = Vec::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => {
                return Ok((char_iter.as_str(), Value::list(chars.into_iter().map(Value::Char))));
            }
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => chars.push('\n'),
                    Some('t') => chars.push('\t'),
                    Some('r') => chars.push('\r'),
                    Some('\\') => chars.push('\\'),
                    Some('"') => chars.push('"'),
                    Some(_) => {
                        return Err(nom::Err::Failure(nom::error::Error::new(
                            remaining,
                            ErrorKind::Char,
                        )));
                    }
                    // Backslash at end of input
                    None => {
                        return Err(nom::Err::Failure(nom::error::Error::new(
                            char_iter.as_str(),
                            ErrorKind::Char,
                        )));
                    }
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                chars.push(ch);
                remaining = char_iter.as_str();
            }
            None => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    remaining,
                    ErrorKind::Char,
                )));
            }
        }
    }
}

/// Parse a bracketed list literal; elements are literals separated by commas
fn parse_list(input: &str, depth: usize) -> IResult<&str, Value> {
    let (input, _) = char('[').parse(input)?;
    if depth >= MAX_PARSE_DEPTH {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }

    let (input, elements) = separated_list0(preceded(multispace0, char(',')), |input| {
        parse_element(input, depth + 1)
    })
    .parse(input)?;

    let (input, _) = preceded(multispace0, cut(char(']'))).parse(input)?;
    Ok((input, Value::list(elements)))
}

fn parse_element(input: &str, depth: usize) -> IResult<&str, Value> {
    preceded(
        multispace0,
        alt((
            |input| parse_list(input, depth),
            parse_number,
            parse_char_literal,
            parse_string,
        )),
    )
    .parse(input)
}

/// Match the longest symbol known to the vocabulary or the fixed table
fn parse_symbol<'a>(
    input: &'a str,
    vocabulary: &Vocabulary,
    longest: usize,
) -> IResult<&'a str, Token> {
    let ends: Vec<usize> = input
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take(longest)
        .collect();

    for &end in ends.iter().rev() {
        let candidate = &input[..end];
        if let Some(primitive) = vocabulary.get(candidate) {
            return Ok((&input[end..], Token::Primitive(primitive)));
        }
        if let Some(token) = fixed_token(candidate) {
            return Ok((&input[end..], token));
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(input, ErrorKind::Tag)))
}

fn parse_token<'a>(
    input: &'a str,
    vocabulary: &Vocabulary,
    longest: usize,
) -> IResult<&'a str, Token> {
    alt((
        value(Token::LineBreak, alt((char('\n'), char('¶')))),
        map(parse_number, Token::Literal),
        map(parse_char_literal, Token::Literal),
        map(parse_string, Token::Literal),
        map(|input| parse_list(input, 0), Token::Literal),
        |input| parse_symbol(input, vocabulary, longest),
    ))
    .parse(input)
}

/// Split program text into tokens, resolving primitive symbols against
/// `vocabulary`.
pub fn tokenize(source: &str, vocabulary: &Vocabulary) -> Result<Vec<Token>, Error> {
    let longest = vocabulary
        .symbols()
        .map(|symbol| symbol.chars().count())
        .max()
        .unwrap_or(0)
        .max(LONGEST_FIXED);

    let mut tokens = Vec::new();
    let mut input = source;
    loop {
        let (rest, _) = blank(input).map_err(|e| to_parse_error(source, e))?;
        if rest.is_empty() {
            break;
        }
        match parse_token(rest, vocabulary, longest) {
            Ok((remaining, token)) => {
                tokens.push(token);
                input = remaining;
            }
            // Nothing recognised the input at this position
            Err(nom::Err::Error(_)) => return Err(unknown_token(source, rest)),
            Err(e) => return Err(to_parse_error(source, e)),
        }
    }
    Ok(tokens)
}
