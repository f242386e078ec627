// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! String representation parser for search filters using nom parsers

use log::debug;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, map_res},
    multi::many1,
    sequence::{delimited, preceded, tuple},
    IResult,
};

use super::{Assertion, Filter, SubstringAssertion};
use crate::error::FilterError;

/// Parse a filter string such as `(&(objectClass=person)(cn=al*))`.
///
/// Attribute descriptors are case-folded. Empty assertion values are accepted
/// so that template shapes like `(cn=)` parse as well.
pub fn parse_filter(input: &str) -> Result<Filter, FilterError> {
    let trimmed = input.trim();
    match filter(trimmed) {
        Ok((rest, parsed)) => {
            if rest.trim().is_empty() {
                Ok(parsed)
            } else {
                Err(FilterError::TrailingInput(rest.to_string()))
            }
        }
        Err(e) => {
            debug!("Filter parse failure for '{}': {}", input, e);
            Err(FilterError::Parse {
                input: input.to_string(),
                reason: e.to_string(),
            })
        }
    }
}

fn filter(input: &str) -> IResult<&str, Filter> {
    delimited(
        preceded(multispace0, char('(')),
        preceded(multispace0, filter_component),
        preceded(multispace0, char(')')),
    )(input)
}

fn filter_component(input: &str) -> IResult<&str, Filter> {
    alt((and_filter, or_filter, not_filter, item))(input)
}

fn and_filter(input: &str) -> IResult<&str, Filter> {
    map(preceded(char('&'), many1(filter)), Filter::And)(input)
}

fn or_filter(input: &str) -> IResult<&str, Filter> {
    map(preceded(char('|'), many1(filter)), Filter::Or)(input)
}

fn not_filter(input: &str) -> IResult<&str, Filter> {
    map(preceded(char('!'), filter), |f| Filter::Not(Box::new(f)))(input)
}

fn attribute_description(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == ';')(input)
}

fn filter_type(input: &str) -> IResult<&str, &str> {
    alt((tag(">="), tag("<="), tag("~="), tag("=")))(input)
}

fn raw_value(input: &str) -> IResult<&str, &str> {
    take_while(|c: char| c != '(' && c != ')')(input)
}

fn item(input: &str) -> IResult<&str, Filter> {
    map_res(
        tuple((attribute_description, filter_type, raw_value)),
        |(attr, op, raw)| build_item(attr, op, raw),
    )(input)
}

fn build_item(attr: &str, op: &str, raw: &str) -> Result<Filter, FilterError> {
    let attribute = attr.to_lowercase();

    if op != "=" {
        if raw.contains('*') {
            return Err(FilterError::Parse {
                input: raw.to_string(),
                reason: format!("unescaped '*' in {} assertion", op),
            });
        }
        let assertion = Assertion {
            attribute,
            value: unescape(raw)?,
        };
        return Ok(match op {
            ">=" => Filter::GreaterOrEqual(assertion),
            "<=" => Filter::LessOrEqual(assertion),
            _ => Filter::Approx(assertion),
        });
    }

    if raw == "*" {
        return Ok(Filter::Present(attribute));
    }

    if !raw.contains('*') {
        return Ok(Filter::Equality(Assertion {
            attribute,
            value: unescape(raw)?,
        }));
    }

    let pieces: Vec<&str> = raw.split('*').collect();
    let last_index = pieces.len() - 1;
    let mut substring = SubstringAssertion {
        attribute,
        ..Default::default()
    };

    for (idx, piece) in pieces.iter().enumerate() {
        if piece.is_empty() {
            continue;
        }
        let value = unescape(piece)?;
        if idx == 0 {
            substring.initial = Some(value);
        } else if idx == last_index {
            substring.last = Some(value);
        } else {
            substring.any.push(value);
        }
    }

    Ok(Filter::Substring(substring))
}

/// Decodes `\XX` hex escapes into raw bytes
fn unescape(raw: &str) -> Result<String, FilterError> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0;

    while idx < bytes.len() {
        if bytes[idx] == b'\\' {
            let hex = bytes
                .get(idx + 1..idx + 3)
                .and_then(|pair| std::str::from_utf8(pair).ok())
                .and_then(|pair| u8::from_str_radix(pair, 16).ok());
            match hex {
                Some(byte) => {
                    out.push(byte);
                    idx += 3;
                }
                None => {
                    return Err(FilterError::Parse {
                        input: raw.to_string(),
                        reason: "invalid escape sequence".to_string(),
                    })
                }
            }
        } else {
            out.push(bytes[idx]);
            idx += 1;
        }
    }

    String::from_utf8(out).map_err(|_| FilterError::Parse {
        input: raw.to_string(),
        reason: "escaped value is not valid UTF-8".to_string(),
    })
}
