//! Field declaration parser using nom.
//!
//! Entities declared in the configuration file list their fields in a
//! compact, SQL-like form:
//!
//! ```text
//! id INT UNSIGNED PRIMARY KEY
//! ┬─ ─────┬──── ─────┬─────
//! │       │          └── Optional primary-key marker
//! │       └── SQL type, copied verbatim into the history table
//! └── Column name
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::{anychar, multispace0, multispace1},
    combinator::{eof, value},
    multi::many_till,
    sequence::tuple,
    IResult,
};

use crate::error::{HistoryError, HistoryResult};
use crate::schema::FieldSpec;

/// Parse a single field declaration.
pub fn parse_field(input: &str) -> HistoryResult<FieldSpec> {
    let input = input.trim();

    match parse_field_decl(input) {
        Ok(("", field)) => Ok(field),
        Ok((remaining, _)) => Err(HistoryError::field_spec(
            input.len() - remaining.len(),
            format!("Unexpected trailing content: '{}'", remaining),
        )),
        Err(e) => Err(HistoryError::field_spec(
            0,
            format!("Parse failed for '{}': {:?}", input, e),
        )),
    }
}

fn parse_field_decl(input: &str) -> IResult<&str, FieldSpec> {
    let (input, name) = parse_identifier(input)?;
    let (input, _) = multispace1(input)?;
    let (input, (type_chars, primary_key)) = many_till(anychar, parse_type_end)(input)?;

    let sql_type: String = type_chars.into_iter().collect();
    let sql_type = sql_type.trim();
    if sql_type.is_empty() || has_primary_key_marker(sql_type) {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }

    Ok((input, FieldSpec::new(name, sql_type, primary_key)))
}

/// `PRIMARY KEY` is only accepted at the end of a declaration.
fn has_primary_key_marker(sql_type: &str) -> bool {
    let tokens: Vec<&str> = sql_type.split_whitespace().collect();
    tokens
        .windows(2)
        .any(|w| w[0].eq_ignore_ascii_case("primary") && w[1].eq_ignore_ascii_case("key"))
}

/// Parse a column name.
fn parse_identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

/// End of the SQL type: either a trailing `PRIMARY KEY` or end of input.
fn parse_type_end(input: &str) -> IResult<&str, bool> {
    alt((
        value(
            true,
            tuple((
                multispace1,
                tag_no_case("primary"),
                multispace1,
                tag_no_case("key"),
                multispace0,
                eof,
            )),
        ),
        value(false, eof),
    ))(input)
}
