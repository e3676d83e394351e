//! Parser for the ini-style module state file format.

use std::collections::BTreeMap;

use winnow::ModalResult;
use winnow::Parser;
use winnow::ascii::newline;
use winnow::ascii::space0;
use winnow::ascii::till_line_ending;
use winnow::combinator::cut_err;
use winnow::combinator::delimited;
use winnow::combinator::eof;
use winnow::combinator::opt;
use winnow::combinator::preceded;
use winnow::combinator::repeat;
use winnow::combinator::repeat_till;
use winnow::combinator::separated_pair;
use winnow::combinator::terminated;
use winnow::error::StrContext;
use winnow::error::StrContextValue;
use winnow::token::none_of;
use winnow::token::take_while;

const INVALID_KEY_NAME_SYMBOLS: [char; 3] = ['=', ' ', '\n'];

/// Take all chars until we hit a char that isn't allowed in a key.
fn key(input: &mut &str) -> ModalResult<()> {
    repeat(1.., none_of(INVALID_KEY_NAME_SYMBOLS)).parse_next(input)
}

/// Parse a single key value pair.
/// The delimiter includes two surrounding spaces, i.e. ` = `.
fn key_value<'s>(input: &mut &'s str) -> ModalResult<(&'s str, &'s str)> {
    separated_pair(
        cut_err(key.take())
            .context(StrContext::Label("key"))
            .context(StrContext::Expected(StrContextValue::Description(
                "a key followed by a ` = ` delimiter.",
            ))),
        cut_err((" ", "=", " "))
            .context(StrContext::Label("delimiter"))
            .context(StrContext::Expected(StrContextValue::Description(
                "a '=' that delimits the key value pair, surrounded by a single space.",
            ))),
        till_line_ending,
    )
    .parse_next(input)
}

/// One or multiple newlines.
/// This also handles the case where there might be multiple lines with spaces.
fn newlines(input: &mut &str) -> ModalResult<()> {
    repeat(0.., (newline, space0)).parse_next(input)
}

/// Parse a single line consisting of a key value pair, followed by 0 or more newlines.
fn line<'s>(input: &mut &'s str) -> ModalResult<(&'s str, &'s str)> {
    terminated(key_value, opt(newlines)).parse_next(input)
}

/// Parse the `[module-name]` section header that starts a state file.
fn section_header<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    delimited(
        "[",
        cut_err(take_while(1.., |c| c != ']' && c != '\n'))
            .context(StrContext::Label("section"))
            .context(StrContext::Expected(StrContextValue::Description(
                "a module name enclosed in square brackets.",
            ))),
        cut_err("]"),
    )
    .parse_next(input)
}

/// Parse the content of a whole module state file.
///
/// Returns the section name and the key value pairs below it. Keys occurring
/// multiple times keep their last value; unknown keys are retained so callers
/// can ignore them for forward compatibility.
pub(crate) fn state_file(input: &mut &str) -> ModalResult<(String, BTreeMap<String, String>)> {
    let section = preceded(opt(newlines), terminated(section_header, newlines)).parse_next(input)?;

    let (raw_items, _terminator): (Vec<(&str, &str)>, _) =
        repeat_till(0.., line, eof).parse_next(input)?;

    let mut items = BTreeMap::new();
    for (key, value) in raw_items {
        items.insert(key.to_string(), value.to_string());
    }

    Ok((section.to_string(), items))
}
