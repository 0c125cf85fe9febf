//! The SCPI line grammar, distilled: statement splitting, leading-`:`
//! prefix reuse, special-command heads, and per-keyword channel-suffix
//! extraction. Nothing in this module performs I/O or touches a command
//! tree — it only turns wire text into the small set of tokens the
//! dispatcher needs to walk the tree.

use crate::error::ProtocolError;

/// Number of trailing decimal digits recognized as a channel index.
///
/// This implementation documents `CHNUMSIZE = 2`: `CHAN03` addresses
/// channel 3.
pub const CHNUMSIZE: usize = 2;

/// What follows a command keyword in a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trailing {
    /// A trailing `?` — a read.
    Query,
    /// A space followed by a non-empty argument payload — a write.
    Write(String),
    /// Neither — a write with no value, or (mid-statement) just descent.
    None,
}

/// The parsed head of a special command (`*NAME`, with the `*` already stripped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialHead {
    pub name: String,
    pub trailing: Trailing,
}

/// One `:`-separated keyword within a normal (non-special) statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSegment {
    pub keyword: String,
    pub channel: Option<u32>,
    pub trailing: Trailing,
}

/// Strips trailing line terminators (`\r`, `\n`, `;`, in any mix) and splits
/// the remaining text into `;`-separated statements, in left-to-right order.
/// Returns an empty vector for a line that is empty after stripping.
pub fn split_statements(line: &str) -> Vec<&str> {
    let trimmed = line.trim_end_matches(|c| c == '\r' || c == '\n' || c == ';');
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split(';').map(str::trim).collect()
}

/// Expands leading-`:` prefix reuse across a line's statements.
///
/// For a statement `i > 0` that begins with `:`, the prefix of the raw
/// statement `i-1` up to (but not including) its last `:` is prepended.
/// A leading `:` on the first of *several* statements has no predecessor
/// to inherit a prefix from and is a
/// [`ProtocolError::LeadingColonOnFirstStatement`]. A leading `:` on a
/// lone statement isn't a reuse attempt at all — there's nothing else in
/// the line for it to refer to — so it's just an explicit root-relative
/// address and is stripped. Statements that don't start with `:` pass
/// through unchanged.
pub fn expand_prefixes(statements: &[&str]) -> Vec<Result<String, ProtocolError>> {
    let mut out = Vec::with_capacity(statements.len());
    for (i, stmt) in statements.iter().enumerate() {
        if let Some(rest) = stmt.strip_prefix(':') {
            if i == 0 {
                if statements.len() == 1 {
                    out.push(Ok(rest.to_string()));
                } else {
                    out.push(Err(ProtocolError::LeadingColonOnFirstStatement));
                }
            } else {
                let prev = statements[i - 1];
                let prefix = match prev.rfind(':') {
                    Some(idx) => &prev[..idx],
                    None => prev,
                };
                out.push(Ok(format!("{}{}", prefix, stmt)));
            }
        } else {
            out.push(Ok((*stmt).to_string()));
        }
    }
    out
}

/// Splits `command ( '?' | ' ' args )?` into its head and trailing part.
/// `args` is trimmed; an empty `args` after a space becomes [`Trailing::None`].
fn split_head(s: &str) -> (&str, Trailing) {
    match s.find(|c: char| c == '?' || c == ' ' || c == '\t') {
        Some(idx) => {
            let head = &s[..idx];
            if s.as_bytes()[idx] == b'?' {
                (head, Trailing::Query)
            } else {
                let args = s[idx + 1..].trim();
                if args.is_empty() {
                    (head, Trailing::None)
                } else {
                    (head, Trailing::Write(args.to_string()))
                }
            }
        }
        None => (s, Trailing::None),
    }
}

/// Extracts a trailing `chnumsize`-digit channel suffix from a keyword, if
/// present. Extraction is greedy on exactly `chnumsize` digits: shorter
/// runs of trailing digits are left as part of the keyword text.
fn extract_channel(head: &str, chnumsize: usize) -> (&str, Option<u32>) {
    if head.len() > chnumsize {
        let split_at = head.len() - chnumsize;
        // split_at must land on a char boundary; keywords are ASCII in practice.
        if head.is_char_boundary(split_at) {
            let (rest, suffix) = head.split_at(split_at);
            if suffix.len() == chnumsize && suffix.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(n) = suffix.parse::<u32>() {
                    return (rest, Some(n));
                }
            }
        }
    }
    (head, None)
}

/// Parses a special command's body (the statement text with its leading
/// `*` already stripped).
pub fn parse_special_head(body: &str) -> Result<SpecialHead, ProtocolError> {
    if body.contains(':') {
        return Err(ProtocolError::ColonInSpecialCommand(body.to_string()));
    }
    let (head, trailing) = split_head(body);
    Ok(SpecialHead {
        name: head.to_string(),
        trailing,
    })
}

/// Splits a normal command's body on `:` into raw keyword segments, in order.
pub fn split_keywords(body: &str) -> Vec<&str> {
    body.split(':').collect()
}

/// Parses a single `:`-separated keyword segment: extracts the channel
/// suffix (if any) and the trailing query/write/none marker.
pub fn parse_keyword_segment(segment: &str, chnumsize: usize) -> KeywordSegment {
    let (head, trailing) = split_head(segment);
    let (keyword, channel) = extract_channel(head, chnumsize);
    KeywordSegment {
        keyword: keyword.to_string(),
        channel,
        trailing,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strips_mixed_trailing_terminators() {
        assert_eq!(split_statements("*IDN?\r\n"), vec!["*IDN?"]);
        assert_eq!(split_statements("*IDN?;;\n"), vec!["*IDN?", ""]);
        assert_eq!(split_statements("\r\n"), Vec::<&str>::new());
        assert_eq!(split_statements(""), Vec::<&str>::new());
    }

    #[test]
    fn splits_multiple_statements() {
        assert_eq!(
            split_statements("SOUR:VOLT?;:CURR?\n"),
            vec!["SOUR:VOLT?", ":CURR?"]
        );
    }

    #[test]
    fn expands_leading_colon_prefix() {
        let stmts = split_statements("MEAS:VOLT?;:CURR?\n");
        let expanded = expand_prefixes(&stmts);
        assert_eq!(expanded[0].as_deref(), Ok("MEAS:VOLT?"));
        assert_eq!(expanded[1].as_deref(), Ok("MEAS:CURR?"));
    }

    #[test]
    fn leading_colon_on_first_of_several_statements_is_an_error() {
        let stmts = split_statements(":FOO?;BAR?\n");
        let expanded = expand_prefixes(&stmts);
        assert!(matches!(
            expanded[0],
            Err(ProtocolError::LeadingColonOnFirstStatement)
        ));
        assert_eq!(expanded[1].as_deref(), Ok("BAR?"));
    }

    #[test]
    fn leading_colon_on_a_lone_statement_is_just_a_root_address() {
        let stmts = split_statements(":FOO?\n");
        let expanded = expand_prefixes(&stmts);
        assert_eq!(expanded[0].as_deref(), Ok("FOO?"));
    }

    #[test]
    fn special_head_query() {
        let head = parse_special_head("IDN?").unwrap();
        assert_eq!(head.name, "IDN");
        assert_eq!(head.trailing, Trailing::Query);
    }

    #[test]
    fn special_head_rejects_colon() {
        assert!(parse_special_head("FOO:BAR").is_err());
    }

    #[test]
    fn special_head_write_with_value() {
        let head = parse_special_head("CLS foo").unwrap();
        assert_eq!(head.name, "CLS");
        assert_eq!(head.trailing, Trailing::Write("foo".to_string()));
    }

    #[test]
    fn special_head_write_without_value() {
        let head = parse_special_head("RST").unwrap();
        assert_eq!(head.trailing, Trailing::None);
    }

    #[test]
    fn keyword_segment_extracts_channel() {
        let seg = parse_keyword_segment("CHAN03", CHNUMSIZE);
        assert_eq!(seg.keyword, "CHAN");
        assert_eq!(seg.channel, Some(3));
    }

    #[test]
    fn keyword_segment_short_digit_run_is_not_a_channel() {
        // Fewer than CHNUMSIZE trailing digits must not be read as a channel index.
        let seg = parse_keyword_segment("CH1", CHNUMSIZE);
        assert_eq!(seg.keyword, "CH1");
        assert_eq!(seg.channel, None);
    }

    #[test]
    fn keyword_segment_query_and_write() {
        let q = parse_keyword_segment("VOLT?", CHNUMSIZE);
        assert_eq!(q.keyword, "VOLT");
        assert_eq!(q.trailing, Trailing::Query);

        let w = parse_keyword_segment("VOLT 2.5", CHNUMSIZE);
        assert_eq!(w.keyword, "VOLT");
        assert_eq!(w.trailing, Trailing::Write("2.5".to_string()));
    }

    #[test]
    fn split_keywords_basic() {
        assert_eq!(split_keywords("SOUR:VOLT"), vec!["SOUR", "VOLT"]);
    }
}
