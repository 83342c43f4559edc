//! Policy line codec.
//!
//! One rule per line:
//!
//! ```text
//! p, alice, data1, read
//! g, alice, admin
//! ```
//!
//! Parsing is lenient on purpose: anything that is not a usable rule line
//! (blank, `#` comment, ptype without fields, ptype outside the `p`/`g`
//! sections) yields `None` and is dropped by the loader without an error.
//! Field counts are not checked against any schema here.
//!
//! There is no quoting or escaping. Lines are split on every `,` and each
//! token is trimmed, so fields must not contain commas or leading/trailing
//! whitespace: a field written as `data1,data2` reads back as two fields.

use crate::model::{PolicyModel, Rule, SECTION_GROUPING, SECTION_POLICY};

/// Field separator used when writing lines.
pub const FIELD_SEPARATOR: &str = ", ";

/// A parsed policy line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyLine {
    pub section: &'static str,
    pub ptype: String,
    pub rule: Rule,
}

/// Section a ptype belongs to, derived from its first character.
pub fn section_for(ptype: &str) -> Option<&'static str> {
    match ptype.as_bytes().first() {
        Some(b'p') => Some(SECTION_POLICY),
        Some(b'g') => Some(SECTION_GROUPING),
        _ => None,
    }
}

/// Parse one line. Surrounding whitespace is ignored, as is whitespace
/// around each comma-separated token.
pub fn parse_line(line: &str) -> Option<PolicyLine> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut tokens = line.split(',').map(str::trim);
    let ptype = tokens.next().filter(|p| !p.is_empty())?;
    let section = section_for(ptype)?;

    let rule: Rule = tokens.map(str::to_string).collect();
    if rule.is_empty() {
        return None;
    }

    Some(PolicyLine {
        section,
        ptype: ptype.to_string(),
        rule,
    })
}

/// Parse a line and insert it into the model.
///
/// Returns `true` only if the line parsed and the model accepted the rule.
pub fn load_policy_line(line: &str, model: &mut dyn PolicyModel) -> bool {
    match parse_line(line) {
        Some(parsed) => model.add_rule(parsed.section, &parsed.ptype, parsed.rule),
        None => false,
    }
}

/// Render one rule as a line, without the trailing newline.
pub fn encode_line(ptype: &str, rule: &[String]) -> String {
    let mut line = String::from(ptype);
    for field in rule {
        line.push_str(FIELD_SEPARATOR);
        line.push_str(field);
    }
    line
}
