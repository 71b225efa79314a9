use glob::{MatchOptions, Pattern};

use crate::log::dev_debug;

use super::{ExpansionError, Field};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Indices of the unquoted characters that make `field` a pattern. A bracket expression counts
/// as its opening `[` and closing `]`; everything between them is a member of the set.
fn pattern_chars(field: &Field) -> Vec<usize> {
    let chars = &field.chars;
    let mut active = Vec::new();
    let mut idx = 0;

    while idx < chars.len() {
        match chars[idx] {
            ('*' | '?', false) => active.push(idx),
            ('[', false) => {
                if let Some(close) = bracket_end(chars, idx) {
                    active.extend([idx, close]);
                    idx = close + 1;
                    continue;
                }
            }
            _ => {}
        }
        idx += 1;
    }

    active
}

/// The unquoted `]` closing the bracket expression opened at `open`, if any. A `]` right after
/// `[` or `[!` is a member, not the end.
fn bracket_end(chars: &[(char, bool)], open: usize) -> Option<usize> {
    let mut first = open + 1;
    if chars.get(first) == Some(&('!', false)) {
        first += 1;
    }
    (first + 1..chars.len()).find(|&idx| chars[idx] == (']', false))
}

fn to_pattern(field: &Field, active: &[usize]) -> String {
    let mut pattern = String::new();
    let mut in_brackets = false;
    let mut after_star = false;

    for (idx, &(c, _)) in field.chars.iter().enumerate() {
        let is_active = active.contains(&idx);
        match c {
            _ if in_brackets => {
                in_brackets = !is_active;
                pattern.push(c);
            }
            // `**` would be a recursive wildcard
            '*' if is_active && after_star => {}
            '[' if is_active => {
                in_brackets = true;
                pattern.push(c);
            }
            _ if is_active => pattern.push(c),
            _ => pattern.push_str(&Pattern::escape(c.encode_utf8(&mut [0; 4]))),
        }
        after_star = is_active && c == '*';
    }

    pattern
}

/// Replace every field containing unquoted pattern characters by the sorted list of matching
/// paths. A pattern without matches produces no fields at all.
pub(super) fn expand_fields(
    fields: Vec<Field>,
    limit: usize,
) -> Result<Vec<String>, ExpansionError> {
    let mut expanded = Vec::new();

    for field in fields {
        let active = pattern_chars(&field);
        if active.is_empty() {
            expanded.push(field.literal());
        } else {
            let pattern = to_pattern(&field, &active);
            let paths = glob::glob_with(&pattern, MATCH_OPTIONS)
                .map_err(|err| ExpansionError::Pattern(format!("{pattern}: {}", err.msg)))?;

            let mut matches = paths
                .filter_map(Result::ok)
                .map(|path| path.to_string_lossy().into_owned())
                .take(limit.saturating_add(1))
                .collect::<Vec<_>>();
            matches.sort();

            dev_debug!("{pattern} matched {} paths", matches.len());
            expanded.extend(matches);
        }

        if expanded.len() > limit {
            return Err(ExpansionError::TooManyFields(limit));
        }
    }

    Ok(expanded)
}
