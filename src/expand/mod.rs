//! Word expansion: turns one raw word into zero or more literal fields.
//!
//! The passes run in a fixed order: quote removal, tilde expansion, parameter substitution with
//! field splitting and finally pathname globbing. There is no command substitution pass.
#![forbid(unsafe_code)]
use std::fmt;

use crate::ast::Word;
use crate::common::Environment;

mod pathname;
mod substitute;
mod tokenize;

/// Upper bound on the number of fields one command may accumulate.
pub const MAX_FIELDS: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpansionError {
    UnterminatedQuote(char),
    BadSubstitution(String),
    CommandSubstitution(String),
    TooManyFields(usize),
    Pattern(String),
    AmbiguousRedirect(String),
    EmptyCommand,
}

impl fmt::Display for ExpansionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpansionError::UnterminatedQuote(quote) => {
                write!(f, "unexpected end of word while looking for matching `{quote}'")
            }
            ExpansionError::BadSubstitution(text) => write!(f, "{text}: bad substitution"),
            ExpansionError::CommandSubstitution(text) => {
                write!(f, "{text}: command substitution is not supported")
            }
            ExpansionError::TooManyFields(limit) => {
                write!(f, "expansion produces more than {limit} arguments")
            }
            ExpansionError::Pattern(e) => write!(f, "invalid pattern {e}"),
            ExpansionError::AmbiguousRedirect(word) => write!(f, "{word}: ambiguous redirect"),
            ExpansionError::EmptyCommand => f.write_str("empty command"),
        }
    }
}

/// Characters of a field in progress, each tagged with whether it was quoted.
#[derive(Debug, Default)]
pub(crate) struct Field {
    chars: Vec<(char, bool)>,
    // quotes were seen, so the field exists even when empty
    forced: bool,
}

impl Field {
    fn push(&mut self, c: char, quoted: bool) {
        self.chars.push((c, quoted));
    }

    fn extend(&mut self, text: &str, quoted: bool) {
        self.chars.extend(text.chars().map(|c| (c, quoted)));
    }

    fn is_present(&self) -> bool {
        self.forced || !self.chars.is_empty()
    }

    fn literal(&self) -> String {
        self.chars.iter().map(|&(c, _)| c).collect()
    }
}

/// The ordered result of expanding one or more words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionVector {
    fields: Vec<String>,
}

impl ExpansionVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.fields
    }

    pub fn into_vec(self) -> Vec<String> {
        self.fields
    }

    fn room(&self) -> usize {
        MAX_FIELDS.saturating_sub(self.fields.len())
    }
}

impl IntoIterator for ExpansionVector {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// Expand `word`, appending its fields to `accumulator`.
///
/// On error `accumulator` is left as it was.
pub fn expand(
    word: &Word,
    env: &Environment,
    accumulator: &mut ExpansionVector,
) -> Result<(), ExpansionError> {
    let tokens = tokenize::tokenize(word.as_str())?;
    let tokens = substitute::expand_tilde(tokens, env);
    let fields = substitute::substitute(tokens, env);
    let expanded = pathname::expand_fields(fields, accumulator.room())
        .map_err(|err| match err {
            ExpansionError::TooManyFields(_) => ExpansionError::TooManyFields(MAX_FIELDS),
            err => err,
        })?;

    accumulator.fields.extend(expanded);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::{expand, ExpansionError, ExpansionVector, MAX_FIELDS};
    use crate::ast::Word;
    use crate::common::Environment;

    fn expand_all(words: &[&str], env: &Environment) -> Result<Vec<String>, ExpansionError> {
        let mut acc = ExpansionVector::new();
        for word in words {
            expand(&Word::from(*word), env, &mut acc)?;
        }
        Ok(acc.into_vec())
    }

    #[test]
    fn words_accumulate_in_order() {
        let env: Environment = [("X", "two three")].into_iter().collect();
        assert_eq!(
            expand_all(&["one", "$X", "'four five'"], &env).unwrap(),
            ["one", "two", "three", "four five"]
        );
    }

    #[test]
    fn failure_leaves_accumulator_untouched() {
        let env = Environment::default();
        let mut acc = ExpansionVector::new();
        expand(&Word::from("keep"), &env, &mut acc).unwrap();
        assert!(expand(&Word::from("'open"), &env, &mut acc).is_err());
        assert_eq!(acc.as_slice(), ["keep"]);
    }

    #[test]
    fn command_substitution_never_runs() {
        let marker = std::env::temp_dir().join(format!("jobsh-pwned-{}", std::process::id()));
        let env = Environment::default();
        let marker_text = marker.display();

        for word in [
            format!("$(touch {marker_text})"),
            format!("\"$(touch {marker_text})\""),
            format!("`touch {marker_text}`"),
            format!("x\"`touch {marker_text}`\""),
            format!("$((1 + 1))"),
        ] {
            let err = expand_all(&[&word], &env).unwrap_err();
            assert!(
                matches!(err, ExpansionError::CommandSubstitution(_)),
                "{word}: {err:?}"
            );
        }

        let literal = format!("'$(touch {marker_text})'");
        assert_eq!(
            expand_all(&[&literal], &env).unwrap(),
            [format!("$(touch {marker_text})")]
        );

        assert!(!Path::new(&marker).exists());
    }

    #[test]
    fn field_limit() {
        let many = vec!["x"; MAX_FIELDS].join(" ");
        let env: Environment = [("MANY", many.as_str())].into_iter().collect();

        assert_eq!(expand_all(&["$MANY"], &env).unwrap().len(), MAX_FIELDS);
        assert_eq!(
            expand_all(&["$MANY", "one-more"], &env),
            Err(ExpansionError::TooManyFields(MAX_FIELDS))
        );
    }
}
