use std::borrow::Cow;

use crate::common::Environment;
use crate::log::dev_debug;
use crate::system::home_dir_of;

use super::{tokenize::Token, Field};

/// Replace a leading tilde by the home directory it names. Unknown users keep the literal text.
pub(super) fn expand_tilde(tokens: Vec<Token>, env: &Environment) -> Vec<Token> {
    tokens
        .into_iter()
        .map(|token| match token {
            Token::Tilde(name) => {
                let home = if name.is_empty() {
                    env.home().map(str::to_string)
                } else {
                    home_dir_of(&name).unwrap_or_else(|err| {
                        dev_debug!("cannot look up home of {name}: {err}");
                        None
                    })
                };

                match home {
                    Some(home) => Token::Text {
                        text: home,
                        quoted: true,
                    },
                    None => Token::Text {
                        text: format!("~{name}"),
                        quoted: true,
                    },
                }
            }
            token => token,
        })
        .collect()
}

fn param_value<'a>(name: &str, env: &'a Environment) -> Cow<'a, str> {
    match name {
        "?" => env.last_status().to_string().into(),
        "$" => std::process::id().to_string().into(),
        "#" => "0".into(),
        "0" => "jobsh".into(),
        _ => env.get(name).unwrap_or_default().into(),
    }
}

struct Splitter<'a> {
    fields: Vec<Field>,
    current: Field,
    separators: &'a str,
}

impl Splitter<'_> {
    fn finish(&mut self) {
        let field = std::mem::take(&mut self.current);
        if field.is_present() {
            self.fields.push(field);
        }
    }

    fn push_unquoted(&mut self, text: &str) {
        self.current.extend(text, false);
    }

    fn push_quoted(&mut self, text: &str) {
        self.current.extend(text, true);
        self.current.forced = true;
    }

    /// Push the result of an unquoted substitution, splitting it at separators.
    fn push_split(&mut self, text: &str) {
        for c in text.chars() {
            if !self.separators.contains(c) {
                self.current.push(c, false);
            } else if c.is_whitespace() {
                self.finish();
            } else {
                // non-whitespace separators delimit even empty fields
                self.current.forced = true;
                self.finish();
            }
        }
    }
}

/// Substitute parameters and split the result into fields.
pub(super) fn substitute(tokens: Vec<Token>, env: &Environment) -> Vec<Field> {
    let mut splitter = Splitter {
        fields: Vec::new(),
        current: Field::default(),
        separators: env.field_separators(),
    };

    for token in tokens {
        match token {
            Token::Text { text, quoted: true } => splitter.push_quoted(&text),
            Token::Text {
                text,
                quoted: false,
            } => splitter.push_unquoted(&text),
            Token::Param { name, quoted: true } => {
                splitter.push_quoted(&param_value(&name, env))
            }
            Token::Param {
                name,
                quoted: false,
            } => splitter.push_split(&param_value(&name, env)),
            // the tilde pass ran first
            Token::Tilde(name) => splitter.push_quoted(&format!("~{name}")),
        }
    }
    splitter.finish();

    splitter.fields
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{expand_tilde, substitute};
    use crate::common::Environment;
    use crate::expand::tokenize::{tokenize, Token};

    fn fields(word: &str, env: &Environment) -> Vec<String> {
        let tokens = expand_tilde(tokenize(word).unwrap(), env);
        substitute(tokens, env)
            .iter()
            .map(|field| field.literal())
            .collect()
    }

    #[test]
    fn splitting_only_applies_unquoted() {
        let env: Environment = [("FOO", " 1  2 "), ("E", "")].into_iter().collect();

        assert_eq!(fields("$FOO", &env), ["1", "2"]);
        assert_eq!(fields("\"$FOO\"", &env), [" 1  2 "]);
        assert_eq!(fields("a${FOO}b", &env), ["a", "1", "2", "b"]);
        assert_eq!(fields("$E", &env), Vec::<String>::new());
        assert_eq!(fields("$UNSET", &env), Vec::<String>::new());
        assert_eq!(fields("\"$UNSET\"", &env), [""]);
        assert_eq!(fields("''$E", &env), [""]);
    }

    #[test]
    fn custom_separators() {
        let env: Environment = [("IFS", ":"), ("P", "a::b")].into_iter().collect();
        assert_eq!(fields("$P", &env), ["a", "", "b"]);
    }

    #[test]
    fn special_parameters() {
        let mut env = Environment::default();
        env.set_last_status(3);
        assert_eq!(fields("$?", &env), ["3"]);
        assert_eq!(fields("$$", &env), [std::process::id().to_string()]);
        assert_eq!(fields("$0", &env), ["jobsh"]);
    }

    #[test]
    fn tilde() {
        let env: Environment = [("HOME", "/home/me")].into_iter().collect();
        assert_eq!(fields("~", &env), ["/home/me"]);
        assert_eq!(fields("~/x", &env), ["/home/me/x"]);
        assert_eq!(fields("~no-such-user-jobsh/x", &env), ["~no-such-user-jobsh/x"]);

        let root_home = crate::system::home_dir_of("root").unwrap().unwrap();
        assert_eq!(fields("~root", &env), [root_home]);

        let tokens = expand_tilde(vec![Token::Tilde(String::new())], &Environment::default());
        assert_eq!(
            tokens,
            [Token::Text {
                text: "~".into(),
                quoted: true
            }]
        );
    }
}
