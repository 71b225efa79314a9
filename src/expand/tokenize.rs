use super::ExpansionError;

/// A piece of a word after quote removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Token {
    /// Literal characters. Quoted text is never split or globbed.
    Text { text: String, quoted: bool },
    /// A leading `~` or `~user`; the name is empty for the bare form.
    Tilde(String),
    /// `$name`, `${name}` or one of the special parameters.
    Param { name: String, quoted: bool },
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_special_param(c: char) -> bool {
    matches!(c, '?' | '$' | '#' | '!' | '0'..='9')
}

fn is_valid_param(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_name_start(c) => chars.all(is_name_char),
        Some(c) if is_special_param(c) => chars.next().is_none(),
        _ => false,
    }
}

struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Tokenizer<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn push_char(&mut self, c: char, quoted: bool) {
        if let Some(Token::Text { text, quoted: q }) = self.tokens.last_mut() {
            if *q == quoted {
                text.push(c);
                return;
            }
        }
        self.tokens.push(Token::Text {
            text: c.to_string(),
            quoted,
        });
    }

    /// Mark the presence of quotes, so `""` still produces a field.
    fn push_empty_quoted(&mut self) {
        if !matches!(self.tokens.last(), Some(Token::Text { quoted: true, .. })) {
            self.tokens.push(Token::Text {
                text: String::new(),
                quoted: true,
            });
        }
    }

    fn tilde_prefix(&mut self) {
        let prefix = self.input.split('/').next().unwrap_or_default();
        let Some(name) = prefix.strip_prefix('~') else {
            return;
        };
        if name
            .chars()
            .all(|c| is_name_char(c) || c == '.' || c == '-')
        {
            self.tokens.push(Token::Tilde(name.to_string()));
            self.pos = prefix.len();
        }
    }

    fn dollar(&mut self, quoted: bool) -> Result<(), ExpansionError> {
        match self.peek() {
            Some('(') => Err(ExpansionError::CommandSubstitution(format!(
                "${}",
                self.rest()
            ))),
            Some('{') => {
                let start = self.pos;
                let Some(end) = self.rest().find('}') else {
                    return Err(ExpansionError::BadSubstitution(format!("${}", self.rest())));
                };
                let name = &self.input[start + 1..start + end];
                if !is_valid_param(name) {
                    return Err(ExpansionError::BadSubstitution(format!("${{{name}}}")));
                }
                self.pos = start + end + 1;
                self.tokens.push(Token::Param {
                    name: name.to_string(),
                    quoted,
                });
                Ok(())
            }
            Some(c) if is_special_param(c) => {
                self.next();
                self.tokens.push(Token::Param {
                    name: c.to_string(),
                    quoted,
                });
                Ok(())
            }
            Some(c) if is_name_start(c) => {
                let len = self
                    .rest()
                    .find(|c: char| !is_name_char(c))
                    .unwrap_or(self.rest().len());
                let name = self.rest()[..len].to_string();
                self.pos += len;
                self.tokens.push(Token::Param { name, quoted });
                Ok(())
            }
            // a lone `$` is literal
            _ => {
                self.push_char('$', quoted);
                Ok(())
            }
        }
    }

    fn single_quoted(&mut self) -> Result<(), ExpansionError> {
        self.push_empty_quoted();
        loop {
            match self.next() {
                Some('\'') => return Ok(()),
                Some(c) => self.push_char(c, true),
                None => return Err(ExpansionError::UnterminatedQuote('\'')),
            }
        }
    }

    fn double_quoted(&mut self) -> Result<(), ExpansionError> {
        self.push_empty_quoted();
        loop {
            match self.next() {
                Some('"') => return Ok(()),
                Some('\\') => match self.peek() {
                    Some(c @ ('$' | '`' | '"' | '\\')) => {
                        self.next();
                        self.push_char(c, true);
                    }
                    Some('\n') => {
                        self.next();
                    }
                    _ => self.push_char('\\', true),
                },
                Some('$') => self.dollar(true)?,
                Some('`') => {
                    return Err(ExpansionError::CommandSubstitution(format!(
                        "`{}",
                        self.rest()
                    )))
                }
                Some(c) => self.push_char(c, true),
                None => return Err(ExpansionError::UnterminatedQuote('"')),
            }
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ExpansionError> {
        self.tilde_prefix();

        while let Some(c) = self.next() {
            match c {
                '\\' => match self.next() {
                    Some('\n') => {}
                    Some(c) => self.push_char(c, true),
                    None => self.push_char('\\', true),
                },
                '\'' => self.single_quoted()?,
                '"' => self.double_quoted()?,
                '$' => self.dollar(false)?,
                '`' => {
                    return Err(ExpansionError::CommandSubstitution(format!(
                        "`{}",
                        self.rest()
                    )))
                }
                c => self.push_char(c, false),
            }
        }

        Ok(self.tokens)
    }
}

/// Split a word into literal text and expansions, removing quotes.
///
/// Command substitution has no token: `$(...)` and backquotes outside single quotes are
/// rejected here, so no later pass can ever run them.
pub(super) fn tokenize(input: &str) -> Result<Vec<Token>, ExpansionError> {
    Tokenizer {
        input,
        pos: 0,
        tokens: Vec::new(),
    }
    .run()
}
