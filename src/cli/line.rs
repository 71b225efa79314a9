//! Splits an input line into pipelines.
//!
//! Words are not interpreted here: quotes and backslashes are kept in the word so the expander
//! sees exactly what was typed. Only unquoted operators end a word.
use crate::ast::{Pipeline, RedirectKind, RedirectTarget, SimpleCommand, Word};

#[derive(Debug, PartialEq)]
enum Token {
    Word(String),
    Pipe,
    Amp,
    Semi,
    Redirect(RedirectKind),
    /// `<&` and `>&`
    Duplicate(RedirectKind),
}

impl Token {
    fn describe(&self) -> &str {
        match self {
            Token::Word(word) => word,
            Token::Pipe => "|",
            Token::Amp => "&",
            Token::Semi => ";",
            Token::Redirect(RedirectKind::Input) => "<",
            Token::Redirect(RedirectKind::Output) => ">",
            Token::Redirect(RedirectKind::Append) => ">>",
            Token::Duplicate(RedirectKind::Input) => "<&",
            Token::Duplicate(_) => ">&",
        }
    }
}

fn is_operator(c: char) -> bool {
    matches!(c, '|' | '&' | ';' | '<' | '>')
}

fn tokenize(line: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    let mut word = String::new();
    let mut in_word = false;

    let finish = |word: &mut String, in_word: &mut bool, tokens: &mut Vec<Token>| {
        if *in_word {
            tokens.push(Token::Word(std::mem::take(word)));
            *in_word = false;
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                // an unterminated quote swallows the rest of the line; the expander reports it
                in_word = true;
                word.push(c);
                while let Some(inner) = chars.next() {
                    word.push(inner);
                    if inner == c {
                        break;
                    }
                    if c == '"' && inner == '\\' {
                        if let Some(escaped) = chars.next() {
                            word.push(escaped);
                        }
                    }
                }
            }
            '\\' => {
                in_word = true;
                word.push(c);
                if let Some(escaped) = chars.next() {
                    word.push(escaped);
                }
            }
            '#' if !in_word => break,
            c if c.is_ascii_whitespace() => finish(&mut word, &mut in_word, &mut tokens),
            c if is_operator(c) => {
                finish(&mut word, &mut in_word, &mut tokens);
                let token = match c {
                    '|' => Token::Pipe,
                    '&' => Token::Amp,
                    ';' => Token::Semi,
                    '<' if chars.next_if_eq(&'&').is_some() => {
                        Token::Duplicate(RedirectKind::Input)
                    }
                    '<' => Token::Redirect(RedirectKind::Input),
                    _ if chars.next_if_eq(&'>').is_some() => {
                        Token::Redirect(RedirectKind::Append)
                    }
                    _ if chars.next_if_eq(&'&').is_some() => {
                        Token::Duplicate(RedirectKind::Output)
                    }
                    _ => Token::Redirect(RedirectKind::Output),
                };
                tokens.push(token);
            }
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }
    finish(&mut word, &mut in_word, &mut tokens);

    tokens
}

fn unexpected(token: Option<&Token>) -> String {
    match token {
        Some(token) => format!("syntax error near unexpected token `{}'", token.describe()),
        None => "syntax error: unexpected end of line".to_string(),
    }
}

/// Parse one input line. `;` and `&` separate pipelines; an empty or comment-only line gives
/// no pipelines at all.
pub fn parse_line(line: &str) -> Result<Vec<Pipeline>, String> {
    let mut pipelines = Vec::new();
    let mut commands = Vec::new();
    let mut current = SimpleCommand::default();
    let is_empty = |command: &SimpleCommand| command.words.is_empty() && command.redirects.is_empty();

    let mut tokens = tokenize(line).into_iter();
    while let Some(token) = tokens.next() {
        match token {
            Token::Word(text) => current.words.push(Word::new(text)),
            Token::Redirect(kind) => match tokens.next() {
                Some(Token::Word(target)) => {
                    current = current.redirect(kind, RedirectTarget::Path(Word::new(target)));
                }
                other => return Err(unexpected(other.as_ref())),
            },
            Token::Duplicate(kind) => match tokens.next() {
                Some(Token::Word(target)) => {
                    let fd = target
                        .parse()
                        .map_err(|_| format!("{target}: ambiguous redirect"))?;
                    current = current.redirect(kind, RedirectTarget::Fd(fd));
                }
                other => return Err(unexpected(other.as_ref())),
            },
            Token::Pipe => {
                if is_empty(&current) {
                    return Err(unexpected(Some(&Token::Pipe)));
                }
                commands.push(std::mem::take(&mut current));
            }
            Token::Amp | Token::Semi => {
                if is_empty(&current) {
                    return Err(unexpected(Some(&token)));
                }
                commands.push(std::mem::take(&mut current));
                let mut pipeline = Pipeline::new(std::mem::take(&mut commands));
                pipeline.background = token == Token::Amp;
                pipelines.push(pipeline);
            }
        }
    }

    if !is_empty(&current) {
        commands.push(current);
        pipelines.push(Pipeline::new(commands));
    } else if !commands.is_empty() {
        // trailing '|'
        return Err(unexpected(None));
    }

    Ok(pipelines)
}
