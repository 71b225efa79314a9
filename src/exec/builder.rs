use std::{fmt, os::fd::RawFd, path::PathBuf};

use crate::ast::{Pipeline, Redirect, RedirectKind, RedirectTarget, SimpleCommand};
use crate::common::Environment;
use crate::expand::{expand, ExpansionError, ExpansionVector};

use super::LaunchError;

/// Where a redirection points once its word has been expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Path(PathBuf),
    Fd(RawFd),
}

/// One pipeline stage: the expanded argument vector and its own redirections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStage {
    pub argv: Vec<String>,
    pub input: Option<Target>,
    pub output: Option<Target>,
    /// Open `output` for appending instead of truncating it.
    pub append: bool,
}

impl CommandStage {
    pub fn new<S: Into<String>>(argv: impl IntoIterator<Item = S>) -> Self {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            input: None,
            output: None,
            append: false,
        }
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    fn build(command: &SimpleCommand, env: &Environment) -> Result<Self, ExpansionError> {
        let mut argv = ExpansionVector::new();
        for word in &command.words {
            expand(word, env, &mut argv)?;
        }

        if argv.is_empty() {
            return Err(ExpansionError::EmptyCommand);
        }

        let mut stage = Self::new(argv);
        for redirect in &command.redirects {
            stage.redirect(redirect, env)?;
        }

        Ok(stage)
    }

    // The last redirection of each direction wins.
    fn redirect(&mut self, redirect: &Redirect, env: &Environment) -> Result<(), ExpansionError> {
        let target = match &redirect.target {
            RedirectTarget::Fd(fd) => Target::Fd(*fd),
            RedirectTarget::Path(word) => {
                let mut fields = ExpansionVector::new();
                expand(word, env, &mut fields)?;
                match fields.into_vec().as_slice() {
                    [path] => Target::Path(PathBuf::from(path)),
                    _ => return Err(ExpansionError::AmbiguousRedirect(word.to_string())),
                }
            }
        };

        match redirect.kind {
            RedirectKind::Input => self.input = Some(target),
            RedirectKind::Output => {
                self.output = Some(target);
                self.append = false;
            }
            RedirectKind::Append => {
                self.output = Some(target);
                self.append = true;
            }
        }

        Ok(())
    }
}

/// A non-empty, ordered list of pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandVector {
    stages: Vec<CommandStage>,
    display: String,
}

impl CommandVector {
    /// Expand every word of `pipeline`. Either every stage expands or nothing is returned.
    pub fn build(pipeline: &Pipeline, env: &Environment) -> Result<Self, ExpansionError> {
        let stages = pipeline
            .commands
            .iter()
            .map(|command| CommandStage::build(command, env))
            .collect::<Result<Vec<_>, _>>()?;

        if stages.is_empty() {
            return Err(ExpansionError::EmptyCommand);
        }

        let display = Pipeline {
            background: false,
            ..pipeline.clone()
        }
        .to_string();

        Ok(Self { stages, display })
    }

    /// Assemble already expanded stages.
    pub fn from_stages(
        stages: Vec<CommandStage>,
        display: impl Into<String>,
    ) -> Result<Self, LaunchError> {
        if stages.is_empty() || stages.iter().any(|stage| stage.argv.is_empty()) {
            return Err(LaunchError::EmptyPipeline);
        }

        Ok(Self {
            stages,
            display: display.into(),
        })
    }

    pub fn stages(&self) -> &[CommandStage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The text shown for the job in listings.
    pub fn display(&self) -> &str {
        &self.display
    }
}

impl fmt::Display for CommandVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use pretty_assertions::assert_eq;

    use super::{CommandStage, CommandVector, Target};
    use crate::ast::{Pipeline, RedirectKind, RedirectTarget, SimpleCommand};
    use crate::common::Environment;
    use crate::exec::LaunchError;
    use crate::expand::ExpansionError;

    #[test]
    fn builds_stages_with_redirections() {
        let env: Environment = [("OUT", "result.txt")].into_iter().collect();
        let pipeline = Pipeline::new(vec![
            SimpleCommand::new(["grep", "'a b'"])
                .redirect(RedirectKind::Input, RedirectTarget::Path("in".into())),
            SimpleCommand::new(["wc", "-l"])
                .redirect(RedirectKind::Output, RedirectTarget::Path("ignored".into()))
                .redirect(RedirectKind::Append, RedirectTarget::Path("$OUT".into())),
        ]);

        let vector = CommandVector::build(&pipeline, &env).unwrap();
        assert_eq!(vector.len(), 2);
        assert_eq!(vector.display(), "grep 'a b' < in | wc -l > ignored >> $OUT");
        assert_eq!(
            vector.stages(),
            [
                CommandStage {
                    argv: vec!["grep".into(), "a b".into()],
                    input: Some(Target::Path(PathBuf::from("in"))),
                    output: None,
                    append: false,
                },
                CommandStage {
                    argv: vec!["wc".into(), "-l".into()],
                    input: None,
                    output: Some(Target::Path(PathBuf::from("result.txt"))),
                    append: true,
                },
            ]
        );
    }

    #[test]
    fn argument_count_is_decided_after_expansion() {
        let dir = std::env::temp_dir().join(format!("jobsh-builder-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("one.c"), b"").unwrap();
        fs::write(dir.join("two.c"), b"").unwrap();
        let base = dir.display();

        let env = Environment::default();
        let many = Pipeline::new(vec![SimpleCommand::new([
            "cc".to_string(),
            format!("{base}/*.c"),
        ])]);
        assert_eq!(
            CommandVector::build(&many, &env).unwrap().stages()[0].argv.len(),
            3
        );

        let none = Pipeline::new(vec![SimpleCommand::new([
            "cc".to_string(),
            format!("{base}/*.h"),
        ])]);
        assert_eq!(
            CommandVector::build(&none, &env).unwrap().stages()[0].argv,
            ["cc"]
        );

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn one_bad_word_discards_everything() {
        let env = Environment::default();
        let pipeline = Pipeline::new(vec![
            SimpleCommand::new(["echo", "fine"]),
            SimpleCommand::new(["cat", "\"unterminated"]),
        ]);
        assert_eq!(
            CommandVector::build(&pipeline, &env),
            Err(ExpansionError::UnterminatedQuote('"'))
        );

        let empty = Pipeline::new(vec![SimpleCommand::new(["$NOTHING"])]);
        assert_eq!(
            CommandVector::build(&empty, &env),
            Err(ExpansionError::EmptyCommand)
        );
        assert_eq!(
            CommandVector::build(&Pipeline::new(vec![]), &env),
            Err(ExpansionError::EmptyCommand)
        );
    }

    #[test]
    fn redirect_must_name_one_file() {
        let env: Environment = [("TWO", "a b")].into_iter().collect();
        let pipeline = Pipeline::new(vec![SimpleCommand::new(["echo"])
            .redirect(RedirectKind::Output, RedirectTarget::Path("$TWO".into()))]);
        assert_eq!(
            CommandVector::build(&pipeline, &env),
            Err(ExpansionError::AmbiguousRedirect("$TWO".into()))
        );
    }

    #[test]
    fn from_stages_rejects_empty() {
        assert!(matches!(
            CommandVector::from_stages(vec![], ""),
            Err(LaunchError::EmptyPipeline)
        ));
        assert!(matches!(
            CommandVector::from_stages(vec![CommandStage::new(Vec::<String>::new())], ""),
            Err(LaunchError::EmptyPipeline)
        ));
    }
}
