#![forbid(unsafe_code)]

pub mod help;
mod line;


pub use line::parse_line;

#[derive(Debug, PartialEq)]
pub(crate) struct JobshOptions {
    pub(crate) command: Option<String>,
    pub(crate) settings: Vec<String>,
    pub(crate) interactive: bool,
    pub(crate) action: JobshAction,
}

impl Default for JobshOptions {
    fn default() -> Self {
        Self {
            command: None,
            settings: Vec::new(),
            interactive: false,
            action: JobshAction::Run,
        }
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum JobshAction {
    Help,
    Version,
    Run,
}

type OptionSetter = fn(&mut JobshOptions, Option<String>) -> Result<(), String>;

struct JobshOption {
    short: char,
    long: &'static str,
    takes_argument: bool,
    set: OptionSetter,
}

impl JobshOptions {
    const JOBSH_OPTIONS: &'static [JobshOption] = &[
        JobshOption {
            short: 'c',
            long: "command",
            takes_argument: true,
            set: |options, argument| {
                options.command = Some(argument.ok_or("option requires an argument -- 'c'")?);
                Ok(())
            },
        },
        JobshOption {
            short: 'h',
            long: "help",
            takes_argument: false,
            set: |options, _| {
                options.action = JobshAction::Help;
                Ok(())
            },
        },
        JobshOption {
            short: 'i',
            long: "interactive",
            takes_argument: false,
            set: |options, _| {
                options.interactive = true;
                Ok(())
            },
        },
        JobshOption {
            short: 'o',
            long: "option",
            takes_argument: true,
            set: |options, argument| {
                options
                    .settings
                    .push(argument.ok_or("option requires an argument -- 'o'")?);
                Ok(())
            },
        },
        JobshOption {
            short: 'V',
            long: "version",
            takes_argument: false,
            set: |options, _| {
                options.action = JobshAction::Version;
                Ok(())
            },
        },
    ];

    pub(crate) fn from_env() -> Result<JobshOptions, String> {
        let args = std::env::args().collect();

        Self::parse_arguments(args)
    }

    fn find_long(name: &str) -> Result<&'static JobshOption, String> {
        Self::JOBSH_OPTIONS
            .iter()
            .find(|option| option.long == name)
            .ok_or_else(|| format!("unrecognized option '--{name}'"))
    }

    /// Parse the command line, program name included.
    pub(crate) fn parse_arguments(arguments: Vec<String>) -> Result<JobshOptions, String> {
        let mut options = JobshOptions::default();
        let mut arg_iter = arguments.into_iter().skip(1);

        while let Some(arg) = arg_iter.next() {
            if let Some(long) = arg.strip_prefix("--") {
                // '--option=notify=off' splits at the first '='
                if let Some((key, value)) = long.split_once('=') {
                    let option = Self::find_long(key)?;
                    if !option.takes_argument {
                        return Err(format!("'--{}' does not take any arguments", option.long));
                    }
                    (option.set)(&mut options, Some(value.to_string()))?;
                } else {
                    let option = Self::find_long(long)?;
                    let argument = if option.takes_argument {
                        arg_iter.next()
                    } else {
                        None
                    };
                    (option.set)(&mut options, argument)?;
                }
            } else if arg.starts_with('-') && arg.len() > 1 {
                // flags can be grouped; an argument is the rest of the group or the next word
                for (n, flag) in arg.char_indices().skip(1) {
                    let option = Self::JOBSH_OPTIONS
                        .iter()
                        .find(|option| option.short == flag)
                        .ok_or_else(|| format!("invalid option -- '{flag}'"))?;

                    if option.takes_argument {
                        let rest = &arg[n + flag.len_utf8()..];
                        let argument = if rest.is_empty() {
                            arg_iter.next()
                        } else {
                            Some(rest.to_string())
                        };
                        (option.set)(&mut options, argument)?;
                        break;
                    }
                    (option.set)(&mut options, None)?;
                }
            } else {
                return Err(format!("unexpected argument '{arg}'"));
            }
        }

        Ok(options)
    }
}
