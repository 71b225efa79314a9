use std::collections::BTreeMap;

use crate::log::dev_debug;

use super::Error;

const PATH_DEFAULT: &str = env!("JOBSH_PATH_DEFAULT");

/// The variables visible to word expansion and inherited by every launched process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
    last_status: i32,
}

impl Environment {
    /// Snapshot the environment of the current process. Entries that are not valid UTF-8 are
    /// skipped.
    pub fn from_process() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
            .collect();

        Self {
            vars,
            last_status: 0,
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.vars.remove(name)
    }

    /// The status of the most recently completed foreground job, `$?`.
    pub fn last_status(&self) -> i32 {
        self.last_status
    }

    pub fn set_last_status(&mut self, status: i32) {
        self.last_status = status;
    }

    pub fn home(&self) -> Option<&str> {
        self.get("HOME").filter(|home| !home.is_empty())
    }

    /// The search path for commands, falling back to a built-in default.
    pub fn path(&self) -> &str {
        self.get("PATH").unwrap_or(PATH_DEFAULT)
    }

    /// Field separators for unquoted substitutions, `$IFS`.
    pub fn field_separators(&self) -> &str {
        self.get("IFS").unwrap_or(" \t\n")
    }

    fn insert(&mut self, name: String, value: String) {
        self.vars.insert(name, value);
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            last_status: 0,
        }
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['=', '\0'])
}

/// Set `name` to `value` with surrounding whitespace trimmed from the value.
///
/// The variable is visible to later expansions and to every process launched afterwards.
pub fn set_env_var(env: &mut Environment, name: &str, value: &str) -> Result<(), Error> {
    if !is_valid_name(name) {
        return Err(Error::InvalidName(name.to_string()));
    }

    let value = value.trim();
    if value.contains('\0') {
        return Err(Error::InvalidName(format!("{name}={value}")));
    }

    dev_debug!("set environment variable: {name}={value}");
    env.insert(name.to_string(), value.to_string());

    Ok(())
}
