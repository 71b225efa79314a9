use std::{fmt::Display, num::ParseIntError, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(libc::pid_t);

impl ProcessId {
    pub const fn new(id: libc::pid_t) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> libc::pid_t {
        self.0
    }

    /// `true` for the placeholder ID `0` meaning "the calling process" in most syscalls.
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProcessId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<libc::pid_t>().map(ProcessId::new)
    }
}

#[cfg(test)]
mod test {
    use super::ProcessId;

    #[test]
    fn parse_and_display() {
        let pid: ProcessId = "1234".parse().unwrap();
        assert_eq!(pid, ProcessId::new(1234));
        assert_eq!(pid.to_string(), "1234");
        assert!("12a".parse::<ProcessId>().is_err());
        assert!(ProcessId::new(0).is_zero());
    }
}
