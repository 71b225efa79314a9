use std::str::FromStr;

use crate::common::Error;

use super::{JobId, JobTable};

/// A reference to a job as typed by the user: `%N`, `N`, `%%` or `%+`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSpec {
    Id(JobId),
    Current,
}

impl JobSpec {
    pub fn resolve(&self, table: &JobTable) -> Result<JobId, Error> {
        match *self {
            JobSpec::Id(id) => table
                .find_job_by_id(id)
                .map(|job| job.id())
                .ok_or(Error::NoSuchJob(id)),
            JobSpec::Current => table
                .most_recent()
                .ok_or_else(|| Error::InvalidJobSpec("no current job".into())),
        }
    }
}

impl FromStr for JobSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number = match s {
            "%%" | "%+" | "%" => return Ok(JobSpec::Current),
            _ => s.strip_prefix('%').unwrap_or(s),
        };

        match number.parse::<u32>() {
            Ok(0) | Err(_) => Err(Error::InvalidJobSpec(s.to_string())),
            Ok(id) => Ok(JobSpec::Id(JobId::new(id))),
        }
    }
}
