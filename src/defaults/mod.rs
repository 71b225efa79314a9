#![forbid(unsafe_code)]
use crate::common::Error;

mod settings_dsl;
use settings_dsl::*;

pub trait SettingValue: Sized {
    fn parse_setting(text: &str) -> Option<Self>;
}

impl SettingValue for bool {
    fn parse_setting(text: &str) -> Option<Self> {
        match text {
            "on" | "true" | "yes" | "1" => Some(true),
            "off" | "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl SettingValue for usize {
    fn parse_setting(text: &str) -> Option<Self> {
        text.parse().ok()
    }
}

settings! {
    max_jobs            : usize = 100 [1..=1000]
    max_pipeline_stages : usize = 50 [1..=1000]
    notify              : bool  = true
    job_control         : bool  = true
}

impl Settings {
    /// Apply an override written as `name=value`.
    pub fn apply(&mut self, assignment: &str) -> Result<(), Error> {
        let (name, value) = assignment
            .split_once('=')
            .ok_or_else(|| Error::InvalidSetting(assignment.to_string()))?;
        self.set(name.trim(), value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[allow(clippy::bool_assert_comparison)]
    #[test]
    fn check() {
        let mut def = Settings::default();
        assert_eq! { def.max_jobs, 100 };
        assert_eq! { def.max_pipeline_stages, 50 };
        assert_eq! { def.notify, true };
        assert_eq! { def.job_control, true };

        def.set("max_jobs", "5").unwrap();
        def.apply("notify=off").unwrap();
        def.apply("job_control = false").unwrap();
        assert_eq! { def.max_jobs, 5 };
        assert_eq! { def.notify, false };
        assert_eq! { def.job_control, false };
        assert_eq! { def.max_pipeline_stages, 50 };

        assert_eq!(ALL_PARAMS, ["max_jobs", "max_pipeline_stages", "notify", "job_control"]);
    }

    #[test]
    fn rejects_bad_overrides() {
        let mut def = Settings::default();
        assert!(def.set("max_jobs", "0").is_err());
        assert!(def.set("max_jobs", "1001").is_err());
        assert!(def.set("max_jobs", "-1").is_err());
        assert!(def.set("notify", "maybe").is_err());
        assert!(def.set("notanoption", "1").is_err());
        assert!(def.apply("max_jobs").is_err());
        assert_eq!(def, Settings::default());

        let Err(Error::InvalidSetting(text)) = def.set("max_pipeline_stages", "x") else {
            panic!()
        };
        assert_eq!(text, "max_pipeline_stages=x");
    }
}
