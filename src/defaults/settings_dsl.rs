macro_rules! range_check {
    ($value:expr) => {
        Some($value)
    };
    ($value:expr, $first:literal, $last:literal) => {
        Some($value).filter(|value| ($first..=$last).contains(value))
    };
}

macro_rules! settings {
    ($($name:ident : $type:ty = $default:literal $([$first:literal ..= $last:literal])?)*) => {
        /// In-memory shell options. Nothing here is ever persisted.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct Settings {
            $(pub $name: $type,)*
        }

        impl Default for Settings {
            fn default() -> Self {
                Self {
                    $($name: $default,)*
                }
            }
        }

        pub const ALL_PARAMS: &[&str] = &[
            $(stringify!($name)),*
        ];

        impl Settings {
            /// Override one option from its textual form.
            pub fn set(&mut self, name: &str, value: &str) -> Result<(), Error> {
                let invalid = || Error::InvalidSetting(format!("{name}={value}"));
                match name {
                    $(stringify!($name) => {
                        let parsed = <$type as SettingValue>::parse_setting(value.trim())
                            .and_then(|value| range_check!(value $(, $first, $last)?))
                            .ok_or_else(invalid)?;
                        self.$name = parsed;
                    })*
                    _ => return Err(invalid()),
                }
                Ok(())
            }
        }
    };
}

pub(super) use range_check;
pub(super) use settings;
