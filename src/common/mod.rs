#![forbid(unsafe_code)]

pub use env::{set_env_var, Environment};
pub use error::Error;

pub mod env;
pub mod error;
