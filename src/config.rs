//! Adapter configuration file.

use crate::debugger::Error;
use crate::muted_error;
use serde::Deserialize;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the adapter listens on.
    pub listen: String,
    /// Stop on the first step of a turn when the client does not choose.
    pub break_on_start: bool,
    /// How many values printed to the console stay expandable.
    pub output_cache: usize,
    /// Event filters enabled for a new client.
    pub exception_filters: Vec<String>,
    /// Log every protocol frame into this file.
    pub trace_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:4712".to_string(),
            break_on_start: false,
            output_cache: 25,
            exception_filters: vec!["error".to_string()],
            trace_file: None,
        }
    }
}

impl Config {
    const DEFAULT_PATH: &'static str = ".config/dialog-dap/config.toml";

    /// Load configuration from `path`, or from the default location under the home directory.
    ///
    /// A missing default file yields the default configuration, a missing explicit one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        let data = match path {
            Some(path) => read_to_string(path)?,
            None => {
                let Some(home) = home::home_dir() else {
                    return Ok(Self::default());
                };
                match muted_error!(read_to_string(home.join(Self::DEFAULT_PATH))) {
                    Some(data) => data,
                    None => return Ok(Self::default()),
                }
            }
        };
        Self::parse(&data)
    }

    pub fn parse(data: &str) -> Result<Self, Error> {
        Ok(toml::de::from_str(data)?)
    }
}
