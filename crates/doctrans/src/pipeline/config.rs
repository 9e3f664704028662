use std::path::PathBuf;

use crate::config::Config;

pub struct PipelineConfig {
    pub data_directory: PathBuf,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            data_directory: config.data_path(),
        }
    }
}
