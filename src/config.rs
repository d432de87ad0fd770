use crate::types::Config;
use anyhow::Result;
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_is_an_error() {
        assert!(Config::load("no/such/config.yaml").is_err());
    }

    #[test]
    fn test_default_config_has_four_approaches() {
        let config = Config::default();
        assert_eq!(config.intersection.lanes.len(), 4);
        assert!(config.estimation.enable_smoothing);
    }
}
