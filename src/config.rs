use dotenv::dotenv;
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use crate::detection::Sensitivity;
use crate::error::{Error, Result};
use crate::metrics::{ExtractorConfig, FamilySelection, DEFAULT_MAX_PACKETS};

pub const DEFAULT_PCAP_FILE: &str = "data/free5gc-compose.pcap";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub pcap_file: PathBuf,
    pub output_dir: PathBuf,
    pub max_packets: usize,
    pub sensitivity: Sensitivity,
    pub families: FamilySelection,
    pub verbose_level: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pcap_file: PathBuf::from(DEFAULT_PCAP_FILE),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            max_packets: DEFAULT_MAX_PACKETS,
            sensitivity: Sensitivity::Medium,
            families: FamilySelection::ALL,
            verbose_level: 1,
        }
    }
}

impl Config {
    /// Reads the process environment, after loading `.env` if there is one.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        if let Some(path) = lookup("PCAP_FILE_PATH") {
            config.pcap_file = PathBuf::from(path);
        }
        if let Some(dir) = lookup("OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("MAX_PACKETS") {
            config.max_packets = parse_number("MAX_PACKETS", &raw)?;
        }
        if let Some(raw) = lookup("SENSITIVITY") {
            config.sensitivity = raw.parse().unwrap_or_default();
        }
        if let Some(raw) = lookup("METRICS") {
            config.families = raw.parse()?;
        }
        if let Some(raw) = lookup("VERBOSE_LEVEL") {
            config.verbose_level = parse_number("VERBOSE_LEVEL", &raw)?;
        }
        Ok(config)
    }

    /// The capture file must exist and be readable.
    pub fn validate(&self) -> Result<()> {
        let unreadable =
            |e: std::io::Error| Error::Config(format!("capture file {} is not readable: {}", self.pcap_file.display(), e));
        let mut file = File::open(&self.pcap_file).map_err(unreadable)?;
        let mut probe = [0u8; 1024];
        let _read = file.read(&mut probe).map_err(unreadable)?;
        Ok(())
    }

    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            max_packets: self.max_packets,
            families: self.families,
            ..ExtractorConfig::default()
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a non-negative integer, got '{}'", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.max_packets, 1000);
        assert_eq!(config.pcap_file, PathBuf::from("data/free5gc-compose.pcap"));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PCAP_FILE_PATH", "/tmp/capture.pcap"),
            ("MAX_PACKETS", " 250 "),
            ("SENSITIVITY", "High"),
            ("METRICS", "latency,throughput"),
            ("VERBOSE_LEVEL", "0"),
        ]))
        .unwrap();
        assert_eq!(config.pcap_file, PathBuf::from("/tmp/capture.pcap"));
        assert_eq!(config.max_packets, 250);
        assert_eq!(config.sensitivity, Sensitivity::High);
        assert!(config.families.latency && !config.families.signal);
        assert_eq!(config.verbose_level, 0);
        assert_eq!(config.extractor_config().max_packets, 250);
    }

    #[test]
    fn test_bad_number() {
        let err = Config::from_lookup(lookup(&[("MAX_PACKETS", "lots")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        config.pcap_file = PathBuf::from("/nonexistent/capture.pcap");
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xd4, 0xc3, 0xb2, 0xa1]).unwrap();
        config.pcap_file = file.path().to_path_buf();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.pcap_file = dir.path().to_path_buf();
        match config.validate() {
            Err(Error::Config(msg)) => assert!(msg.contains("not readable"), "{}", msg),
            other => panic!("expected a config error, got {:?}", other),
        }
    }
}
