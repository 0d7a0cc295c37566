use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{anyhow, Context, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub areas: PathBuf, // .geojson / .json / .shp
    #[serde(default = "default_area_code_field")]
    pub area_code_field: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatePolicy {
    /// One unparseable event date aborts the whole load.
    #[default]
    Strict,
    /// Unparseable event dates drop their row and are counted.
    Skip,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProcessingConfig {
    #[serde(default)]
    pub date_policy: DatePolicy,
    #[serde(default)]
    pub fill_year_gaps: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

fn default_area_code_field() -> String {
    "codigo".to_string()
}

fn default_delimiter() -> char {
    '\t'
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_max_upload_mb() -> usize {
    64
}

impl AppConfig {
    /// Reads and validates a TOML config; a bad delimiter fails here rather
    /// than on the first upload.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {:?}", path))?;
        config
            .delimiter_byte()
            .with_context(|| format!("Invalid [input] section in {:?}", path))?;
        Ok(config)
    }

    /// Delimiter as the single ASCII byte the CSV reader expects.
    pub fn delimiter_byte(&self) -> Result<u8> {
        let delimiter = self.input.delimiter;
        if !delimiter.is_ascii() {
            return Err(anyhow!("Delimiter {:?} is not an ASCII character", delimiter));
        }
        Ok(delimiter as u8)
    }
}
