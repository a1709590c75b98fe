use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    /// Import root used when no root is given on the command line.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Folder under the import root holding one spreadsheet per person.
    #[serde(default = "default_catalog_dir")]
    pub catalog_dir: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            root: None,
            catalog_dir: default_catalog_dir(),
        }
    }
}

fn default_catalog_dir() -> String {
    "目录".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScanConfig {
    /// Worker count for the directory walk; 0 means one per CPU.
    #[serde(default)]
    pub workers: usize,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl ScanConfig {
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LookupConfig {
    #[serde(default = "default_lookup_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_true")]
    pub cache: bool,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            concurrency: default_lookup_concurrency(),
            cache: true,
        }
    }
}

fn default_lookup_concurrency() -> usize {
    dossier_core::query::DEFAULT_LOOKUP_CONCURRENCY
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// Defaults with the database under `./data`, for commands that can run
    /// without a config file.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/dossier.sqlite"),
            },
            archive: ArchiveConfig::default(),
            scan: ScanConfig::default(),
            lookup: LookupConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.lookup.concurrency < 1 {
        anyhow::bail!("lookup.concurrency must be >= 1");
    }

    let catalog = config.archive.catalog_dir.trim();
    if catalog.is_empty() {
        anyhow::bail!("archive.catalog_dir must not be empty");
    }
    let mut components = Path::new(catalog).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => anyhow::bail!(
            "archive.catalog_dir must be a single folder name, got '{}'",
            config.archive.catalog_dir
        ),
    }

    for pattern in &config.scan.exclude_globs {
        globset::Glob::new(pattern)
            .with_context(|| format!("Invalid scan.exclude_globs pattern: {}", pattern))?;
    }

    Ok(())
}
