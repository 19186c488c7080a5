use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable naming the reference table when `--table` is absent.
pub const TABLE_ENV: &str = "PRATO_TABLE";

const DEFAULT_TABLE_FILE: &str = "taco.csv";

pub struct Config {
    pub table_path: PathBuf,
}

impl Config {
    pub fn load(table_override: Option<PathBuf>) -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "prato").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let table_path =
            resolve_table_path(&data_dir, table_override, std::env::var_os(TABLE_ENV));

        Ok(Config { table_path })
    }
}

/// `--table` wins over the environment, which wins over the data directory.
fn resolve_table_path(
    data_dir: &Path,
    table_override: Option<PathBuf>,
    env: Option<OsString>,
) -> PathBuf {
    table_override
        .or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| data_dir.join(DEFAULT_TABLE_FILE))
}
