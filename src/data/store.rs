use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::utils;

pub const PRICE_BARS: &str = "price_bars";
pub const FINANCIALS: &str = "financials";
pub const FINANCIALS_AS_REPORTED: &str = "financials_as_reported";
pub const COMPANY_PROFILES: &str = "company_profiles";
pub const DIVIDENDS: &str = "dividends";

/// Root of the on-disk archive, one subfolder per data category.
#[derive(Debug, Clone)]
pub struct DataFolder {
    root: PathBuf,
}

impl DataFolder {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        info!("Data will be saved to: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates `root/category` if needed and returns it
    pub fn subfolder(&self, category: &str) -> std::io::Result<PathBuf> {
        let dir = self.root.join(category);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Path of `file_name` under `category`, without touching the disk
    pub fn path(&self, category: &str, file_name: &str) -> PathBuf {
        self.root.join(category).join(file_name)
    }

    pub fn exists(&self, category: &str, file_name: &str) -> bool {
        self.path(category, file_name).exists()
    }

    pub fn save<T: Serialize>(
        &self,
        category: &str,
        file_name: &str,
        value: &T,
    ) -> std::io::Result<PathBuf> {
        let path = self.subfolder(category)?.join(file_name);
        utils::write_json(value, &path)?;
        debug!("wrote {}", path.display());
        Ok(path)
    }
}
