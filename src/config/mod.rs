//! Application configuration management

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Managed repository root; every relocation source must live under it
    pub repo_dir: PathBuf,

    /// Destination zone for quarantined files
    pub quarantine_dir: PathBuf,

    /// Destination zone for approved/show files
    pub show_media_dir: PathBuf,

    /// Where generated proxies land (defaults to `<repo>/_proxies`)
    pub proxy_dir: PathBuf,

    /// Google spreadsheet id holding the inventory ledger
    pub spreadsheet_id: Option<String>,

    /// Worksheet (tab) name inside the spreadsheet
    pub sheet_name: String,

    /// Number of background job workers
    pub job_workers: usize,
}

impl Config {
    /// Load configuration from environment variables (a `.env` file is
    /// honored when present)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let repo_dir = PathBuf::from(env::var("REPO_DIR").unwrap_or_else(|_| "/repo".to_string()));

        let proxy_dir = env::var("PROXY_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| repo_dir.join("_proxies"));

        Ok(Self {
            quarantine_dir: PathBuf::from(
                env::var("QUARANTINE_DIR").unwrap_or_else(|_| "/repo_quarantine".to_string()),
            ),

            show_media_dir: PathBuf::from(
                env::var("SHOW_MEDIA_DIR").unwrap_or_else(|_| "/repo_show".to_string()),
            ),

            spreadsheet_id: env::var("SHEETS_SPREADSHEET_ID").ok(),

            sheet_name: env::var("GOOGLE_SHEET_NAME")
                .unwrap_or_else(|_| "Media Repo Inventory".to_string()),

            job_workers: env::var("JOB_WORKERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .context("Invalid JOB_WORKERS")?,

            repo_dir,
            proxy_dir,
        })
    }
}
