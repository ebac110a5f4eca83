use crate::resolve::DEFAULT_SCAN_CAP;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; flags win.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub store_root: String,
    pub public_base_url: Option<String>,
    pub execute: bool,
    pub hygiene_only: bool,
    pub scan_cap: usize,
    pub migrate: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Reorganize stored objects to mirror the catalog hierarchy")]
pub struct Args {
    /// Catalog database URL (overrides STORAGE_REORG_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Object store root directory (overrides STORAGE_REORG_STORE_ROOT)
    #[arg(long)]
    pub store_root: Option<String>,

    /// Public base URL objects are served under (overrides STORAGE_REORG_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Apply changes; without this flag both passes run side-effect-free
    #[arg(long)]
    pub execute: bool,

    /// Run only the link hygiene pass, skipping relocation
    #[arg(long)]
    pub hygiene_only: bool,

    /// Cap on store entries the resolver's listing fallback may examine
    /// (overrides STORAGE_REORG_SCAN_CAP)
    #[arg(long)]
    pub scan_cap: Option<usize>,

    /// Apply the initial schema and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into an AppConfig.
    ///
    /// Missing required parameters are reported together in one error so a
    /// misconfigured invocation fails once with the full list.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    fn from_args(args: Args) -> Result<Self> {
        let env_db = env::var("STORAGE_REORG_DATABASE_URL").ok();
        let env_root = env::var("STORAGE_REORG_STORE_ROOT").ok();
        let env_base = env::var("STORAGE_REORG_PUBLIC_BASE_URL").ok();
        let env_cap = match env::var("STORAGE_REORG_SCAN_CAP") {
            Ok(value) => Some(
                value
                    .parse::<usize>()
                    .with_context(|| format!("parsing STORAGE_REORG_SCAN_CAP value `{}`", value))?,
            ),
            Err(_) => None,
        };

        let database_url = args.database_url.or(env_db);
        let store_root = args.store_root.or(env_root);

        let mut missing = Vec::new();
        if database_url.is_none() {
            missing.push("--database-url / STORAGE_REORG_DATABASE_URL");
        }
        if store_root.is_none() {
            missing.push("--store-root / STORAGE_REORG_STORE_ROOT");
        }

        match (database_url, store_root) {
            (Some(database_url), Some(store_root)) => Ok(Self {
                database_url,
                store_root,
                public_base_url: args.public_base_url.or(env_base),
                execute: args.execute,
                hygiene_only: args.hygiene_only,
                scan_cap: args.scan_cap.or(env_cap).unwrap_or(DEFAULT_SCAN_CAP),
                migrate: args.migrate,
            }),
            _ => bail!("missing required configuration: {}", missing.join(", ")),
        }
    }
}
