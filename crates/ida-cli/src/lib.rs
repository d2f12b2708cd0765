//! Shared entry-point plumbing for the audit and repair binaries.
//!
//! Every binary: forces `TZ=UTC`, loads `.env.local` if present, logs to
//! stderr, loads the layered config for its [`ToolMode`], resolves its
//! secrets once, and maps any error to one stderr line and exit code 1.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use ida_config::{
    load_config_root, report_unused_keys, resolve_secrets_for_tool, IdaConfig, LoadedConfig,
    ResolvedSecrets, ToolMode, UnusedKeyPolicy,
};
use ida_reconcile::Timestamp;
use tracing::{info, warn};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Parse arguments, bootstrap the process and run `body` to completion.
///
/// Argument errors exit 1 like any other failure; `--help` exits 0.
pub fn run_tool<C, F, Fut>(body: F) -> ExitCode
where
    C: Parser,
    F: FnOnce(C) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    // All timestamps are UTC; set before any thread exists.
    std::env::set_var("TZ", "UTC");

    let cli = match C::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Dev convenience. Silent when the file does not exist.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
        .and_then(|rt| rt.block_on(body(cli)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(1)
        }
    }
}

/// Configuration and secrets for one tool run.
pub struct ToolContext {
    pub loaded: LoadedConfig,
    pub config: IdaConfig,
    pub secrets: ResolvedSecrets,
}

/// Load `<config_root>`, warn about keys `mode` ignores, resolve secrets.
pub fn load_tool_context(config_root: &Path, mode: ToolMode) -> Result<ToolContext> {
    let loaded = load_config_root(config_root)?;
    let config = loaded.typed()?;

    let unused = report_unused_keys(mode, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !unused.is_clean() {
        warn!(
            mode = mode.as_str(),
            keys = ?unused.unused_leaf_pointers,
            "config keys not used by this tool"
        );
    }

    let secrets = resolve_secrets_for_tool(&config, mode)?;
    info!(
        mode = mode.as_str(),
        config_hash = %loaded.config_hash,
        sources = ?loaded.sources,
        "config loaded"
    );
    Ok(ToolContext {
        loaded,
        config,
        secrets,
    })
}

/// `<report_root>/<end>_<project>.json`.
pub fn default_report_path(report_root: &Path, end: Timestamp, project: &str) -> PathBuf {
    report_root.join(format!("{end}_{project}.json"))
}

/// Write `contents` to a temporary sibling and rename it over `path`.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create_dir_all {}", parent.display()))?;
    }
    let file_name = path
        .file_name()
        .with_context(|| format!("report path {} has no file name", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    std::fs::write(&tmp, contents).with_context(|| format!("write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_path_is_end_then_project() {
        let end = Timestamp::parse("2024-01-01T00:07:12Z").unwrap();
        assert_eq!(
            default_report_path(Path::new("/audits"), end, "2000123"),
            PathBuf::from("/audits/2024-01-01T00:07:12Z_2000123.json")
        );
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/report.json");
        write_atomic(&target, "{}\n").unwrap();
        write_atomic(&target, "{\"a\":1}\n").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "{\"a\":1}\n");
        assert!(!dir.path().join("nested/report.json.tmp").exists());
    }
}
