use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use ida_config::ToolMode;
use ida_journal::{journal_path_for, RepairJournal};
use ida_reconcile::PathLayout;
use ida_repair::{execute_purge, load_report, plan_purge, CacheRowStore, DbCacheRows};
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "ida-purge-orphans")]
#[command(about = "Delete webstore cache rows whose file no longer exists")]
struct Cli {
    /// Directory holding config.yaml (and optionally config.local.yaml)
    config_root: PathBuf,

    /// Audit report to purge from
    report_path: PathBuf,

    /// Journal planned deletes without connecting to the database
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = ida_cli::load_tool_context(&cli.config_root, ToolMode::PurgeOrphans)?;
    let report = load_report(&cli.report_path)?;
    let layout = PathLayout::new(
        report.project.as_str(),
        ctx.config.staging_folder_suffix.as_str(),
    );
    let plan = plan_purge(&report, &layout);
    info!(
        project = %report.project,
        candidates = plan.candidates.len(),
        refused = plan.refused.len(),
        "orphan purge planned"
    );

    let store = if cli.dry_run || plan.candidates.is_empty() {
        None
    } else {
        Some(DbCacheRows::connect(&ctx.config, &ctx.secrets, &report.project).await?)
    };

    let run_id = Uuid::new_v4();
    let mut journal = RepairJournal::open(
        journal_path_for(&cli.report_path),
        "ida-purge-orphans",
        run_id,
    )?;
    let summary = execute_purge(
        &plan,
        store.as_ref().map(|s| s as &dyn CacheRowStore),
        &mut journal,
    )
    .await?;

    println!(
        "run_id={} project={} dry_run={} {} journal={}",
        run_id,
        report.project,
        cli.dry_run,
        summary,
        journal.path().display()
    );
    Ok(())
}

fn main() -> ExitCode {
    ida_cli::run_tool(run)
}
