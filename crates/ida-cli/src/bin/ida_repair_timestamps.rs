use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use ida_catalog::CatalogClient;
use ida_config::ToolMode;
use ida_journal::{journal_path_for, RepairJournal};
use ida_repair::{
    execute_timestamp_repairs, load_report, plan_timestamp_repairs, HttpTimestampTarget,
    ServiceClient,
};
use tracing::info;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "ida-repair-timestamps")]
#[command(about = "Push authoritative timestamps for nodes flagged in an audit report")]
struct Cli {
    /// Directory holding config.yaml (and optionally config.local.yaml)
    config_root: PathBuf,

    /// Audit report to repair from
    report_path: PathBuf,

    /// Journal planned updates without sending them
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = ida_cli::load_tool_context(&cli.config_root, ToolMode::RepairTimestamps)?;
    let report = load_report(&cli.report_path)?;
    let plan = plan_timestamp_repairs(&report);
    info!(
        project = %report.project,
        updates = plan.updates.len(),
        skipped = plan.skipped.len(),
        "timestamp repair planned"
    );

    let service = ServiceClient::from_settings(ctx.config.service()?, &ctx.secrets)?;
    let catalog = CatalogClient::from_settings(ctx.config.catalog()?, &ctx.secrets)?;
    let target = HttpTimestampTarget::new(service, catalog);

    let run_id = Uuid::new_v4();
    let mut journal = RepairJournal::open(
        journal_path_for(&cli.report_path),
        "ida-repair-timestamps",
        run_id,
    )?;
    let summary = execute_timestamp_repairs(&plan, &target, &mut journal, cli.dry_run).await?;

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
