use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use ida_config::ToolMode;
use ida_reconcile::{CompareOptions, Cutoff};

#[derive(Parser)]
#[command(name = "ida-audit-project")]
#[command(about = "Audit one project across filesystem, webstore, registry and catalog")]
struct Cli {
    /// Directory holding config.yaml (and optionally config.local.yaml)
    config_root: PathBuf,

    /// Project identifier
    project: String,

    /// Cut-off instant; only records strictly before it are audited
    cutoff: String,

    /// Skip every timestamp comparison
    #[arg(long, default_value_t = false)]
    ignore_timestamps: bool,

    /// Report path; defaults to <audit.report_root>/<end>_<project>.json
    #[arg(long)]
    output: Option<PathBuf>,
}

async fn run(cli: Cli) -> Result<()> {
    let cutoff = Cutoff::parse(&cli.cutoff)
        .with_context(|| format!("invalid cut-off '{}'", cli.cutoff))?;
    let ctx = ida_cli::load_tool_context(&cli.config_root, ToolMode::Audit)?;

    let opts = if cli.ignore_timestamps {
        CompareOptions::ignoring_timestamps()
    } else {
        CompareOptions::default()
    };

    let auditor = ida_auditor::build_auditor(&ctx.config, &ctx.secrets, &cli.project).await?;
    let report = auditor.run(cutoff, opts).await?;
    let json = report.to_json()?;

    let path = match cli.output {
        Some(p) => p,
        None => ida_cli::default_report_path(
            &ctx.config.audit()?.report_root,
            report.end,
            &report.project,
        ),
    };
    ida_cli::write_atomic(&path, &json)?;

    println!(
        "report={} project={} invalid_nodes={} config_hash={}",
        path.display(),
        report.project,
        report.invalid_node_count,
        ctx.loaded.config_hash
    );
    Ok(())
}

fn main() -> ExitCode {
    ida_cli::run_tool(run)
}
