use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Args;
use pmsync_core::{
    config::{Config, RunKind},
    directory::{load_condition, DirectorySource, SheetsClient},
    dry_run::DryRunTracker,
    prune::{prune, target_day, IssueFilter, PruneReport},
    tracker::JiraClient,
    types::{parse_day, RunContext},
};
use tracing::info;

#[derive(Args)]
pub struct PruneArgs {
    /// Prune the day this many days before today (overrides prune.days_ago)
    #[arg(long, value_name = "N", conflicts_with = "date")]
    days_ago: Option<u32>,

    /// Prune this exact day
    #[arg(long, value_name = "YYYY-MM-DD")]
    date: Option<String>,

    /// Log the issues that would be deleted without deleting them
    #[arg(long)]
    dry_run: bool,

    /// Exit non-zero if any query or delete fails
    #[arg(long)]
    strict: bool,
}

pub fn run(config: &Config, args: PruneArgs, json: bool) -> anyhow::Result<()> {
    config.ensure_runnable(RunKind::Prune)?;

    let explicit = args.date.as_deref().map(parse_day).transpose()?;
    let target = target_day(
        &RunContext::today(),
        explicit,
        args.days_ago.or(config.prune.days_ago),
    )?;

    let sheets = match &config.prune.condition_cell {
        Some(_) => Some(SheetsClient::new(&config.directory, config.tracker.timeout_secs)?),
        None => None,
    };
    let condition = load_condition(sheets.as_ref().map(|s| s as &dyn DirectorySource), config)
        .context("failed to read the prune condition")?;

    let filter = IssueFilter::from_config(config, target, condition);
    let client = JiraClient::new(&config.tracker)?;
    info!(target = %target, date = %filter.date_text, dry_run = args.dry_run, "pruning");
    let mut simulated = Vec::new();
    let report = if args.dry_run {
        let dry = DryRunTracker::new(client);
        let report = prune(&dry, &filter, &config.summaries);
        simulated = dry.removed();
        report
    } else {
        prune(&client, &filter, &config.summaries)
    };
    let summary = report.summary();
    info!(%summary, "prune finished");

    if json {
        print_json(&serde_json::json!({
            "target": target,
            "date_text": filter.date_text,
            "dry_run": args.dry_run,
            "simulated": simulated,
            "results": report.results,
            "errors": report.errors,
            "summary": summary,
        }))?;
    } else {
        print_report(&report);
        println!();
        println!("{summary}");
        if args.dry_run {
            println!("dry run: {} issue(s) would be deleted", simulated.len());
        }
    }

    super::finish("prune", &summary, super::exit_mode(args.strict, config.exit_mode))
}

fn print_report(report: &PruneReport) {
    if report.results.is_empty() {
        println!("Nothing to prune.");
    } else {
        let rows = report
            .results
            .iter()
            .map(|r| {
                vec![
                    r.key.clone(),
                    r.issue_type
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "?".to_string()),
                    r.action.to_string(),
                    r.summary.clone(),
                    r.detail.clone().unwrap_or_default(),
                ]
            })
            .collect();
        print_table(&["KEY", "TYPE", "ACTION", "SUMMARY", "DETAIL"], rows);
    }
    for e in &report.errors {
        println!("[error] {e}");
    }
}
