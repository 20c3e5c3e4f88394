use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Args;
use pmsync_core::{
    config::{Config, RunKind},
    directory::{load_directory, SheetsClient},
    dry_run::DryRunTracker,
    reconcile::{reconcile, summarize, ReconcileOptions, ReconcileResult},
    tracker::JiraClient,
    types::{parse_day, RunContext},
};
use tracing::info;

#[derive(Args)]
pub struct ReconcileArgs {
    /// Day to reconcile (default: today)
    #[arg(long, value_name = "YYYY-MM-DD")]
    day: Option<String>,

    /// Log the issues that would be created without creating them
    #[arg(long)]
    dry_run: bool,

    /// Exit non-zero if any owner or project fails
    #[arg(long)]
    strict: bool,
}

pub fn run(config: &Config, args: ReconcileArgs, json: bool) -> anyhow::Result<()> {
    config.ensure_runnable(RunKind::Reconcile)?;

    let ctx = match &args.day {
        Some(day) => RunContext::new(parse_day(day)?),
        None => RunContext::today(),
    };

    let sheets = SheetsClient::new(&config.directory, config.tracker.timeout_secs)?;
    let directory = load_directory(&sheets, config).context("failed to read the roster")?;

    let client = JiraClient::new(&config.tracker)?;
    let opts = ReconcileOptions::from_config(config);
    info!(day = %ctx.day, dry_run = args.dry_run, "reconciling");
    let mut simulated = Vec::new();
    let results = if args.dry_run {
        let dry = DryRunTracker::new(client);
        let results = reconcile(&dry, &directory, &ctx, &opts);
        simulated = dry.created().into_iter().map(|issue| issue.key).collect();
        results
    } else {
        reconcile(&client, &directory, &ctx, &opts)
    };
    let summary = summarize(&results);
    info!(%summary, "reconcile finished");

    if json {
        print_json(&serde_json::json!({
            "day": ctx.day,
            "dry_run": args.dry_run,
            "simulated": simulated,
            "results": results,
            "summary": summary,
        }))?;
    } else {
        print_table(&["OWNER", "PROJECT", "TYPE", "ACTION", "KEY", "SUMMARY"], rows(&results));
        println!();
        println!("{summary}");
        if args.dry_run {
            println!("dry run: {} issue(s) would be created", simulated.len());
        }
    }

    super::finish("reconcile", &summary, super::exit_mode(args.strict, config.exit_mode))
}

fn rows(results: &[ReconcileResult]) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for r in results {
        for step in &r.steps {
            rows.push(vec![
                r.owner.clone(),
                r.project.clone(),
                step.issue_type.to_string(),
                step.action.to_string(),
                step.key.clone().unwrap_or_else(|| "-".to_string()),
                step.summary.clone(),
            ]);
        }
        if r.steps.is_empty() {
            if let Some(error) = &r.error {
                rows.push(vec![
                    r.owner.clone(),
                    r.project.clone(),
                    "-".to_string(),
                    "errored".to_string(),
                    "-".to_string(),
                    error.clone(),
                ]);
            }
        }
    }
    rows
}
