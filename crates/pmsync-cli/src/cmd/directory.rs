use crate::output::{print_json, print_table};
use anyhow::Context;
use pmsync_core::{
    config::{Config, RunKind},
    directory::{load_directory, SheetsClient},
};

pub fn run(config: &Config, json: bool) -> anyhow::Result<()> {
    config.ensure_runnable(RunKind::Directory)?;

    let sheets = SheetsClient::new(&config.directory, config.tracker.timeout_secs)?;
    let directory = load_directory(&sheets, config).context("failed to read the roster")?;

    if json {
        print_json(&directory.assignments)?;
        return Ok(());
    }

    let rows: Vec<Vec<String>> = directory
        .assignments
        .iter()
        .map(|a| vec![a.owner.clone(), a.projects.join(", ")])
        .collect();
    print_table(&["OWNER", "PROJECTS"], rows);
    Ok(())
}
