use anyhow::Result;
use chrono::Utc;

use crate::aggregation::round_2dp;
use crate::report::{Report, BALANCE_UNAVAILABLE};
use crate::sync::Pipeline;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run,
    Watch,
    Summary,
    Distribution,
}

pub fn parse_args<I>(mut args: I) -> std::result::Result<Command, String>
where
    I: Iterator<Item = String>,
{
    // Drop argv[0].
    let _ = args.next();

    let Some(cmd) = args.next() else {
        return Ok(Command::Run);
    };

    let parsed = match cmd.as_str() {
        "run" => Command::Run,
        "watch" => Command::Watch,
        "summary" => Command::Summary,
        "distribution" => Command::Distribution,
        other => {
            return Err(format!(
                "unknown command: {other} (expected run, watch, summary or distribution)"
            ))
        }
    };
    if let Some(extra) = args.next() {
        return Err(format!("unexpected argument: {extra}"));
    }
    Ok(parsed)
}

/// Offline commands: read the store, never touch the network.
pub fn run_command(pipeline: &Pipeline, cmd: &Command) -> Result<()> {
    match cmd {
        Command::Run | Command::Watch => Ok(()),
        Command::Summary => {
            print!("{}", render_summary(&offline_report(pipeline)?));
            Ok(())
        }
        Command::Distribution => {
            print!("{}", render_distribution(&offline_report(pipeline)?));
            Ok(())
        }
    }
}

pub fn offline_report(pipeline: &Pipeline) -> Result<Report> {
    let data = pipeline.store().load()?;
    Ok(pipeline.analyze(&data, BALANCE_UNAVAILABLE.to_string(), Utc::now()))
}

pub fn render_summary(report: &Report) -> String {
    let s = &report.summary;
    let mut out = String::new();
    out.push_str(&format!(
        "Locks: {} (total {:.2}, unique lockers {})\n",
        s.lock_count,
        round_2dp(s.total_locked),
        s.unique_lockers
    ));
    out.push_str(&format!(
        "Votes: {} (voting power {:.2}, unique voters {})\n",
        s.vote_count,
        round_2dp(s.total_voting_power),
        s.unique_voters
    ));
    out.push_str("Daily:\n");
    for d in &report.daily {
        out.push_str(&format!(
            "{}  locked={:>12.4} ({:>3})  power={:>12.4} ({:>3})  cum_locked={:.4}  cum_power={:.4}\n",
            d.date,
            d.locked_amount.round_dp(4),
            d.lock_count,
            d.voting_power.round_dp(4),
            d.vote_count,
            d.cumulative_locked.round_dp(4),
            d.cumulative_voting_power.round_dp(4)
        ));
    }
    out
}

pub fn render_distribution(report: &Report) -> String {
    let mut out = String::from("Lock size distribution:\n");
    for b in &report.distribution {
        out.push_str(&format!("{}  {}\n", b.order, b.label));
    }
    out
}
