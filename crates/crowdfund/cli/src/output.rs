//! Output formatting

use crowdfund_types::LedgerEvent;

use crate::script::SimulationReport;

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// Full report as JSON
    Json,
}

pub fn print_report(report: &SimulationReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => print!("{}", render_text(report)),
    }
    Ok(())
}

pub fn event_line(event: &LedgerEvent) -> String {
    format!("[{}] {}", event.campaign_id(), event.kind())
}

fn render_text(report: &SimulationReport) -> String {
    let mut out = String::new();

    out.push_str("Steps\n");
    for step in &report.steps {
        let mark = if step.ok { "ok " } else { "ERR" };
        out.push_str(&format!(
            "  {:>3} {} {:<16} {}\n",
            step.index, mark, step.action, step.detail
        ));
    }

    out.push_str("\nCampaigns\n");
    if report.campaigns.is_empty() {
        out.push_str("  (none)\n");
    }
    for campaign in &report.campaigns {
        out.push_str(&format!(
            "  {} {:<10} {}/{} raised, {} refunded, {} released, {} in escrow  \"{}\"\n",
            campaign.id,
            campaign.status.name(),
            campaign.raised_minor,
            campaign.goal_minor,
            campaign.refunded_minor,
            campaign.released_minor(),
            campaign.escrow_minor(),
            campaign.title,
        ));
    }

    out.push_str("\nPayouts\n");
    if report.payouts.is_empty() {
        out.push_str("  (none)\n");
    }
    for payout in &report.payouts {
        let state = match payout.reference() {
            Some(reference) => format!("settled {}", reference),
            None => format!("pending after {} attempt(s)", payout.attempts()),
        };
        out.push_str(&format!(
            "  {} {:<7} {:>8} to {:<16} {}\n",
            payout.campaign_id,
            payout.kind.name(),
            payout.amount_minor,
            payout.recipient.as_str(),
            state,
        ));
    }

    out.push_str("\nBalances\n");
    if report.balances.is_empty() {
        out.push_str("  (none)\n");
    }
    for (identity, balance) in &report.balances {
        out.push_str(&format!("  {:<16} {}\n", identity, balance));
    }

    let stats = &report.stats;
    out.push_str(&format!(
        "\n{} campaigns: {} open, {} succeeded, {} failed; {} pending payouts; {} events\n",
        stats.campaigns,
        stats.open,
        stats.succeeded,
        stats.failed,
        stats.pending_payouts,
        report.events.len(),
    ));
    out
}
