use super::ui;
use crate::core::sync::{BackfillOutcome, DailyPriceSync, ForwardOutcome, SyncReport};
use anyhow::Result;
use comfy_table::{Cell, CellAlignment};

fn forward_text(outcome: &ForwardOutcome) -> String {
    match outcome {
        ForwardOutcome::Bootstrapped { stored } => format!("bootstrapped ({stored} days)"),
        ForwardOutcome::GapFilled { stored } => format!("updated ({stored} days)"),
        ForwardOutcome::UpToDate => "up to date".to_string(),
        ForwardOutcome::Unavailable { reason } => format!("unavailable: {reason}"),
    }
}

fn backfill_text(outcome: &BackfillOutcome) -> String {
    match outcome {
        BackfillOutcome::Covered => "complete".to_string(),
        BackfillOutcome::NoAnchor => "waiting for recent prices".to_string(),
        BackfillOutcome::Completed => "reached start".to_string(),
        BackfillOutcome::Exhausted => "no older history".to_string(),
        BackfillOutcome::Unavailable { reason } => format!("unavailable: {reason}"),
        BackfillOutcome::Stalled => "stalled".to_string(),
    }
}

impl SyncReport {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Pair"),
            ui::header_cell("History from"),
            ui::header_cell("Recent prices"),
            ui::header_cell("Backfill"),
            ui::header_cell("Days added"),
        ]);

        for pair in &self.pairs {
            table.add_row(vec![
                Cell::new(format!("{}/{}", pair.asset, pair.fiat)),
                Cell::new(pair.desired_start.to_string()),
                Cell::new(forward_text(&pair.forward)),
                Cell::new(backfill_text(&pair.backfill)),
                Cell::new(pair.backfill_stored).set_alignment(CellAlignment::Right),
            ]);
        }

        let mut output = format!(
            "{}\n\n{}",
            ui::style_text("Price sync", ui::StyleType::Title),
            table
        );
        for failure in &self.failures {
            output.push_str(&format!(
                "\n{}",
                ui::style_text(
                    &format!("{}/{}: {}", failure.asset, failure.fiat, failure.error),
                    ui::StyleType::Error
                )
            ));
        }
        output
    }
}

pub async fn run(sync: &DailyPriceSync) -> Result<SyncReport> {
    let pb = ui::new_spinner("Syncing daily prices...");
    let report = sync.sync().await;
    pb.finish_and_clear();

    let report = report?;
    if report.pairs.is_empty() && report.failures.is_empty() {
        println!(
            "{}",
            ui::style_text("No completed transactions to sync prices for.", ui::StyleType::Subtle)
        );
    } else {
        println!("{}", report.display_as_table());
    }
    Ok(report)
}
