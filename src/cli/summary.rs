use super::ui;
use crate::core::holdings::{AssetHolding, PortfolioSummary, summarize};
use crate::core::transaction::{TransactionFilter, TransactionSource};
use anyhow::Result;
use comfy_table::{Cell, CellAlignment};

fn holdings_table(holdings: &[AssetHolding]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Asset"),
        ui::header_cell("Amount"),
        ui::header_cell("Invested"),
        ui::header_cell("Avg price"),
        ui::header_cell("Buys"),
    ]);
    for holding in holdings {
        table.add_row(vec![
            Cell::new(&holding.asset),
            ui::amount_cell(holding.total_amount, 8),
            Cell::new(format!("{} {}", ui::format_amount(holding.total_invested, 2), holding.fiat))
                .set_alignment(CellAlignment::Right),
            ui::amount_cell(holding.average_price, 2),
            Cell::new(holding.transaction_count).set_alignment(CellAlignment::Right),
        ]);
    }
    table.to_string()
}

impl PortfolioSummary {
    pub fn display_as_table(&self) -> String {
        let mut output = format!(
            "{}\n\n{}",
            ui::style_text("Holdings", ui::StyleType::Title),
            holdings_table(&self.holdings)
        );

        if self.exchanges.len() > 1 {
            for exchange in &self.exchanges {
                output.push_str(&format!(
                    "\n\n{}\n{}",
                    ui::style_text(&exchange.exchange, ui::StyleType::TotalLabel),
                    holdings_table(&exchange.holdings)
                ));
            }
        }

        let mut monthly = ui::new_styled_table();
        monthly.set_header(vec![
            ui::header_cell("Month"),
            ui::header_cell("Invested"),
            ui::header_cell("Buys"),
        ]);
        for month in &self.monthly {
            monthly.add_row(vec![
                Cell::new(month.label()),
                Cell::new(format!("{} {}", ui::format_amount(month.total_invested, 2), month.fiat))
                    .set_alignment(CellAlignment::Right),
                Cell::new(month.transaction_count).set_alignment(CellAlignment::Right),
            ]);
        }
        output.push_str(&format!(
            "\n\n{}\n\n{}",
            ui::style_text("Monthly investment", ui::StyleType::Title),
            monthly
        ));

        for totals in &self.fiat_totals {
            output.push_str(&format!(
                "\n\n{} {} ({} {} per month over {} months)",
                ui::style_text(
                    &format!("Total invested ({}):", totals.fiat),
                    ui::StyleType::TotalLabel
                ),
                ui::style_text(
                    &ui::format_amount(totals.total_invested, 2),
                    ui::StyleType::TotalValue
                ),
                totals.average_monthly_investment,
                totals.fiat,
                totals.active_months
            ));
        }
        output
    }
}

pub async fn run(ledger: &dyn TransactionSource) -> Result<PortfolioSummary> {
    let transactions = ledger.completed(&TransactionFilter::default()).await?;
    let summary = summarize(&transactions);
    if summary.total_transactions == 0 {
        println!(
            "{}",
            ui::style_text("No completed transactions in the ledger.", ui::StyleType::Subtle)
        );
    } else {
        println!("{}", summary.display_as_table());
    }
    Ok(summary)
}
