use super::ui;
use crate::core::chart::ZoomLevel;
use crate::core::session::{ChartUpdate, PortfolioSession};
use anyhow::Result;
use comfy_table::Cell;

/// What to chart, as given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartOptions {
    pub asset: Option<String>,
    pub fiat: Option<String>,
    pub exchange: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    /// Chart from cached prices only, without syncing first.
    pub offline: bool,
}

fn zoom_title(zoom: ZoomLevel) -> String {
    match zoom {
        ZoomLevel::Overview => "all time, monthly".to_string(),
        ZoomLevel::Year(y) => format!("{y}, monthly"),
        ZoomLevel::Month(y, m) => format!("{y}-{m:02}, daily"),
    }
}

impl ChartUpdate {
    pub fn display_as_table(&self) -> String {
        let page = self
            .page
            .as_ref()
            .map_or("No transactions".to_string(), |p| p.to_string());
        let mut output = format!(
            "{} {}\n",
            ui::style_text(&page, ui::StyleType::Title),
            ui::style_text(
                &format!("({}, {} transactions)", zoom_title(self.zoom), self.transaction_count),
                ui::StyleType::Subtle
            )
        );

        if let Some(diagnostic) = &self.diagnostic {
            output.push_str(&format!(
                "\n{}",
                ui::style_text(diagnostic, ui::StyleType::Error)
            ));
            return output;
        }
        if self.points.is_empty() {
            output.push_str(&format!(
                "\n{}",
                ui::style_text("No cached prices for this period yet.", ui::StyleType::Subtle)
            ));
            return output;
        }

        let single_pair = self.page.as_ref().is_some_and(|p| p.asset().is_some());
        let mut header = vec![
            ui::header_cell("Day"),
            ui::header_cell("Value"),
            ui::header_cell("Invested"),
            ui::header_cell("ROI"),
            ui::header_cell("ROI (%)"),
        ];
        if single_pair {
            header.extend([
                ui::header_cell("Holdings"),
                ui::header_cell("Price"),
                ui::header_cell("Avg buy"),
            ]);
        }
        let mut table = ui::new_styled_table();
        table.set_header(header);

        for point in &self.points {
            let mut row = vec![
                Cell::new(point.day.to_string()),
                ui::amount_cell(point.portfolio_value, 2),
                ui::amount_cell(point.total_invested, 2),
                ui::change_cell(point.roi_absolute, ""),
                ui::change_cell(point.roi_percent, "%"),
            ];
            if single_pair {
                row.extend([
                    ui::amount_cell(point.cumulative_crypto, 8),
                    ui::amount_cell(point.price, 2),
                    ui::amount_cell(point.avg_buy_price, 2),
                ]);
            }
            table.add_row(row);
        }
        output.push_str(&table.to_string());

        if let Some(last) = self.points.last() {
            output.push_str(&format!(
                "\n\n{} {}",
                ui::style_text("Current value:", ui::StyleType::TotalLabel),
                ui::style_text(
                    &ui::format_amount(last.portfolio_value, 2),
                    ui::StyleType::TotalValue
                )
            ));
        }
        output
    }
}

/// Selects page and zoom from `options`, then prints the chart. Unless
/// offline, the cached chart is printed first and redrawn after syncing.
pub async fn run(
    session: &mut PortfolioSession,
    options: &ChartOptions,
    default_fiat: &str,
) -> Result<()> {
    session.load().await?;
    if let Some(exchange) = &options.exchange {
        session.set_exchange_filter(Some(exchange.clone()));
    }
    if session.pages().is_empty() {
        println!(
            "{}",
            ui::style_text("No completed transactions to chart.", ui::StyleType::Subtle)
        );
        return Ok(());
    }
    let fiat = options.fiat.as_deref().unwrap_or(default_fiat);
    session.select_page_for(options.asset.as_deref(), fiat)?;
    if let Some(year) = options.year {
        session.zoom().drill_down_year(year)?;
        if let Some(month) = options.month {
            session.zoom().drill_down_month(month)?;
        }
    }

    if options.offline {
        if let Some(update) = session.load_chart().await {
            println!("{}", update.display_as_table());
        }
        return Ok(());
    }

    session.start_sync();
    if let Some(stale) = session.load_chart().await {
        println!("{}", stale.display_as_table());
    }

    let pb = ui::new_spinner("Syncing daily prices...");
    let synced = session.finish_sync().await;
    pb.finish_and_clear();
    if let Err(e) = synced {
        println!(
            "{}",
            ui::style_text(&format!("Price sync failed: {e:#}"), ui::StyleType::Error)
        );
    }

    if let Some(fresh) = session.load_chart().await {
        ui::print_separator();
        println!("{}", fresh.display_as_table());
    }
    Ok(())
}
