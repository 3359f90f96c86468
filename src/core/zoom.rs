use crate::core::chart::ZoomLevel;
use crate::core::transaction::Transaction;
use anyhow::{Result, bail};
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Drill-down state of the chart and the periods reachable from it.
///
/// Only years and months holding at least one completed transaction, and not
/// later than today, can be entered or navigated to.
#[derive(Debug, Clone)]
pub struct ZoomNavigator {
    level: ZoomLevel,
    periods: BTreeMap<i32, BTreeSet<u32>>,
}

fn collect_periods(transactions: &[Transaction], today: NaiveDate) -> BTreeMap<i32, BTreeSet<u32>> {
    let mut periods: BTreeMap<i32, BTreeSet<u32>> = BTreeMap::new();
    for day in transactions
        .iter()
        .filter(|tx| tx.is_completed())
        .map(Transaction::day)
    {
        if (day.year(), day.month()) <= (today.year(), today.month()) {
            periods.entry(day.year()).or_default().insert(day.month());
        }
    }
    periods
}

impl ZoomNavigator {
    pub fn new(transactions: &[Transaction], today: NaiveDate) -> Self {
        Self {
            level: ZoomLevel::Overview,
            periods: collect_periods(transactions, today),
        }
    }

    pub fn level(&self) -> ZoomLevel {
        self.level
    }

    pub fn available_years(&self) -> Vec<i32> {
        self.periods.keys().copied().collect()
    }

    /// Months of the year currently zoomed into; empty at the overview.
    pub fn available_months(&self) -> Vec<u32> {
        match self.level {
            ZoomLevel::Overview => Vec::new(),
            ZoomLevel::Year(y) | ZoomLevel::Month(y, _) => self.months_of(y),
        }
    }

    fn months_of(&self, year: i32) -> Vec<u32> {
        self.periods
            .get(&year)
            .map(|months| months.iter().copied().collect())
            .unwrap_or_default()
    }

    fn is_valid(&self, level: ZoomLevel) -> bool {
        match level {
            ZoomLevel::Overview => true,
            ZoomLevel::Year(y) => self.periods.contains_key(&y),
            ZoomLevel::Month(y, m) => self
                .periods
                .get(&y)
                .is_some_and(|months| months.contains(&m)),
        }
    }

    /// Swaps in a new transaction set, keeping the current level if it still
    /// names a period with transactions.
    pub fn set_transactions(&mut self, transactions: &[Transaction], today: NaiveDate) {
        self.periods = collect_periods(transactions, today);
        if !self.is_valid(self.level) {
            debug!("Zoom {} no longer available, back to overview", self.level);
            self.level = ZoomLevel::Overview;
        }
    }

    pub fn drill_down_year(&mut self, year: i32) -> Result<()> {
        if self.level != ZoomLevel::Overview {
            bail!("Can only drill into a year from the overview");
        }
        if !self.is_valid(ZoomLevel::Year(year)) {
            bail!("No transactions in {year}");
        }
        self.level = ZoomLevel::Year(year);
        Ok(())
    }

    pub fn drill_down_month(&mut self, month: u32) -> Result<()> {
        let ZoomLevel::Year(year) = self.level else {
            bail!("Can only drill into a month from a year");
        };
        if !self.is_valid(ZoomLevel::Month(year, month)) {
            bail!("No transactions in {year}-{month:02}");
        }
        self.level = ZoomLevel::Month(year, month);
        Ok(())
    }

    /// Moves one level up. Returns false at the overview.
    pub fn zoom_out(&mut self) -> bool {
        self.level = match self.level {
            ZoomLevel::Month(y, _) => ZoomLevel::Year(y),
            ZoomLevel::Year(_) => ZoomLevel::Overview,
            ZoomLevel::Overview => return false,
        };
        true
    }

    pub fn reset(&mut self) {
        self.level = ZoomLevel::Overview;
    }

    fn prev_level(&self) -> Option<ZoomLevel> {
        match self.level {
            ZoomLevel::Overview => None,
            ZoomLevel::Year(y) => self
                .periods
                .range(..y)
                .next_back()
                .map(|(y, _)| ZoomLevel::Year(*y)),
            ZoomLevel::Month(y, m) => {
                let same_year = self
                    .periods
                    .get(&y)
                    .and_then(|months| months.range(..m).next_back())
                    .map(|m| ZoomLevel::Month(y, *m));
                same_year.or_else(|| {
                    let (year, months) = self.periods.range(..y).next_back()?;
                    months.last().map(|m| ZoomLevel::Month(*year, *m))
                })
            }
        }
    }

    fn next_level(&self) -> Option<ZoomLevel> {
        match self.level {
            ZoomLevel::Overview => None,
            ZoomLevel::Year(y) => self
                .periods
                .range(y + 1..)
                .next()
                .map(|(y, _)| ZoomLevel::Year(*y)),
            ZoomLevel::Month(y, m) => {
                let same_year = self
                    .periods
                    .get(&y)
                    .and_then(|months| months.range(m + 1..).next())
                    .map(|m| ZoomLevel::Month(y, *m));
                same_year.or_else(|| {
                    let (year, months) = self.periods.range(y + 1..).next()?;
                    months.first().map(|m| ZoomLevel::Month(*year, *m))
                })
            }
        }
    }

    pub fn can_navigate_prev(&self) -> bool {
        self.prev_level().is_some()
    }

    pub fn can_navigate_next(&self) -> bool {
        self.next_level().is_some()
    }

    /// Steps to the previous year or month with transactions. Month steps
    /// cross into the previous year. Returns false when already at the start.
    pub fn navigate_prev(&mut self) -> bool {
        match self.prev_level() {
            Some(level) => {
                self.level = level;
                true
            }
            None => false,
        }
    }

    pub fn navigate_next(&mut self) -> bool {
        match self.next_level() {
            Some(level) => {
                self.level = level;
                true
            }
            None => false,
        }
    }
}
