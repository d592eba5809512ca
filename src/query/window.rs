//! Time windows and prior-period arithmetic.
//!
//! A window arrives either as a named shorthand (`last_4_weeks`, `mtd`),
//! an explicit half-open date range, or already-resolved bounds (the
//! diagnostic path uses the latter for prior periods). Bounds know how
//! to shift themselves back one window of equal length and how to render
//! themselves as a predicate over the fact date column.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::sql::expr::{current_date, date_trunc, interval, lit_date};
use crate::sql::token::IntervalUnit;
use crate::sql::{Expr, ExprExt};

/// Calendar grain for to-date windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarGrain {
    Month,
    Quarter,
    Year,
}

impl CalendarGrain {
    /// Argument for `DATE_TRUNC`.
    pub fn trunc_name(&self) -> &'static str {
        match self {
            CalendarGrain::Month => "month",
            CalendarGrain::Quarter => "quarter",
            CalendarGrain::Year => "year",
        }
    }

    /// One grain unit as an interval, in months or years.
    fn unit_interval(&self, periods: u32) -> Expr {
        match self {
            CalendarGrain::Month => interval(periods, IntervalUnit::Months),
            CalendarGrain::Quarter => interval(periods * 3, IntervalUnit::Months),
            CalendarGrain::Year => interval(periods, IntervalUnit::Years),
        }
    }
}

/// Resolved window bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowBounds {
    /// The `len_days` days ending `offset_days` before today.
    /// `offset_days = 0` is the current rolling window.
    Rolling { len_days: u32, offset_days: u32 },
    /// Period-to-date, `periods_back` grain units ago.
    ToDate {
        grain: CalendarGrain,
        periods_back: u32,
    },
    /// Explicit half-open range: `start <= d < end`.
    Absolute { start: NaiveDate, end: NaiveDate },
}

impl WindowBounds {
    /// The immediately preceding window of equal length.
    pub fn prior(&self) -> WindowBounds {
        match self {
            WindowBounds::Rolling {
                len_days,
                offset_days,
            } => WindowBounds::Rolling {
                len_days: *len_days,
                offset_days: offset_days + len_days,
            },
            WindowBounds::ToDate {
                grain,
                periods_back,
            } => WindowBounds::ToDate {
                grain: *grain,
                periods_back: periods_back + 1,
            },
            WindowBounds::Absolute { start, end } => {
                let span = *end - *start;
                WindowBounds::Absolute {
                    start: *start - span,
                    end: *start,
                }
            }
        }
    }

    /// Render as a predicate over the fact date column.
    pub fn predicate(&self, column: Expr) -> Expr {
        match self {
            WindowBounds::Rolling {
                len_days,
                offset_days: 0,
            } => column.gte(current_date().sub(interval(*len_days, IntervalUnit::Days))),
            WindowBounds::Rolling {
                len_days,
                offset_days,
            } => {
                let lower =
                    current_date().sub(interval(offset_days + len_days, IntervalUnit::Days));
                let upper = current_date().sub(interval(*offset_days, IntervalUnit::Days));
                column.clone().gte(lower).and(column.lt(upper))
            }
            WindowBounds::ToDate {
                grain,
                periods_back: 0,
            } => column.gte(date_trunc(grain.trunc_name(), current_date())),
            WindowBounds::ToDate {
                grain,
                periods_back,
            } => {
                // Same elapsed span, shifted back whole grain units.
                let shift = grain.unit_interval(*periods_back);
                let lower = date_trunc(grain.trunc_name(), current_date()).sub(shift.clone());
                let upper = current_date().sub(shift);
                column.clone().gte(lower).and(column.lt(upper))
            }
            WindowBounds::Absolute { start, end } => column
                .clone()
                .gte(lit_date(*start))
                .and(column.lt(lit_date(*end))),
        }
    }
}

/// A time window as it arrives in a structured query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    /// A named shorthand, e.g. `last_4_weeks`. Must be in the registry.
    Named(String),
    /// Explicit half-open range.
    Range { start: NaiveDate, end: NaiveDate },
    /// Already-resolved bounds. Produced internally for prior periods.
    Bounds(WindowBounds),
}

impl TimeWindow {
    /// Resolve to concrete bounds. `None` for an unrecognized name or a
    /// malformed range; the validator reports those before anything else
    /// runs.
    pub fn resolve(&self) -> Option<WindowBounds> {
        match self {
            TimeWindow::Named(name) => named_window(name),
            TimeWindow::Range { start, end } => {
                (start < end).then(|| WindowBounds::Absolute {
                    start: *start,
                    end: *end,
                })
            }
            TimeWindow::Bounds(bounds) => Some(bounds.clone()),
        }
    }
}

static NAMED_WINDOWS: Lazy<BTreeMap<&'static str, WindowBounds>> = Lazy::new(|| {
    let rolling = |len_days| WindowBounds::Rolling {
        len_days,
        offset_days: 0,
    };
    let to_date = |grain| WindowBounds::ToDate {
        grain,
        periods_back: 0,
    };
    BTreeMap::from([
        ("last_4_weeks", rolling(28)),
        ("last_6_weeks", rolling(42)),
        ("last_12_weeks", rolling(84)),
        ("last_30_days", rolling(30)),
        ("last_90_days", rolling(90)),
        ("mtd", to_date(CalendarGrain::Month)),
        ("qtd", to_date(CalendarGrain::Quarter)),
        ("ytd", to_date(CalendarGrain::Year)),
    ])
});

/// Look up a named window.
pub fn named_window(name: &str) -> Option<WindowBounds> {
    NAMED_WINDOWS.get(name).cloned()
}
