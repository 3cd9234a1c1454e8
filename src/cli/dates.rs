use std::fmt::Display;

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::{CommandFactory, ValueEnum};

use super::Args;

pub const DATE_EXAMPLES: &str =
    "Examples are \"today\", \"yesterday\", \"last friday\", \"15/03/2025\", \"12:00 16/03/2025\"";

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

/// Parses a natural language date relative to `now`. Failures are reported as clap validation
/// errors naming the offending argument.
pub fn parse_instant(
    input: &str,
    argument: &str,
    now: DateTime<Local>,
    style: DateStyle,
) -> Result<DateTime<Local>> {
    match parse_date_string(input, now, style.into()) {
        Ok(v) => Ok(v.with_timezone(&Local)),
        Err(e) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate {argument} \"{input}\": {e}"),
            )
            .into()),
    }
}

/// Same as [parse_instant], keeping only the calendar day.
pub fn parse_day(
    input: &str,
    argument: &str,
    now: DateTime<Local>,
    style: DateStyle,
) -> Result<NaiveDate> {
    Ok(parse_instant(input, argument, now, style)?.date_naive())
}
