use ansi_term::Colour;
use anyhow::Result;
use chrono::{Days, Local};
use clap::Parser;

use crate::{
    engine::{
        TrackerEngine,
        aggregation::{DayEntry, DayStatus},
    },
    storage::entities::RatchetEvent,
};

use super::dates::{DATE_EXAMPLES, DateStyle, parse_instant};

const DEFAULT_DAYS: u32 = 14;
const DEFAULT_HISTORY_DAYS: u64 = 7;

#[derive(Debug, Parser)]
pub struct DaysCommand {
    id: String,
    #[arg(long, default_value_t = DEFAULT_DAYS, help = "How many days to show, ending today")]
    days: u32,
}

#[derive(Debug, Parser)]
pub struct HistoryCommand {
    id: String,
    #[arg(long, short, help = format!("Start of the range, a week ago by default. {DATE_EXAMPLES}"))]
    start: Option<String>,
    #[arg(long, short, help = format!("End of the range, now by default. {DATE_EXAMPLES}"))]
    end: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

/// Prints one row per day with its total and goal status, today first.
pub async fn process_days_command(
    engine: &TrackerEngine,
    DaysCommand { id, days }: DaysCommand,
) -> Result<()> {
    let tracker = engine.get_tracker(&id).await;
    let end = engine.today();
    let start = end
        .checked_sub_days(Days::new(days.saturating_sub(1).into()))
        .unwrap_or(end);

    for entry in engine.get_day_entries(&id, start, end).await {
        let status = match &tracker {
            Some(tracker) => entry.status(tracker),
            None => DayStatus::NoData,
        };
        println!("{}", format_day(&entry, status));
    }
    Ok(())
}

/// Prints the raw events of a range, oldest first.
pub async fn process_history_command(
    engine: &TrackerEngine,
    HistoryCommand {
        id,
        start,
        end,
        date_style,
    }: HistoryCommand,
) -> Result<()> {
    let now = Local::now();
    let start = match start {
        Some(start) => parse_instant(&start, "--start", now, date_style)?,
        None => engine.day_start(now.date_naive() - Days::new(DEFAULT_HISTORY_DAYS)),
    };
    let end = match end {
        Some(end) => parse_instant(&end, "--end", now, date_style)?,
        None => now,
    };

    for event in engine.get_history(&id, start, end).await {
        println!("{}", format_event(&event));
    }
    Ok(())
}

fn status_label(status: DayStatus) -> String {
    match status {
        DayStatus::Met => Colour::Green.paint("met").to_string(),
        DayStatus::NotMet => Colour::Red.paint("not met").to_string(),
        DayStatus::NoData => Colour::Fixed(244).paint("-").to_string(),
    }
}

fn format_day(entry: &DayEntry, status: DayStatus) -> String {
    let marker = if entry.has_done_marker { " ✓" } else { "" };
    format!(
        "{}\t{}{marker}\t{}",
        entry.date.format("%a %x"),
        entry.count,
        status_label(status)
    )
}

fn format_event(event: &RatchetEvent) -> String {
    let time = match event.timestamp {
        Some(timestamp) => timestamp.with_timezone(&Local).format("%x %H:%M:%S").to_string(),
        None => "unknown time".to_string(),
    };
    let value = if event.value.is_marker() {
        "done".to_string()
    } else {
        format!("{:+}", event.value.amount())
    };
    if event.note.is_empty() {
        format!("{time}\t{value}")
    } else {
        format!("{time}\t{value}\t{}", event.note)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use crate::{
        engine::aggregation::{DayEntry, DayStatus},
        storage::entities::{EventValue, RatchetEvent},
    };

    use super::{format_day, format_event, status_label};

    #[test]
    fn test_format_day_marks_done() {
        let entry = DayEntry {
            date: NaiveDate::from_ymd_opt(2024, 3, 13).unwrap(),
            count: 0,
            event_count: 1,
            has_done_marker: true,
        };
        let line = format_day(&entry, DayStatus::Met);
        assert!(line.contains("\t0 ✓\t"));
        assert!(line.ends_with(&status_label(DayStatus::Met)));
    }

    #[test]
    fn test_format_event() {
        let at = Utc.with_ymd_and_hms(2024, 3, 13, 11, 0, 0).unwrap();
        let undo = RatchetEvent::new("coffee", EventValue::Delta(-2), at, "");
        assert!(format_event(&undo).ends_with("\t-2"));

        let done = RatchetEvent::new("coffee", EventValue::Marker, at, "done");
        assert!(format_event(&done).ends_with("\tdone\tdone"));

        let mut unknown = RatchetEvent::new("coffee", EventValue::Delta(3), at, "edit");
        unknown.timestamp = None;
        assert_eq!(format_event(&unknown), "unknown time\t+3\tedit");
    }
}
