//! One event per line of text. Decoding never fails: anything that doesn't look like an event is
//! dropped, which protects aggregation from partial writes and manual edits.

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::entities::{EventValue, RatchetEvent};

/// Shape of an event on disk. All five fields are always written.
#[derive(Serialize)]
struct EventLine<'a> {
    id: &'a str,
    timestamp: String,
    tracker: &'a str,
    value: i64,
    note: &'a str,
}

/// Encodes an event as a compact json object terminated by a line break.
pub fn encode_event(event: &RatchetEvent) -> Result<String> {
    let line = EventLine {
        id: &event.id,
        timestamp: event.timestamp.map(format_timestamp).unwrap_or_default(),
        tracker: &event.tracker,
        value: event.value.amount(),
        note: &event.note,
    };
    let mut encoded = serde_json::to_string(&line)?;
    encoded.push('\n');
    Ok(encoded)
}

/// Decodes a single line. Returns `None` for blank lines, invalid json and records without a
/// string `tracker` or a numeric `value`.
pub fn decode_event(line: &str) -> Option<RatchetEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Ok(Value::Object(record)) = serde_json::from_str::<Value>(line) else {
        return None;
    };

    let tracker = record.get("tracker")?.as_str()?.to_string();
    let value = decode_value(record.get("value")?)?;

    Some(RatchetEvent {
        id: string_field(&record, "id"),
        timestamp: record
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(parse_timestamp),
        tracker,
        value,
        note: string_field(&record, "note"),
    })
}

/// Decodes every event in a partition, skipping what can't be read.
pub fn decode_events(content: &str) -> impl Iterator<Item = RatchetEvent> + '_ {
    content.lines().filter_map(decode_event)
}

fn decode_value(value: &Value) -> Option<EventValue> {
    let amount = match value.as_i64() {
        Some(v) => v,
        // Hand edited files may contain fractions.
        None => value.as_f64()?.round() as i64,
    };
    Some(EventValue::from(amount))
}

fn string_field(record: &Map<String, Value>, key: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Timestamps are written as UTC with millisecond precision, e.g. `2024-03-13T11:00:00.000Z`.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Accepts RFC 3339 with any offset. A timestamp without an offset is read as local time.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(v) = DateTime::parse_from_rfc3339(value) {
        return Some(v.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|v| v.with_timezone(&Utc))
}
