use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::period::ResetPeriod;

pub const CONFIG_VERSION: &str = "1.0.0";
pub const DEFAULT_TRACKER_COLOR: &str = "#7c3aed";
pub const DEFAULT_TRACKER_ICON: &str = "📌";

/// Polarity of a goal: reach a minimum or stay under a cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum GoalType {
    #[default]
    #[serde(rename = "at least")]
    AtLeast,
    #[serde(rename = "at most")]
    AtMost,
    #[serde(rename = "none")]
    #[value(name = "none")]
    NoGoal,
}

/// Definition of a single tracker as stored in `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerConfig {
    /// Slug derived from the name on creation. Never changes afterwards.
    pub id: String,
    pub name: String,
    pub icon: String,
    pub reset_period: ResetPeriod,
    /// Only a presentation hint.
    pub color: String,
    pub unit: String,
    /// Meaning depends on [GoalType].
    pub goal: i64,
    pub goal_type: GoalType,
    pub created: DateTime<Utc>,
    /// Step sizes offered by front ends. Carried through unchanged.
    pub increment_buttons: Vec<u32>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            icon: DEFAULT_TRACKER_ICON.into(),
            reset_period: ResetPeriod::Daily,
            color: DEFAULT_TRACKER_COLOR.into(),
            unit: String::new(),
            goal: 0,
            goal_type: GoalType::AtLeast,
            created: DateTime::<Utc>::default(),
            increment_buttons: vec![1],
        }
    }
}

impl TrackerConfig {
    /// Creates a tracker with default settings and an id derived from `name`.
    pub fn new(name: &str, created: DateTime<Utc>) -> Self {
        let name = name.trim();
        Self {
            id: make_tracker_id(name),
            name: name.to_string(),
            created,
            ..Default::default()
        }
    }

    pub fn with_id(self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..self
        }
    }

    pub fn with_reset_period(self, reset_period: ResetPeriod) -> Self {
        Self {
            reset_period,
            ..self
        }
    }

    pub fn with_goal(self, goal_type: GoalType, goal: i64) -> Self {
        Self {
            goal_type,
            goal,
            ..self
        }
        .normalized()
    }

    pub fn with_increment_buttons(self, increment_buttons: Vec<u32>) -> Self {
        Self {
            increment_buttons,
            ..self
        }
        .normalized()
    }

    /// Enforces `goal >= 0` and a non-empty set of positive increment buttons.
    pub fn normalize(&mut self) {
        self.goal = self.goal.max(0);
        self.increment_buttons.retain(|v| *v > 0);
        if self.increment_buttons.is_empty() {
            self.increment_buttons.push(1);
        }
    }

    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// Whether there is a goal worth displaying.
    pub fn has_goal(&self) -> bool {
        match self.goal_type {
            GoalType::NoGoal => false,
            GoalType::AtMost => true,
            GoalType::AtLeast => self.goal > 0,
        }
    }

    pub fn is_goal_met(&self, current: i64) -> bool {
        match self.goal_type {
            GoalType::NoGoal => false,
            GoalType::AtLeast => self.goal <= 0 || current >= self.goal,
            GoalType::AtMost => current <= self.goal,
        }
    }

    pub fn is_over_goal(&self, current: i64) -> bool {
        self.goal_type == GoalType::AtMost && current > self.goal
    }
}

/// Builds a tracker id out of a display name: lowercase, whitespace runs turn into a single `-`
/// and everything outside of `[a-z0-9-]` is dropped.
pub fn make_tracker_id(name: &str) -> String {
    let mut id = String::with_capacity(name.len());
    let mut in_whitespace = false;
    for c in name.to_lowercase().chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                id.push('-');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
            id.push(c);
        }
    }
    id
}

/// Partial update of a [TrackerConfig]. The id and creation time can't be changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerUpdate {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub reset_period: Option<ResetPeriod>,
    pub color: Option<String>,
    pub unit: Option<String>,
    pub goal: Option<i64>,
    pub goal_type: Option<GoalType>,
    pub increment_buttons: Option<Vec<u32>>,
}

impl TrackerUpdate {
    pub fn apply(self, tracker: &mut TrackerConfig) {
        if let Some(name) = self.name {
            tracker.name = name;
        }
        if let Some(icon) = self.icon {
            tracker.icon = icon;
        }
        if let Some(reset_period) = self.reset_period {
            tracker.reset_period = reset_period;
        }
        if let Some(color) = self.color {
            tracker.color = color;
        }
        if let Some(unit) = self.unit {
            tracker.unit = unit;
        }
        if let Some(goal) = self.goal {
            tracker.goal = goal;
        }
        if let Some(goal_type) = self.goal_type {
            tracker.goal_type = goal_type;
        }
        if let Some(increment_buttons) = self.increment_buttons {
            tracker.increment_buttons = increment_buttons;
        }
        tracker.normalize();
    }
}

/// The whole `config.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    pub trackers: BTreeMap<String, TrackerConfig>,
    /// Entries that couldn't be read as a tracker, kept as they were so a rewrite of the document
    /// doesn't drop them.
    #[serde(skip)]
    pub unreadable: BTreeMap<String, Value>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.into(),
            trackers: BTreeMap::new(),
            unreadable: BTreeMap::new(),
        }
    }
}

/// Effect of a single event on a count. On disk both are the integer `value` field, with `0`
/// standing for [EventValue::Marker].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventValue {
    /// Non-zero change of the count. Negative values undo previous increments.
    Delta(i64),
    /// "Marked as done" without changing the count.
    Marker,
}

impl EventValue {
    pub fn amount(self) -> i64 {
        match self {
            EventValue::Delta(v) => v,
            EventValue::Marker => 0,
        }
    }

    pub fn is_marker(self) -> bool {
        matches!(self, EventValue::Marker)
    }
}

impl From<i64> for EventValue {
    fn from(value: i64) -> Self {
        if value == 0 {
            EventValue::Marker
        } else {
            EventValue::Delta(value)
        }
    }
}

/// One immutable logged action against a tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct RatchetEvent {
    pub id: String,
    /// `None` when the stored timestamp is missing or unreadable.
    pub timestamp: Option<DateTime<Utc>>,
    /// Id of the owning tracker. Not validated against the tracker store.
    pub tracker: String,
    pub value: EventValue,
    pub note: String,
}

impl RatchetEvent {
    pub fn new(
        tracker: impl Into<String>,
        value: EventValue,
        timestamp: DateTime<Utc>,
        note: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Some(timestamp),
            tracker: tracker.into(),
            value,
            note: note.into(),
        }
    }
}
