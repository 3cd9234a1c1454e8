use anyhow::{Result, bail};
use chrono::{Local, Utc};
use clap::Parser;
use tracing::debug;

use crate::{
    engine::{TrackerEngine, TrackerStatus},
    period::ResetPeriod,
    storage::entities::{GoalType, TrackerConfig, TrackerUpdate, make_tracker_id},
};

use super::dates::{DATE_EXAMPLES, DateStyle, parse_day};

/// Options shared by `new` and `edit`. Anything left out keeps its default or current value.
#[derive(Debug, Default, clap::Args)]
pub struct TrackerOptions {
    #[arg(long, help = "Icon shown next to the name")]
    icon: Option<String>,
    #[arg(long, help = "Unit of the count, for example \"cups\"")]
    unit: Option<String>,
    #[arg(long, help = "Color in #rrggbb form")]
    color: Option<String>,
    #[arg(long, value_enum, help = "How often the count starts over")]
    period: Option<ResetPeriod>,
    #[arg(long, value_enum, help = "Whether the goal is a minimum or a cap")]
    goal_type: Option<GoalType>,
    #[arg(long, help = "Goal for a single period")]
    goal: Option<i64>,
    #[arg(
        long,
        value_delimiter = ',',
        help = "Comma separated increments offered as buttons, for example 1,5"
    )]
    buttons: Option<Vec<u32>>,
}

impl TrackerOptions {
    fn into_update(self, name: Option<String>) -> TrackerUpdate {
        TrackerUpdate {
            name,
            icon: self.icon,
            reset_period: self.period,
            color: self.color,
            unit: self.unit,
            goal: self.goal,
            goal_type: self.goal_type,
            increment_buttons: self.buttons,
        }
    }
}

#[derive(Debug, Parser)]
pub struct NewCommand {
    #[arg(help = "Display name. The id is derived from it")]
    name: String,
    #[command(flatten)]
    options: TrackerOptions,
}

#[derive(Debug, Parser)]
pub struct EditCommand {
    id: String,
    #[arg(long, help = "New display name. The id stays the same")]
    name: Option<String>,
    #[command(flatten)]
    options: TrackerOptions,
}

#[derive(Debug, Parser)]
pub struct IncCommand {
    id: String,
    #[arg(default_value_t = 1, allow_negative_numbers = true, help = "Change of the count. 0 marks the period as done")]
    delta: i64,
    #[arg(long, default_value = "", help = "Note stored with the event")]
    note: String,
    #[arg(long, help = format!("Log against another day instead of now. {DATE_EXAMPLES}"))]
    date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

#[derive(Debug, Parser)]
pub struct SetCommand {
    id: String,
    #[arg(help = format!("Day to change. {DATE_EXAMPLES}"))]
    date: String,
    #[arg(allow_negative_numbers = true, help = "New total of the day")]
    value: i64,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

pub async fn process_new_command(
    engine: &TrackerEngine,
    default_buttons: &[u32],
    NewCommand { name, options }: NewCommand,
) -> Result<()> {
    let id = make_tracker_id(&name);
    if id.is_empty() {
        bail!("Can't derive an id from \"{name}\"");
    }
    if engine.get_tracker(&id).await.is_some() {
        bail!("Tracker {id} already exists");
    }
    let mut tracker = TrackerConfig::new(&name, Utc::now())
        .with_increment_buttons(default_buttons.to_vec());
    options.into_update(None).apply(&mut tracker);
    engine.create_tracker(tracker).await?;
    println!("Created {id}");
    Ok(())
}

pub async fn process_edit_command(
    engine: &TrackerEngine,
    EditCommand { id, name, options }: EditCommand,
) -> Result<()> {
    if !engine.update_tracker(&id, options.into_update(name)).await? {
        bail!("No tracker with id {id}");
    }
    println!("Updated {id}");
    Ok(())
}

pub async fn process_remove_command(engine: &TrackerEngine, id: String) -> Result<()> {
    if !engine.delete_tracker(&id).await? {
        bail!("No tracker with id {id}");
    }
    println!("Removed {id}, its history is kept");
    Ok(())
}

pub async fn process_list_command(engine: &TrackerEngine) -> Result<()> {
    for tracker in engine.get_all_trackers().await {
        if let Some(status) = engine.get_tracker_status(&tracker.id).await {
            println!("{}", format_status(&status));
        }
    }
    Ok(())
}

pub async fn process_inc_command(
    engine: &TrackerEngine,
    IncCommand {
        id,
        delta,
        note,
        date,
        date_style,
    }: IncCommand,
) -> Result<()> {
    let event = match date {
        Some(date) => {
            let date = parse_day(&date, "--date", Local::now(), date_style)?;
            engine.increment_on_date(&id, delta, date, &note).await?
        }
        None => engine.increment(&id, delta, &note).await?,
    };
    debug!("Logged {event:?}");
    if let Some(status) = engine.get_tracker_status(&id).await {
        println!("{}", format_status(&status));
    }
    Ok(())
}

pub async fn process_set_command(
    engine: &TrackerEngine,
    SetCommand {
        id,
        date,
        value,
        date_style,
    }: SetCommand,
) -> Result<()> {
    let date = parse_day(&date, "date", Local::now(), date_style)?;
    if engine.set_day_total(&id, date, value).await? {
        println!("{id} on {date}: {}", engine.get_count_for_day(&id, date).await);
    } else {
        println!("{id} on {date}: unchanged");
    }
    Ok(())
}

/// One line summary of the current period, count followed by the goal when there is one.
pub fn format_status(status: &TrackerStatus) -> String {
    let tracker = &status.tracker;
    let mut line = format!("{} {}\t{}", tracker.icon, tracker.id, status.count);
    if tracker.has_goal() {
        line.push_str(&format!("/{}", tracker.goal));
    }
    if !tracker.unit.is_empty() {
        line.push_str(&format!(" {}", tracker.unit));
    }
    line.push_str(&format!(" {}", tracker.reset_period));
    if tracker.has_goal() {
        let state = match tracker.goal_type {
            GoalType::AtMost if tracker.is_over_goal(status.count) => "over the cap",
            GoalType::AtMost => "under the cap",
            _ if status.goal_met => "goal met",
            _ => "goal not met",
        };
        line.push_str(&format!("\t{state}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::{
        engine::TrackerStatus,
        storage::entities::{GoalType, TrackerConfig, TrackerUpdate},
    };

    use super::{TrackerOptions, format_status};

    fn status(tracker: TrackerConfig, count: i64, goal_met: bool) -> TrackerStatus {
        TrackerStatus {
            tracker,
            count,
            goal_met,
        }
    }

    #[test]
    fn test_format_status() {
        let coffee = TrackerConfig::new("Coffee", Utc::now()).with_goal(GoalType::AtLeast, 3);
        assert_eq!(
            format_status(&status(coffee.clone(), 2, true)),
            "📌 coffee\t2/3 daily\tgoal met"
        );

        let mut cups = coffee;
        TrackerUpdate {
            unit: Some("cups".into()),
            ..Default::default()
        }
        .apply(&mut cups);
        assert_eq!(
            format_status(&status(cups, 1, false)),
            "📌 coffee\t1/3 cups daily\tgoal not met"
        );

        let sugar = TrackerConfig::new("Sugar", Utc::now()).with_goal(GoalType::AtMost, 0);
        assert_eq!(
            format_status(&status(sugar, 1, false)),
            "📌 sugar\t1/0 daily\tover the cap"
        );

        let steps = TrackerConfig::new("Steps", Utc::now()).with_goal(GoalType::NoGoal, 0);
        assert_eq!(format_status(&status(steps, 42, false)), "📌 steps\t42 daily");
    }

    #[test]
    fn test_options_only_touch_given_fields() {
        let update = TrackerOptions {
            goal: Some(5),
            buttons: Some(vec![2, 4]),
            ..Default::default()
        }
        .into_update(Some("Tea".into()));
        assert_eq!(update.name.as_deref(), Some("Tea"));
        assert_eq!(update.goal, Some(5));
        assert_eq!(update.increment_buttons, Some(vec![2, 4]));
        assert_eq!(update.color, None);
        assert_eq!(update.reset_period, None);
    }
}
