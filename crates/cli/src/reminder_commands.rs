use std::sync::Arc;

use {
    anyhow::Result,
    chrono::TimeDelta,
    clap::Subcommand,
    fittrack_config::FitTrackConfig,
    fittrack_gateway::server::reminder_store_path,
    fittrack_reminders::{
        Day, FileReminderStore, LogNotifier, ReminderKind, ReminderSchedule, ReminderScheduler,
        ReminderStore, SchedulerSettings, types::parse_time,
    },
};

#[derive(Subcommand)]
pub enum ReminderAction {
    /// Show reminder settings.
    Status,
    /// Turn reminders on.
    Enable,
    /// Turn reminders off.
    Disable,
    /// Schedule a reminder kind and opt into it.
    Set {
        /// water, meal, workout, weigh_in or sleep.
        kind: ReminderKind,
        /// Time of day, HH:MM.
        #[arg(long)]
        at: String,
        /// Comma-separated weekdays (e.g. mon,wed,fri). Every day when omitted.
        #[arg(long, value_delimiter = ',')]
        days: Vec<Day>,
    },
    /// Opt out of a reminder kind.
    Unset { kind: ReminderKind },
    /// Set the timezone schedules are evaluated in (IANA name).
    Timezone { name: String },
    /// Fire any reminders due right now to the log.
    Check,
}

pub async fn handle_reminders(action: ReminderAction, config: &FitTrackConfig) -> Result<()> {
    let path = reminder_store_path(config)?;
    let store = Arc::new(FileReminderStore::new(&path));
    let mut reminders = store.load().await?;

    match action {
        ReminderAction::Status => {
            println!("Store: {}", path.display());
            println!("{}", serde_json::to_string_pretty(&reminders)?);
            return Ok(());
        },
        ReminderAction::Enable => reminders.enabled = true,
        ReminderAction::Disable => reminders.enabled = false,
        ReminderAction::Set { kind, at, days } => {
            let at = parse_time(&at)?;
            let schedule = if days.is_empty() {
                ReminderSchedule::daily(at)
            } else {
                ReminderSchedule::new(at, days)
            };
            reminders.schedules.insert(kind, schedule);
            reminders.kinds.insert(kind);
        },
        ReminderAction::Unset { kind } => {
            reminders.kinds.remove(&kind);
        },
        ReminderAction::Timezone { name } => {
            let tz = name
                .parse()
                .map_err(|e| anyhow::anyhow!("unknown timezone '{name}': {e}"))?;
            reminders.timezone = Some(tz);
        },
        ReminderAction::Check => {
            let scheduler = ReminderScheduler::new(
                store,
                Arc::new(LogNotifier),
                SchedulerSettings {
                    catch_up: TimeDelta::minutes(i64::from(config.reminders.catch_up_minutes)),
                    ..SchedulerSettings::default()
                },
            );
            let fired = scheduler.tick().await?;
            if fired.is_empty() {
                println!("No reminders due.");
            }
            for slot in fired {
                println!("  {} ({})", slot.kind, slot.date);
            }
            return Ok(());
        },
    }

    store.save(&reminders).await?;
    println!(
        "Reminders {} [{}]",
        if reminders.enabled { "enabled" } else { "disabled" },
        reminders
            .kinds
            .iter()
            .map(ReminderKind::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(())
}
