use {
    chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc},
    serde::Serialize,
};

use crate::types::{Day, ReminderConfig, ReminderKind};

/// One occurrence of a reminder: a kind on a local calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Slot {
    pub kind: ReminderKind,
    pub date: NaiveDate,
}

/// Slots due at `now`. A kind is due when today (in the config's timezone)
/// is one of its days and `now` is within `catch_up` after its time.
pub fn due_slots(config: &ReminderConfig, now: DateTime<Utc>, catch_up: TimeDelta) -> Vec<Slot> {
    if !config.enabled {
        return Vec::new();
    }

    let local = now.with_timezone(&config.timezone());
    let today = Day::from(local.weekday());
    let date = local.date_naive();
    let time = local.time();

    config
        .active()
        .filter(|(_, schedule)| schedule.days.contains(&today))
        .filter(|(_, schedule)| time >= schedule.at && time - schedule.at < catch_up)
        .map(|(kind, _)| Slot { kind, date })
        .collect()
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::types::ReminderSchedule,
        chrono::{NaiveTime, TimeZone},
        std::collections::{BTreeMap, BTreeSet},
    };

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn config(kind: ReminderKind, schedule: ReminderSchedule) -> ReminderConfig {
        ReminderConfig {
            enabled: true,
            kinds: BTreeSet::from([kind]),
            schedules: BTreeMap::from([(kind, schedule)]),
            timezone: None,
        }
    }

    // 2025-03-03 is a Monday.
    fn monday(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, h, m, 0).unwrap()
    }

    fn window() -> TimeDelta {
        TimeDelta::minutes(15)
    }

    #[test]
    fn test_due_within_window() {
        let cfg = config(ReminderKind::Water, ReminderSchedule::daily(at(10, 0)));
        let due = due_slots(&cfg, monday(10, 5), window());
        assert_eq!(
            due,
            vec![Slot {
                kind: ReminderKind::Water,
                date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            }]
        );
        assert_eq!(due_slots(&cfg, monday(10, 0), window()).len(), 1);
    }

    #[test]
    fn test_not_due_outside_window() {
        let cfg = config(ReminderKind::Water, ReminderSchedule::daily(at(10, 0)));
        assert!(due_slots(&cfg, monday(9, 59), window()).is_empty());
        assert!(due_slots(&cfg, monday(10, 15), window()).is_empty());
    }

    #[test]
    fn test_not_due_on_inactive_day() {
        let cfg = config(
            ReminderKind::Workout,
            ReminderSchedule::new(at(18, 0), [Day::Tue, Day::Thu]),
        );
        assert!(due_slots(&cfg, monday(18, 1), window()).is_empty());
    }

    #[test]
    fn test_disabled_config_is_never_due() {
        let mut cfg = config(ReminderKind::Water, ReminderSchedule::daily(at(10, 0)));
        cfg.enabled = false;
        assert!(due_slots(&cfg, monday(10, 1), window()).is_empty());
    }

    #[test]
    fn test_kind_not_opted_in_is_skipped() {
        let mut cfg = config(ReminderKind::Water, ReminderSchedule::daily(at(10, 0)));
        cfg.kinds.clear();
        assert!(due_slots(&cfg, monday(10, 1), window()).is_empty());
    }

    #[test]
    fn test_timezone_shifts_local_day_and_time() {
        let mut cfg = config(
            ReminderKind::WeighIn,
            ReminderSchedule::new(at(7, 30), [Day::Tue]),
        );
        cfg.timezone = Some(chrono_tz::Asia::Tokyo);
        // Monday 22:35 UTC is Tuesday 07:35 in Tokyo.
        let due = due_slots(&cfg, monday(22, 35), window());
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].date, NaiveDate::from_ymd_opt(2025, 3, 4).unwrap());
    }
}
