use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use {
    chrono::{NaiveTime, Weekday},
    chrono_tz::Tz,
    serde::{Deserialize, Serialize},
};

use crate::error::ReminderError;

// ── Reminder kinds ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Water,
    Meal,
    Workout,
    WeighIn,
    Sleep,
}

impl ReminderKind {
    pub const ALL: [Self; 5] = [
        Self::Water,
        Self::Meal,
        Self::Workout,
        Self::WeighIn,
        Self::Sleep,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Water => "water",
            Self::Meal => "meal",
            Self::Workout => "workout",
            Self::WeighIn => "weigh_in",
            Self::Sleep => "sleep",
        }
    }

    /// Notification title.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Water => "Time to hydrate",
            Self::Meal => "Log your meal",
            Self::Workout => "Workout time",
            Self::WeighIn => "Weekly weigh-in",
            Self::Sleep => "Wind down for bed",
        }
    }

    /// Notification body.
    pub fn body(&self) -> &'static str {
        match self {
            Self::Water => "Grab a glass of water and log it.",
            Self::Meal => "Don't forget to track what you ate.",
            Self::Workout => "Your scheduled workout starts now.",
            Self::WeighIn => "Step on the scale and record your weight.",
            Self::Sleep => "A consistent bedtime helps recovery.",
        }
    }
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderKind {
    type Err = ReminderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| ReminderError::UnknownKind(s.to_string()))
    }
}

// ── Weekdays ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Day {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Day {
    pub const ALL: [Self; 7] = [
        Self::Mon,
        Self::Tue,
        Self::Wed,
        Self::Thu,
        Self::Fri,
        Self::Sat,
        Self::Sun,
    ];
    pub const WEEKDAYS: [Self; 5] = [Self::Mon, Self::Tue, Self::Wed, Self::Thu, Self::Fri];
}

impl From<Weekday> for Day {
    fn from(w: Weekday) -> Self {
        match w {
            Weekday::Mon => Self::Mon,
            Weekday::Tue => Self::Tue,
            Weekday::Wed => Self::Wed,
            Weekday::Thu => Self::Thu,
            Weekday::Fri => Self::Fri,
            Weekday::Sat => Self::Sat,
            Weekday::Sun => Self::Sun,
        }
    }
}

impl FromStr for Day {
    type Err = ReminderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let day = s
            .trim()
            .parse::<Weekday>()
            .map_err(|_| ReminderError::UnknownDay(s.to_string()))?;
        Ok(day.into())
    }
}

// ── Schedules ────────────────────────────────────────────────────────────────

mod hhmm {
    use {
        chrono::NaiveTime,
        serde::{Deserialize, Deserializer, Serializer, de::Error},
    };

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_time(&raw).map_err(D::Error::custom)
    }
}

/// Parse a wall-clock time in `HH:MM` form.
pub fn parse_time(raw: &str) -> Result<NaiveTime, ReminderError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| ReminderError::InvalidTime(raw.to_string()))
}

/// When one kind of reminder fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSchedule {
    #[serde(with = "hhmm")]
    pub at: NaiveTime,
    pub days: BTreeSet<Day>,
}

impl ReminderSchedule {
    pub fn new(at: NaiveTime, days: impl IntoIterator<Item = Day>) -> Self {
        Self {
            at,
            days: days.into_iter().collect(),
        }
    }

    pub fn daily(at: NaiveTime) -> Self {
        Self::new(at, Day::ALL)
    }
}

/// User-owned reminder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    pub enabled: bool,
    /// Kinds the user opted into.
    pub kinds: BTreeSet<ReminderKind>,
    pub schedules: BTreeMap<ReminderKind, ReminderSchedule>,
    /// Zone schedules are evaluated in; UTC when unset.
    pub timezone: Option<Tz>,
}

impl ReminderConfig {
    pub fn timezone(&self) -> Tz {
        self.timezone.unwrap_or(Tz::UTC)
    }

    /// Kinds that are both enabled and scheduled.
    pub fn active(&self) -> impl Iterator<Item = (ReminderKind, &ReminderSchedule)> {
        self.kinds
            .iter()
            .filter_map(|kind| self.schedules.get(kind).map(|s| (*kind, s)))
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

impl Default for ReminderConfig {
    fn default() -> Self {
        let schedules = BTreeMap::from([
            (ReminderKind::Water, ReminderSchedule::daily(hm(10, 0))),
            (ReminderKind::Meal, ReminderSchedule::daily(hm(12, 30))),
            (
                ReminderKind::Workout,
                ReminderSchedule::new(hm(18, 0), Day::WEEKDAYS),
            ),
            (
                ReminderKind::WeighIn,
                ReminderSchedule::new(hm(7, 30), [Day::Mon]),
            ),
            (ReminderKind::Sleep, ReminderSchedule::daily(hm(22, 0))),
        ]);
        Self {
            enabled: false,
            kinds: BTreeSet::from([ReminderKind::Water, ReminderKind::Meal, ReminderKind::Workout]),
            schedules,
            timezone: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_str() {
        assert_eq!("weigh-in".parse::<ReminderKind>().unwrap(), ReminderKind::WeighIn);
        assert_eq!("Water".parse::<ReminderKind>().unwrap(), ReminderKind::Water);
        assert!("yoga".parse::<ReminderKind>().is_err());
    }

    #[test]
    fn test_day_from_str() {
        assert_eq!("mon".parse::<Day>().unwrap(), Day::Mon);
        assert_eq!("Saturday".parse::<Day>().unwrap(), Day::Sat);
        assert!("someday".parse::<Day>().is_err());
    }

    #[test]
    fn test_config_json_shape() {
        let cfg = ReminderConfig {
            enabled: true,
            kinds: BTreeSet::from([ReminderKind::WeighIn]),
            schedules: BTreeMap::from([(
                ReminderKind::WeighIn,
                ReminderSchedule::new(hm(7, 5), [Day::Mon, Day::Thu]),
            )]),
            timezone: Some(chrono_tz::Europe::Berlin),
        };
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["kinds"], serde_json::json!(["weigh_in"]));
        assert_eq!(json["schedules"]["weigh_in"]["at"], "07:05");
        assert_eq!(json["schedules"]["weigh_in"]["days"], serde_json::json!(["mon", "thu"]));
        assert_eq!(json["timezone"], "Europe/Berlin");

        let back: ReminderConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: ReminderConfig = serde_json::from_str(r#"{"enabled": true}"#).unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.schedules.len(), 5);
        assert_eq!(cfg.timezone(), Tz::UTC);
    }

    #[test]
    fn test_rejects_bad_time() {
        let err = serde_json::from_str::<ReminderSchedule>(r#"{"at": "25:00", "days": []}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_active_skips_unscheduled_kinds() {
        let mut cfg = ReminderConfig::default();
        cfg.schedules.remove(&ReminderKind::Meal);
        let active: Vec<_> = cfg.active().map(|(k, _)| k).collect();
        assert_eq!(active, vec![ReminderKind::Water, ReminderKind::Workout]);
    }
}
