use std::fmt;
use std::time::Duration;

use uuid::Uuid;

/// Identifier of a chat or other delivery destination.
///
/// Unique within one store's keyspace, not globally. Doubles as the
/// per-recipient file name in the persisted layout.
pub type RecipientId = i64;

/// The fixed vocabulary of repeating poll cadences.
///
/// Subscriptions only ever poll at one of these cadences; arbitrary
/// durations are rejected at the boundary so the listing output and the
/// persisted form stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollInterval {
    TwoMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    TwoHours,
    ThreeHours,
    SixHours,
    TwelveHours,
    TwentyFourHours,
}

impl PollInterval {
    /// Every valid cadence, shortest first.
    pub const ALL: [PollInterval; 10] = [
        PollInterval::TwoMinutes,
        PollInterval::FiveMinutes,
        PollInterval::FifteenMinutes,
        PollInterval::ThirtyMinutes,
        PollInterval::OneHour,
        PollInterval::TwoHours,
        PollInterval::ThreeHours,
        PollInterval::SixHours,
        PollInterval::TwelveHours,
        PollInterval::TwentyFourHours,
    ];

    pub fn as_secs(self) -> u64 {
        match self {
            PollInterval::TwoMinutes => 120,
            PollInterval::FiveMinutes => 300,
            PollInterval::FifteenMinutes => 900,
            PollInterval::ThirtyMinutes => 1800,
            PollInterval::OneHour => 3600,
            PollInterval::TwoHours => 7200,
            PollInterval::ThreeHours => 10800,
            PollInterval::SixHours => 21600,
            PollInterval::TwelveHours => 43200,
            PollInterval::TwentyFourHours => 86400,
        }
    }

    /// The user-facing label, e.g. `5m` or `12h`.
    pub fn label(self) -> &'static str {
        match self {
            PollInterval::TwoMinutes => "2m",
            PollInterval::FiveMinutes => "5m",
            PollInterval::FifteenMinutes => "15m",
            PollInterval::ThirtyMinutes => "30m",
            PollInterval::OneHour => "1h",
            PollInterval::TwoHours => "2h",
            PollInterval::ThreeHours => "3h",
            PollInterval::SixHours => "6h",
            PollInterval::TwelveHours => "12h",
            PollInterval::TwentyFourHours => "24h",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.label() == label)
    }

    pub fn from_secs(secs: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.as_secs() == secs)
    }

    pub fn duration(self) -> Duration {
        Duration::from_secs(self.as_secs())
    }
}

impl fmt::Display for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// When a subscription's poll fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Repeats at a fixed cadence, measured from the end of each fire.
    Every(PollInterval),
    /// Fires once per calendar day at `hour:00:00` process-local time.
    Daily { hour: u8 },
}

impl Schedule {
    /// Renders the persisted form: interval seconds, or `d<hour>` for the
    /// daily case.
    pub fn encode(&self) -> String {
        match self {
            Schedule::Every(interval) => interval.as_secs().to_string(),
            Schedule::Daily { hour } => format!("d{hour}"),
        }
    }

    pub fn decode(field: &str) -> Option<Self> {
        if let Some(hour) = field.strip_prefix('d') {
            let hour = hour.parse::<u8>().ok()?;
            (hour <= 23).then_some(Schedule::Daily { hour })
        } else {
            let secs = field.parse::<u64>().ok()?;
            PollInterval::from_secs(secs).map(Schedule::Every)
        }
    }

    /// Human-readable form for listings, e.g. `every 5m` or `daily at 09:00`.
    pub fn describe(&self) -> String {
        match self {
            Schedule::Every(interval) => format!("every {}", interval.label()),
            Schedule::Daily { hour } => format!("daily at {hour:02}:00"),
        }
    }
}

/// One recipient's standing request to be told about new items from one
/// content source.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Process-local identity. Not persisted; regenerated on every load so
    /// a timer armed for a removed-and-readded source cannot adopt the
    /// replacement record.
    pub id: Uuid,
    /// Human label shown in listings. Non-unique.
    pub display_name: String,
    /// Stable identifier of the content source (e.g. a feed URL). Unique
    /// within one recipient's list.
    pub source_key: String,
    pub schedule: Schedule,
    /// Identifier of the most recently delivered item. `None` until the
    /// first successful delivery. Only ever advances to an id seen in a
    /// fetch; never rolled back.
    pub last_seen_id: Option<String>,
}

impl Subscription {
    pub fn new(display_name: impl Into<String>, source_key: impl Into<String>, schedule: Schedule) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            source_key: source_key.into(),
            schedule,
            last_seen_id: None,
        }
    }
}
