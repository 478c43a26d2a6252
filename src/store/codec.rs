//! Line format for persisted subscription records.
//!
//! One record per line: `display_name||source_key||schedule||last_seen_id`,
//! with an empty last field for a subscription that has not delivered yet.
//! The field order is fixed so successive snapshots diff cleanly.

use crate::entity::Schedule;
use crate::entity::Subscription;

/// Separator between record fields. Names and source keys are validated at
/// the service boundary to never contain it.
pub const FIELD_DELIMITER: &str = "||";

pub fn encode_line(subscription: &Subscription) -> String {
    format!(
        "{}{d}{}{d}{}{d}{}",
        subscription.display_name,
        subscription.source_key,
        subscription.schedule.encode(),
        subscription.last_seen_id.as_deref().unwrap_or(""),
        d = FIELD_DELIMITER,
    )
}

pub fn parse_line(line: &str) -> Result<Subscription, String> {
    let mut fields = line.splitn(4, FIELD_DELIMITER);

    let display_name = fields.next().unwrap_or_default();
    let (Some(source_key), Some(schedule), Some(last_seen)) =
        (fields.next(), fields.next(), fields.next())
    else {
        return Err(format!(
            "expected 4 `{FIELD_DELIMITER}`-separated fields"
        ));
    };

    if source_key.is_empty() {
        return Err("empty source key".to_string());
    }

    let schedule = Schedule::decode(schedule)
        .ok_or_else(|| format!("unknown schedule `{schedule}`"))?;

    let mut subscription = Subscription::new(display_name, source_key, schedule);
    if !last_seen.is_empty() {
        subscription.last_seen_id = Some(last_seen.to_string());
    }
    Ok(subscription)
}
