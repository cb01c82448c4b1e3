use chrono::{DateTime, Duration, NaiveTime, Utc};

use super::{ActionContext, ActionOutcome};
use crate::error::ActionError;
use crate::pipeline::extract::MessageDetails;
use crate::records::{Event, RecordRef};
use crate::rules::EventParams;
use crate::store::Database;

/// Start time used when a date is found without a time.
const DEFAULT_START: (u32, u32) = (9, 0);

pub(super) async fn create_event(
    db: &dyn Database,
    params: &EventParams,
    ctx: &ActionContext<'_>,
) -> Result<ActionOutcome, ActionError> {
    let extracted = ctx.classification.extracted();
    let title = params
        .title
        .clone()
        .or_else(|| extracted.and_then(|d| d.event_title.clone()))
        .unwrap_or_else(|| {
            let subject = ctx.message.subject.trim();
            if subject.is_empty() {
                "Afspraak".to_string()
            } else {
                subject.to_string()
            }
        });

    let start_time = start_time(ctx.details).unwrap_or_else(Utc::now);
    let now = Utc::now();
    let event = Event {
        id: uuid::Uuid::new_v4(),
        owner_id: ctx.owner_id.to_string(),
        title,
        description: Some(format!("Uit e-mail van {}", ctx.details.sender_name)),
        start_time,
        end_time: start_time + Duration::minutes(i64::from(params.duration_minutes)),
        location: params
            .location
            .clone()
            .or_else(|| extracted.and_then(|d| d.event_location.clone())),
        source_message_id: Some(ctx.message.id.clone()),
        created_at: now,
    };

    db.create_event(&event).await?;
    Ok(ActionOutcome::created(RecordRef::EventId(event.id)))
}

/// Detected date and time, read as UTC.
fn start_time(details: &MessageDetails) -> Option<DateTime<Utc>> {
    let date = details.date?;
    let time = details
        .time
        .or_else(|| NaiveTime::from_hms_opt(DEFAULT_START.0, DEFAULT_START.1, 0))?;
    Some(date.and_time(time).and_utc())
}
