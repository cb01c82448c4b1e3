use chrono::{DateTime, Duration, Utc};

use super::{ActionContext, ActionOutcome, truncate_chars};
use crate::error::ActionError;
use crate::records::{RecordRef, Task, TaskPriority};
use crate::rules::TaskParams;
use crate::store::Database;

const MAX_TITLE_CHARS: usize = 100;

pub(super) async fn create_task(
    db: &dyn Database,
    params: &TaskParams,
    ctx: &ActionContext<'_>,
) -> Result<ActionOutcome, ActionError> {
    let title = params
        .title
        .clone()
        .or_else(|| {
            ctx.classification
                .extracted()
                .and_then(|d| d.task_title.clone())
        })
        .unwrap_or_else(|| subject_title(&ctx.message.subject));

    let priority = params.priority.unwrap_or(if ctx.details.urgent {
        TaskPriority::High
    } else {
        TaskPriority::Medium
    });

    let mut task = Task::new(ctx.owner_id, title);
    task.priority = priority;
    task.due_date = params.due_in_days.map(due_after).transpose()?;
    task.description = Some(format!("Uit e-mail van {}", ctx.details.sender_name));
    task.source_message_id = Some(ctx.message.id.clone());

    db.create_task(&task).await?;
    Ok(ActionOutcome::created(RecordRef::TaskId(task.id)))
}

fn due_after(days: u32) -> Result<DateTime<Utc>, ActionError> {
    Duration::try_days(i64::from(days))
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .ok_or_else(|| ActionError::InvalidParams(format!("dueInDays {days} is out of range")))
}

fn subject_title(subject: &str) -> String {
    let subject = subject.trim();
    if subject.is_empty() {
        "[Email] (geen onderwerp)".to_string()
    } else {
        format!("[Email] {}", truncate_chars(subject, MAX_TITLE_CHARS))
    }
}
