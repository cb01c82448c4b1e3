use super::ActionOutcome;
use crate::rules::NotificationParams;

/// Delivery happens outside the pipeline; only the decision is recorded.
pub(super) fn send_notification(params: &NotificationParams) -> ActionOutcome {
    ActionOutcome::done(format!("notification scheduled on channel {}", params.channel))
}
