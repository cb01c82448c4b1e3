use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{ActionContext, ActionOutcome};
use crate::error::ActionError;
use crate::records::{Invoice, InvoiceStatus, RecordRef};
use crate::rules::InvoiceParams;
use crate::store::Database;

const DEFAULT_CURRENCY: &str = "EUR";

pub(super) async fn record_invoice(
    db: &dyn Database,
    params: &InvoiceParams,
    ctx: &ActionContext<'_>,
) -> Result<ActionOutcome, ActionError> {
    let details = ctx.details;
    let extracted = ctx.classification.extracted();

    let vendor = [
        Some(details.sender_name.clone()),
        details.shop_name.clone(),
        Some(details.sender_domain.clone()),
    ]
    .into_iter()
    .flatten()
    .find(|v| !v.trim().is_empty())
    .unwrap_or_else(|| "Onbekend".to_string());

    let invoice = Invoice {
        id: Uuid::new_v4(),
        owner_id: ctx.owner_id.to_string(),
        description: Some(format!("Factuur van {vendor}")),
        vendor,
        amount: details.amount.unwrap_or(Decimal::ZERO),
        currency: details
            .currency
            .clone()
            .or_else(|| extracted.and_then(|d| d.currency.clone()))
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        invoice_number: details
            .invoice_number
            .clone()
            .or_else(|| extracted.and_then(|d| d.invoice_number.clone())),
        due_date: details.date,
        status: if params.auto_approve {
            InvoiceStatus::Approved
        } else {
            InvoiceStatus::Pending
        },
        source_message_id: Some(ctx.message.id.clone()),
        created_at: Utc::now(),
    };

    db.create_invoice(&invoice).await?;
    Ok(ActionOutcome::created(RecordRef::InvoiceId(invoice.id)))
}
