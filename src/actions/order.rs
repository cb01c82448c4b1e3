//! `track_order`: follow one web-shop order across several messages.
//!
//! Orders are keyed by `(owner, shop, order number)`, falling back to the
//! tracking number for shipment notices that omit the order number. Status
//! changes are plain overwrites; side effects fire on entering a state.

use chrono::Utc;
use uuid::Uuid;

use super::package::placeholder_tracking;
use super::{ActionContext, ActionOutcome, UNKNOWN_CARRIER};
use crate::error::ActionError;
use crate::records::{Order, OrderStatus, Package, PackageStatus, RecordRef};
use crate::rules::OrderParams;
use crate::store::Database;

pub(super) async fn track_order(
    db: &dyn Database,
    params: &OrderParams,
    create_package: bool,
    ctx: &ActionContext<'_>,
) -> Result<ActionOutcome, ActionError> {
    let details = ctx.details;
    let shop = details
        .shop_name
        .clone()
        .or_else(|| params.shop_name.clone())
        .or_else(|| {
            ctx.classification
                .extracted()
                .and_then(|d| d.merchant.clone())
        })
        .unwrap_or_else(|| "Onbekend".to_string());
    let target = params.status.or(details.order_status);

    let existing = match &details.order_number {
        Some(number) => db.find_order(ctx.owner_id, &shop, number).await?,
        None => None,
    };
    let existing = match (existing, &details.tracking_number) {
        (Some(order), _) => Some(order),
        (None, Some(tracking)) => db.find_order_by_tracking(ctx.owner_id, tracking).await?,
        (None, None) => None,
    };

    let mut created = Vec::new();
    let now = Utc::now();

    match existing {
        Some(mut order) => {
            let previous = order.status;
            if let Some(status) = target {
                order.status = status;
            }
            apply_effects(db, &mut order, Some(previous), create_package, ctx, &mut created).await?;
            order.updated_at = now;
            db.update_order(&order).await?;

            let mut outcome = ActionOutcome::updated(RecordRef::OrderId(order.id)).with_detail(format!(
                "order {} at {}: {} -> {}",
                order.order_number,
                order.shop_name,
                previous.as_str(),
                order.status.as_str()
            ));
            outcome.created = created;
            Ok(outcome)
        }
        None => {
            let mut order = Order {
                id: Uuid::new_v4(),
                owner_id: ctx.owner_id.to_string(),
                shop_name: shop,
                order_number: details
                    .order_number
                    .clone()
                    .unwrap_or_else(|| format!("UNKNOWN-{}", ctx.message.id)),
                status: target.unwrap_or(OrderStatus::Ordered),
                total_amount: None,
                currency: None,
                is_paid: false,
                order_date: ctx.message.received_at,
                shipped_date: None,
                delivered_date: None,
                tracking_number: None,
                carrier: None,
                package_id: None,
                source_message_id: Some(ctx.message.id.clone()),
                created_at: now,
                updated_at: now,
            };
            // Package first so the order row links to an existing id.
            apply_effects(db, &mut order, None, create_package, ctx, &mut created).await?;
            db.create_order(&order).await?;

            let mut outcome = ActionOutcome::created(RecordRef::OrderId(order.id)).with_detail(format!(
                "order {} at {}: {}",
                order.order_number,
                order.shop_name,
                order.status.as_str()
            ));
            outcome.created.extend(created);
            Ok(outcome)
        }
    }
}

/// Fill fields from the message and run entry effects for the current status.
async fn apply_effects(
    db: &dyn Database,
    order: &mut Order,
    previous: Option<OrderStatus>,
    create_package: bool,
    ctx: &ActionContext<'_>,
    created: &mut Vec<RecordRef>,
) -> Result<(), ActionError> {
    let details = ctx.details;
    let now = Utc::now();
    let entered_shipped = order.status == OrderStatus::Shipped && previous != Some(OrderStatus::Shipped);
    let entered_delivered =
        order.status == OrderStatus::Delivered && previous != Some(OrderStatus::Delivered);

    if order.total_amount.is_none()
        && let Some(amount) = details.amount
    {
        order.total_amount = Some(amount);
        order.currency = details.currency.clone();
    }
    if details.payment_detected || order.status == OrderStatus::Paid {
        order.is_paid = true;
    }
    if let Some(tracking) = &details.tracking_number {
        order.tracking_number = Some(tracking.clone());
    }
    if let Some(carrier) = &details.carrier {
        order.carrier = Some(carrier.clone());
    }

    if entered_shipped && order.shipped_date.is_none() {
        order.shipped_date = Some(now);
    }
    if entered_delivered && order.delivered_date.is_none() {
        order.delivered_date = Some(now);
    }

    let shipped_or_later = matches!(order.status, OrderStatus::Shipped | OrderStatus::Delivered);
    if shipped_or_later && create_package && order.package_id.is_none() {
        let tracking = order
            .tracking_number
            .clone()
            .unwrap_or_else(|| placeholder_tracking(&ctx.message.id));
        match db.find_package_by_tracking(&order.owner_id, &tracking).await? {
            Some(package) => order.package_id = Some(package.id),
            None => {
                let package = Package {
                    id: Uuid::new_v4(),
                    owner_id: order.owner_id.clone(),
                    tracking_number: tracking,
                    carrier: order
                        .carrier
                        .clone()
                        .unwrap_or_else(|| UNKNOWN_CARRIER.to_string()),
                    status: match details.package_status {
                        PackageStatus::Pending => PackageStatus::InTransit,
                        status => status,
                    },
                    description: Some(format!(
                        "Bestelling {} bij {}",
                        order.order_number, order.shop_name
                    )),
                    source_message_id: Some(ctx.message.id.clone()),
                    expected_delivery: details.date,
                    created_at: now,
                    updated_at: now,
                };
                db.create_package(&package).await?;
                order.package_id = Some(package.id);
                created.push(RecordRef::PackageId(package.id));
            }
        }
    }

    if entered_delivered
        && let Some(package_id) = order.package_id
        && let Some(mut package) = db.get_package(package_id).await?
        && package.status != PackageStatus::Delivered
    {
        package.status = PackageStatus::Delivered;
        package.updated_at = now;
        db.update_package(&package).await?;
    }
    Ok(())
}
