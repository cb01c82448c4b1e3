use chrono::Utc;
use uuid::Uuid;

use super::{ActionContext, ActionOutcome, UNKNOWN_CARRIER};
use crate::error::ActionError;
use crate::records::{Package, PackageStatus, RecordRef};
use crate::rules::PackageParams;
use crate::store::Database;

/// Tracking number stored when the message carries none.
pub(super) fn placeholder_tracking(message_id: &str) -> String {
    format!("PENDING-{message_id}")
}

/// Resolve by tracking number: update the existing package or create one.
pub(super) async fn track_package(
    db: &dyn Database,
    params: &PackageParams,
    ctx: &ActionContext<'_>,
) -> Result<ActionOutcome, ActionError> {
    let details = ctx.details;
    let tracking = details
        .tracking_number
        .clone()
        .unwrap_or_else(|| placeholder_tracking(&ctx.message.id));
    let carrier = details
        .carrier
        .clone()
        .or_else(|| params.carrier.clone())
        .or_else(|| {
            ctx.classification
                .extracted()
                .and_then(|d| d.carrier.clone())
        });

    if let Some(mut package) = db.find_package_by_tracking(ctx.owner_id, &tracking).await? {
        let previous = package.status;
        // A message without status words says nothing about progress.
        if details.package_status != PackageStatus::Pending {
            package.status = details.package_status;
        }
        if package.carrier == UNKNOWN_CARRIER
            && let Some(carrier) = carrier
        {
            package.carrier = carrier;
        }
        if details.date.is_some() {
            package.expected_delivery = details.date;
        }
        package.updated_at = Utc::now();
        db.update_package(&package).await?;
        return Ok(ActionOutcome::updated(RecordRef::PackageId(package.id)).with_detail(format!(
            "package {}: {} -> {}",
            package.tracking_number,
            previous.as_str(),
            package.status.as_str()
        )));
    }

    let now = Utc::now();
    let from = details
        .shop_name
        .clone()
        .unwrap_or_else(|| details.sender_name.clone());
    let package = Package {
        id: Uuid::new_v4(),
        owner_id: ctx.owner_id.to_string(),
        tracking_number: tracking,
        carrier: carrier.unwrap_or_else(|| UNKNOWN_CARRIER.to_string()),
        status: details.package_status,
        description: Some(format!("Pakket van {from}")),
        source_message_id: Some(ctx.message.id.clone()),
        expected_delivery: details.date,
        created_at: now,
        updated_at: now,
    };
    db.create_package(&package).await?;
    Ok(ActionOutcome::created(RecordRef::PackageId(package.id)))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::actions::test_support::{Fixture, memory_db};
    use crate::pipeline::types::Category;

    #[tokio::test]
    async fn creates_then_updates_same_tracking_number() {
        let db = memory_db().await;
        let first = Fixture::new(
            "m1",
            "PostNL <noreply@postnl.nl>",
            "Uw pakket is onderweg",
            "Track & Trace: 3SDEVC1234567",
            Category::Delivery,
        );
        let outcome = track_package(db.as_ref(), &PackageParams::default(), &first.ctx())
            .await
            .unwrap();
        assert_eq!(outcome.created.len(), 1);

        let second = Fixture::new(
            "m2",
            "PostNL <noreply@postnl.nl>",
            "Je pakket is bezorgd",
            "Zending 3SDEVC1234567 is bezorgd.",
            Category::Delivery,
        );
        let outcome = track_package(db.as_ref(), &PackageParams::default(), &second.ctx())
            .await
            .unwrap();
        assert!(outcome.created.is_empty());
        assert!(outcome.success);

        let packages = db.list_packages("owner-1").await.unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].carrier, "PostNL");
        assert_eq!(packages[0].tracking_number, "3SDEVC1234567");
        assert_eq!(packages[0].status, PackageStatus::Delivered);
        assert_eq!(outcome.reference, Some(RecordRef::PackageId(packages[0].id)));
    }

    #[tokio::test]
    async fn missing_tracking_gets_placeholder_and_param_carrier() {
        let db = memory_db().await;
        let fixture = Fixture::new("m9", "shop@webwinkel.nl", "Verzonden", "Je bestelling komt eraan.", Category::Delivery);
        let params = PackageParams {
            carrier: Some("Budbee".into()),
        };
        track_package(db.as_ref(), &params, &fixture.ctx()).await.unwrap();

        let package = &db.list_packages("owner-1").await.unwrap()[0];
        assert_eq!(package.tracking_number, "PENDING-m9");
        assert_eq!(package.carrier, "Budbee");
    }

    #[tokio::test]
    async fn keeps_the_announced_delivery_date() {
        let db = memory_db().await;
        let announced = Fixture::new(
            "m1",
            "PostNL <noreply@postnl.nl>",
            "Uw pakket is onderweg",
            "Track & Trace: 3SDEVC7654321\nVerwachte bezorging: 12-03-2026",
            Category::Delivery,
        );
        track_package(db.as_ref(), &PackageParams::default(), &announced.ctx())
            .await
            .unwrap();
        let package = &db.list_packages("owner-1").await.unwrap()[0];
        assert_eq!(package.expected_delivery, NaiveDate::from_ymd_opt(2026, 3, 12));

        // A later notice without a date keeps the one already known.
        let followup = Fixture::new(
            "m2",
            "PostNL <noreply@postnl.nl>",
            "Je pakket is bezorgd",
            "Zending 3SDEVC7654321 is bezorgd.",
            Category::Delivery,
        );
        track_package(db.as_ref(), &PackageParams::default(), &followup.ctx())
            .await
            .unwrap();
        let packages = db.list_packages("owner-1").await.unwrap();
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].status, PackageStatus::Delivered);
        assert_eq!(packages[0].expected_delivery, NaiveDate::from_ymd_opt(2026, 3, 12));
    }

    #[tokio::test]
    async fn unknown_carrier_when_nothing_detected() {
        let db = memory_db().await;
        let fixture = Fixture::new("m3", "info@winkel.nl", "Pakket", "", Category::Delivery);
        track_package(db.as_ref(), &PackageParams::default(), &fixture.ctx())
            .await
            .unwrap();
        assert_eq!(db.list_packages("owner-1").await.unwrap()[0].carrier, UNKNOWN_CARRIER);
    }
}
