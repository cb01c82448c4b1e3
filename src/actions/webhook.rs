use std::time::Duration;

use serde_json::json;

use super::{ActionContext, ActionOutcome};
use crate::error::ActionError;
use crate::rules::WebhookParams;

/// One POST with the message and its extracted data. No retries.
pub(super) async fn call_webhook(
    http: &reqwest::Client,
    timeout: Duration,
    params: &WebhookParams,
    ctx: &ActionContext<'_>,
) -> Result<ActionOutcome, ActionError> {
    let details = ctx.details;
    let payload = json!({
        "message": {
            "id": ctx.message.id,
            "threadId": ctx.message.thread_id,
            "from": ctx.message.sender,
            "subject": ctx.message.subject,
            "receivedAt": ctx.message.received_at,
        },
        "classification": ctx.classification,
        "extractedData": {
            "amount": details.amount,
            "currency": details.currency,
            "trackingNumber": details.tracking_number,
            "carrier": details.carrier,
            "orderNumber": details.order_number,
            "invoiceNumber": details.invoice_number,
            "shopName": details.shop_name,
            "date": details.date,
        },
    });

    let response = http
        .post(&params.url)
        .timeout(timeout)
        .json(&payload)
        .send()
        .await
        .map_err(|e| ActionError::Http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ActionError::WebhookStatus {
            status: status.as_u16(),
        });
    }
    Ok(ActionOutcome::done(format!("webhook delivered (HTTP {})", status.as_u16())))
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::actions::test_support::Fixture;
    use crate::pipeline::types::Category;

    fn fixture() -> Fixture {
        Fixture::new(
            "m1",
            "PostNL <noreply@postnl.nl>",
            "Uw pakket is onderweg",
            "Track & Trace: 3SDEVC1234567",
            Category::Delivery,
        )
    }

    #[tokio::test]
    async fn posts_message_and_extracted_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(json!({
                "message": { "id": "m1" },
                "classification": { "category": "delivery" },
                "extractedData": { "trackingNumber": "3SDEVC1234567", "carrier": "PostNL" },
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let fixture = fixture();
        let params = WebhookParams {
            url: format!("{}/hook", server.uri()),
        };
        let outcome = call_webhook(&reqwest::Client::new(), Duration::from_secs(5), &params, &fixture.ctx())
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.detail.as_deref(), Some("webhook delivered (HTTP 204)"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let fixture = fixture();
        let params = WebhookParams { url: server.uri() };
        let err = call_webhook(&reqwest::Client::new(), Duration::from_secs(5), &params, &fixture.ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::WebhookStatus { status: 500 }));
    }

    #[tokio::test]
    async fn unreachable_target_is_an_http_error() {
        let fixture = fixture();
        let params = WebhookParams {
            url: "http://127.0.0.1:9/hook".into(),
        };
        let err = call_webhook(&reqwest::Client::new(), Duration::from_secs(2), &params, &fixture.ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Http(_)));
    }
}
