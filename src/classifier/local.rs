//! Deterministic keyword and domain scoring.

use crate::pipeline::dictionary::{
    self, CARRIER_TOKEN_WEIGHT, DISAMBIGUATION_BONUS, DomainKind, FLAG_WEIGHTS,
    MERCHANT_TOKEN_WEIGHT, ORDER_ONLY, PDF_ATTACHMENT_BONUS, SHIPMENT_ONLY,
};
use crate::pipeline::types::{AnonymizedMessage, Category, Classification, ExtractedData};

/// Confidence reported when nothing scored.
pub const NO_SIGNAL_CONFIDENCE: f64 = 0.5;

/// Upper bound on local confidence.
pub const MAX_LOCAL_CONFIDENCE: f64 = 0.95;

const CONFIDENCE_LIFT: f64 = 0.3;

/// Per-category scores, indexed by [`Category::index`].
pub type Scores = [u32; 9];

/// Score every category for a message.
pub fn score(message: &AnonymizedMessage) -> Scores {
    let mut scores: Scores = [0; 9];

    if let Some((category, bonus)) = dictionary::domain_bonus(&message.sender_domain) {
        scores[category.index()] += bonus;
    }

    for token in message.all_tokens() {
        let Some((prefix, word)) = token.split_once(':') else {
            continue;
        };
        match prefix {
            "carrier" => scores[Category::Delivery.index()] += CARRIER_TOKEN_WEIGHT,
            "merchant" => scores[Category::Order.index()] += MERCHANT_TOKEN_WEIGHT,
            "has" => {
                for (flag, category, weight) in FLAG_WEIGHTS {
                    if *flag == token {
                        scores[category.index()] += weight;
                    }
                }
            }
            other => {
                if let Ok(category) = other.parse::<Category>()
                    && let Some(weight) = dictionary::keyword_weight(category, word)
                {
                    scores[category.index()] += weight;
                }
            }
        }
    }

    if message.attachment_types.iter().any(|t| t == "application/pdf") {
        scores[Category::Invoice.index()] += PDF_ATTACHMENT_BONUS;
    }

    let order = Category::Order.index();
    let delivery = Category::Delivery.index();
    if scores[order] > 0 && scores[delivery] > 0 {
        let shipment = SHIPMENT_ONLY
            .iter()
            .any(|w| message.has_token(&format!("delivery:{w}")));
        let order_only = ORDER_ONLY
            .iter()
            .any(|w| message.has_token(&format!("order:{w}")));
        if shipment && !order_only {
            scores[delivery] += DISAMBIGUATION_BONUS;
        } else if order_only && !shipment {
            scores[order] += DISAMBIGUATION_BONUS;
        }
    }

    scores
}

/// Classify a message from its tokens alone. Pure and deterministic.
///
/// Equal top scores go to the category declared first in [`Category`].
pub fn classify_locally(message: &AnonymizedMessage) -> Classification {
    let scores = score(message);
    let total: u32 = scores.iter().sum();

    if total == 0 {
        return Classification {
            category: Category::Unknown,
            confidence: NO_SIGNAL_CONFIDENCE,
            extracted_data: None,
            reasoning: "no category keywords or known sender domain".to_string(),
        };
    }

    let mut winner = Category::ALL[0];
    for category in Category::ALL {
        if scores[category.index()] > scores[winner.index()] {
            winner = category;
        }
    }
    let top = scores[winner.index()];
    let confidence = (f64::from(top) / f64::from(total) + CONFIDENCE_LIFT).min(MAX_LOCAL_CONFIDENCE);

    let extracted = extracted_from_tokens(message);
    Classification {
        category: winner,
        confidence,
        extracted_data: (!extracted.is_empty()).then_some(extracted),
        reasoning: format!("local scoring: {winner} {top} of {total}"),
    }
}

/// Category-specific fields readable from tokens and the sender domain.
pub fn extracted_from_tokens(message: &AnonymizedMessage) -> ExtractedData {
    let named = |prefix: &str| {
        message
            .all_tokens()
            .find_map(|t| t.strip_prefix(prefix))
            .map(str::to_string)
    };
    let domain = dictionary::lookup_domain(&message.sender_domain);

    let carrier = named("carrier:").or_else(|| match domain {
        Some(DomainKind::Carrier(name)) => Some(name.to_string()),
        _ => None,
    });
    let merchant = match domain {
        Some(DomainKind::Merchant(name)) => Some(name.to_string()),
        _ => named("merchant:"),
    };

    ExtractedData {
        carrier,
        merchant,
        ..Default::default()
    }
}
