//! Local detail extraction.
//!
//! Reads the raw message text to fill record fields (amounts, tracking and
//! order numbers, dates). Runs in-process only; nothing here is ever sent to
//! the inference endpoint.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use rust_decimal::Decimal;

use crate::pipeline::anonymizer::sender_domain;
use crate::pipeline::dictionary::{self, CARRIERS, DomainKind, MERCHANTS};
use crate::pipeline::types::RawMessage;
use crate::records::{OrderStatus, PackageStatus};

static AMOUNT_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(€|\$|£|\beur\b|\busd\b|\bgbp\b)\s?(\d+(?:[.,]\d{3})*(?:[.,]\d{1,2})?)")
        .expect("amount prefix regex")
});

static AMOUNT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+(?:[.,]\d{3})*(?:[.,]\d{1,2})?)\s?(euro|eur|usd|gbp|€)")
        .expect("amount suffix regex")
});

static CARRIER_TRACKING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(3S[A-Z0-9]{8,20}|1Z[A-Z0-9]{16}|JJD\d{10,20})\b").expect("carrier tracking regex")
});

static LABELLED_TRACKING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:track(?:ing)?[\s\-]?(?:number|nummer|code|id)|track\s*&\s*trace(?:[\s\-]?code)?|zendingnummer|barcode|volgnummer)\s*[:#]?\s*([A-Z0-9]{8,30})\b",
    )
    .expect("labelled tracking regex")
});

static BARE_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{10,22}\b").expect("bare digits regex"));

static ORDER_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:bestelnummer|ordernummer|order[\s\-]?(?:number|nr|no|id)|bestelling|order)\.?\s*[:#]?\s*#?\s*([A-Z]*\d[A-Z0-9\-]{2,30})",
    )
    .expect("order number regex")
});

static INVOICE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:factuurnummer|factuur[\s\-]?nr|invoice[\s\-]?(?:number|nr|no)|invoice)\.?\s*[:#]?\s*#?\s*([A-Z]*\d[A-Z0-9\-/]{2,30})",
    )
    .expect("invoice number regex")
});

static DATE_DMY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})[\-/.](\d{1,2})[\-/.](\d{4})\b").expect("dmy regex")
});

static DATE_ISO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("iso date regex"));

static TIME_COLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([01]?\d|2[0-3])[:h]([0-5]\d)\b").expect("time regex"));

static TIME_UUR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([01]?\d|2[0-3])\.([0-5]\d)\s*uur\b").expect("time uur regex")
});

static URGENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:dringend|urgent|asap|spoed|spoedgeval|belangrijk|important|deadline)\b")
        .expect("urgency regex")
});

static PAYMENT_RECEIVED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:betaald|betaling ontvangen|betaling bevestigd|payment received|payment confirmed|paid)\b",
    )
    .expect("payment regex")
});

static CANCELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:geannuleerd|annulering|cancelled|canceled|cancellation)\b")
        .expect("cancelled regex")
});

static RETURNED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:retour|retourzending|geretourneerd|returned|refund|terugbetaling)\b")
        .expect("returned regex")
});

static SHIPPED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:verzonden|verstuurd|shipped|dispatched|onderweg|in transit|track\s*&\s*trace)\b",
    )
    .expect("shipped regex")
});

static PROCESSING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:in behandeling|wordt verwerkt|processing|being prepared|wordt klaargemaakt)\b")
        .expect("processing regex")
});

static AWAITING_PAYMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:wacht op betaling|awaiting payment|payment pending|betaal nu|pay now)\b")
        .expect("awaiting payment regex")
});

static ORDER_PLACED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:orderbevestiging|order confirmation|order confirmed|bedankt voor (?:je|uw) bestelling|thank you for your order)\b",
    )
    .expect("order placed regex")
});

static PACKAGE_DELIVERED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:is bezorgd|zijn bezorgd|afgeleverd|has been delivered|was delivered|delivered)\b")
        .expect("delivered regex")
});

static OUT_FOR_DELIVERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:out for delivery|vandaag bezorgd|wordt vandaag|bezorger is onderweg|onderweg naar je)\b",
    )
    .expect("out for delivery regex")
});

static IN_TRANSIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:onderweg|in transit|verzonden|verstuurd|shipped|sorteercentrum|dispatched)\b")
        .expect("in transit regex")
});

/// Record fields read from the raw message. Never leaves the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDetails {
    pub sender_name: String,
    pub sender_domain: String,
    pub amount: Option<Decimal>,
    /// ISO 4217 code of `amount`.
    pub currency: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub order_number: Option<String>,
    pub invoice_number: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    /// Merchant or shop the message comes from.
    pub shop_name: Option<String>,
    pub urgent: bool,
    pub payment_detected: bool,
    /// Order status implied by the text, if any.
    pub order_status: Option<OrderStatus>,
    pub package_status: PackageStatus,
}

/// Extract record fields from a message.
pub fn extract_details(message: &RawMessage) -> MessageDetails {
    let text = message.full_text();
    let domain = sender_domain(&message.sender);
    let domain_kind = dictionary::lookup_domain(&domain);

    let (amount, currency) = match extract_amount(&text) {
        Some((amount, currency)) => (Some(amount), Some(currency)),
        None => (None, None),
    };
    let order_number = first_capture(&ORDER_NUMBER, &text);
    let invoice_number = first_capture(&INVOICE_NUMBER, &text);
    let tracking_number = extract_tracking_number(&text, &[&order_number, &invoice_number]);
    let carrier = extract_carrier(&text, domain_kind, tracking_number.as_deref());
    let package_status = infer_package_status(&text);
    let payment_detected = PAYMENT_RECEIVED.is_match(&text);
    let order_status = infer_order_status(
        &text,
        tracking_number.is_some(),
        package_status,
        payment_detected,
    );

    MessageDetails {
        sender_name: message.sender_name(),
        shop_name: shop_name(&text, &domain, domain_kind),
        sender_domain: domain,
        amount,
        currency,
        tracking_number,
        carrier,
        order_number,
        invoice_number,
        date: extract_date(&text),
        time: extract_time(&text),
        urgent: URGENT.is_match(&text),
        payment_detected,
        order_status,
        package_status,
    }
}

/// First money amount and its currency.
fn extract_amount(text: &str) -> Option<(Decimal, String)> {
    let prefix = AMOUNT_PREFIX
        .captures(text)
        .map(|c| (c.get(0).map_or(0, |m| m.start()), c[1].to_string(), c[2].to_string()));
    let suffix = AMOUNT_SUFFIX
        .captures(text)
        .map(|c| (c.get(0).map_or(0, |m| m.start()), c[2].to_string(), c[1].to_string()));

    let (_, symbol, number) = match (prefix, suffix) {
        (Some(p), Some(s)) => {
            if p.0 <= s.0 {
                p
            } else {
                s
            }
        }
        (Some(p), None) => p,
        (None, Some(s)) => s,
        (None, None) => return None,
    };
    let amount = parse_amount(&number)?;
    Some((amount, currency_code(&symbol).to_string()))
}

fn currency_code(symbol: &str) -> &'static str {
    match symbol.to_ascii_lowercase().as_str() {
        "$" | "usd" => "USD",
        "£" | "gbp" => "GBP",
        _ => "EUR",
    }
}

/// Parse `1.234,56`, `1,234.56`, `84,20` or `19.99` into a decimal.
///
/// A separator followed by one or two trailing digits is the decimal point;
/// every other separator groups thousands.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    let decimal_at = raw
        .rfind(|c| c == '.' || c == ',')
        .filter(|&idx| (1..=2).contains(&(raw.len() - idx - 1)));
    let normalized: String = match decimal_at {
        Some(idx) => {
            let whole: String = raw[..idx].chars().filter(char::is_ascii_digit).collect();
            format!("{whole}.{}", &raw[idx + 1..])
        }
        None => raw.chars().filter(char::is_ascii_digit).collect(),
    };
    normalized.parse().ok()
}

fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures_iter(text)
        .find_map(|c| c.get(1).map(|m| m.as_str().trim_end_matches('-').to_string()))
}

fn extract_tracking_number(text: &str, exclude: &[&Option<String>]) -> Option<String> {
    let excluded = |value: &str| exclude.iter().any(|e| e.as_deref() == Some(value));

    if let Some(m) = CARRIER_TRACKING.find(text) {
        return Some(m.as_str().to_string());
    }
    if let Some(code) = LABELLED_TRACKING
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_ascii_uppercase()))
        .find(|code| code.chars().filter(char::is_ascii_digit).count() >= 4 && !excluded(code))
    {
        return Some(code);
    }
    // Bare digit runs only count where the message is about a shipment.
    if IN_TRANSIT.is_match(text) || OUT_FOR_DELIVERY.is_match(text) {
        return BARE_DIGITS
            .find_iter(text)
            .map(|m| m.as_str())
            .find(|digits| !digits.starts_with("06") && !excluded(digits))
            .map(str::to_string);
    }
    None
}

fn extract_carrier(text: &str, domain_kind: Option<DomainKind>, tracking: Option<&str>) -> Option<String> {
    let lower = text.to_lowercase();
    if let Some(carrier) = CARRIERS
        .iter()
        .find(|carrier| dictionary::contains_word(&lower, carrier))
    {
        return Some((*carrier).to_string());
    }
    if let Some(DomainKind::Carrier(carrier)) = domain_kind {
        return Some(carrier.to_string());
    }
    let by_prefix = match tracking? {
        t if t.starts_with("3S") => "PostNL",
        t if t.starts_with("1Z") => "UPS",
        t if t.starts_with("JJD") => "DHL",
        _ => return None,
    };
    Some(by_prefix.to_string())
}

/// Shop name: registered merchant domain, merchant named in the text, or the
/// capitalized second-level label of the sender domain.
fn shop_name(text: &str, domain: &str, domain_kind: Option<DomainKind>) -> Option<String> {
    if let Some(DomainKind::Merchant(merchant)) = domain_kind {
        return Some(merchant.to_string());
    }
    let lower = text.to_lowercase();
    if let Some(merchant) = MERCHANTS
        .iter()
        .find(|merchant| dictionary::contains_word(&lower, merchant))
    {
        return Some((*merchant).to_string());
    }
    shop_from_domain(domain)
}

/// `"mail.shopx.nl"` → `"Shopx"`. `None` for `"unknown"`.
pub fn shop_from_domain(domain: &str) -> Option<String> {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return None;
    }
    let label = labels[labels.len() - 2];
    let mut chars = label.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

fn extract_date(text: &str) -> Option<NaiveDate> {
    let dmy = DATE_DMY.captures_iter(text).find_map(|c| {
        let day = c[1].parse().ok()?;
        let month = c[2].parse().ok()?;
        let year = c[3].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        Some((c.get(0).map_or(0, |m| m.start()), date))
    });
    let iso = DATE_ISO.captures_iter(text).find_map(|c| {
        let year = c[1].parse().ok()?;
        let month = c[2].parse().ok()?;
        let day = c[3].parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        Some((c.get(0).map_or(0, |m| m.start()), date))
    });
    match (dmy, iso) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a.1 } else { b.1 }),
        (a, b) => a.or(b).map(|(_, date)| date),
    }
}

fn extract_time(text: &str) -> Option<NaiveTime> {
    let parse = |c: regex::Captures<'_>| {
        NaiveTime::from_hms_opt(c[1].parse().ok()?, c[2].parse().ok()?, 0)
    };
    TIME_COLON
        .captures(text)
        .and_then(parse)
        .or_else(|| TIME_UUR.captures(text).and_then(parse))
}

/// Package status implied by the text.
pub fn infer_package_status(text: &str) -> PackageStatus {
    if OUT_FOR_DELIVERY.is_match(text) {
        PackageStatus::OutForDelivery
    } else if PACKAGE_DELIVERED.is_match(text) {
        PackageStatus::Delivered
    } else if IN_TRANSIT.is_match(text) {
        PackageStatus::InTransit
    } else {
        PackageStatus::Pending
    }
}

/// Order status implied by the text.
///
/// Precedence: cancelled, returned, delivered, shipped, processing, paid,
/// awaiting payment, ordered. `None` when nothing in the text speaks to it.
pub fn infer_order_status(
    text: &str,
    has_tracking: bool,
    package_status: PackageStatus,
    payment_detected: bool,
) -> Option<OrderStatus> {
    if CANCELLED.is_match(text) {
        Some(OrderStatus::Cancelled)
    } else if RETURNED.is_match(text) {
        Some(OrderStatus::Returned)
    } else if package_status == PackageStatus::Delivered {
        Some(OrderStatus::Delivered)
    } else if has_tracking || SHIPPED.is_match(text) || package_status == PackageStatus::OutForDelivery {
        Some(OrderStatus::Shipped)
    } else if PROCESSING.is_match(text) {
        Some(OrderStatus::Processing)
    } else if payment_detected {
        Some(OrderStatus::Paid)
    } else if AWAITING_PAYMENT.is_match(text) {
        Some(OrderStatus::AwaitingPayment)
    } else if ORDER_PLACED.is_match(text) {
        Some(OrderStatus::Ordered)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;

    fn message(sender: &str, subject: &str, body: &str) -> RawMessage {
        RawMessage {
            id: "msg-1".into(),
            thread_id: String::new(),
            sender: sender.into(),
            recipients: vec![],
            subject: subject.into(),
            body: body.into(),
            received_at: Utc::now(),
            attachments: vec![],
            labels: vec![],
        }
    }

    #[test]
    fn amounts_in_both_notations() {
        assert_eq!(parse_amount("84,20"), Some(dec!(84.20)));
        assert_eq!(parse_amount("1.234,56"), Some(dec!(1234.56)));
        assert_eq!(parse_amount("1,234.56"), Some(dec!(1234.56)));
        assert_eq!(parse_amount("1.234"), Some(dec!(1234)));
        assert_eq!(parse_amount("19.9"), Some(dec!(19.9)));
        assert_eq!(parse_amount("abc"), None);
    }

    #[test]
    fn first_amount_with_currency() {
        let d = extract_details(&message("a@b.nl", "Factuur", "Totaal: € 1.234,56, BTW € 214,26"));
        assert_eq!(d.amount, Some(dec!(1234.56)));
        assert_eq!(d.currency.as_deref(), Some("EUR"));

        let d = extract_details(&message("a@b.com", "Invoice", "Amount due: 42.50 USD"));
        assert_eq!(d.amount, Some(dec!(42.50)));
        assert_eq!(d.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn carrier_tracking_numbers() {
        let d = extract_details(&message(
            "PostNL <noreply@postnl.nl>",
            "Uw pakket is onderweg",
            "Track & Trace: 3SDEVC1234567",
        ));
        assert_eq!(d.tracking_number.as_deref(), Some("3SDEVC1234567"));
        assert_eq!(d.carrier.as_deref(), Some("PostNL"));
        assert_eq!(d.package_status, PackageStatus::InTransit);

        let d = extract_details(&message("x@shop.nl", "Shipped", "UPS 1Z999AA10123456784"));
        assert_eq!(d.tracking_number.as_deref(), Some("1Z999AA10123456784"));
        assert_eq!(d.carrier.as_deref(), Some("UPS"));
    }

    #[test]
    fn order_number_is_not_a_tracking_number() {
        let d = extract_details(&message(
            "AliExpress <transaction@notice.aliexpress.com>",
            "Bedankt voor je bestelling",
            "Bestelnummer: 8123456789012345. Totaal € 23,99.",
        ));
        assert_eq!(d.order_number.as_deref(), Some("8123456789012345"));
        assert_eq!(d.tracking_number, None);
        assert_eq!(d.shop_name.as_deref(), Some("AliExpress"));
        assert_eq!(d.order_status, Some(OrderStatus::Ordered));
    }

    #[test]
    fn order_number_needs_a_digit() {
        let d = extract_details(&message("x@y.nl", "Je bestelling onderweg", "order 55512-A"));
        assert_eq!(d.order_number.as_deref(), Some("55512-A"));
    }

    #[test]
    fn invoice_number_and_dates() {
        let d = extract_details(&message(
            "Energie <billing@energie.nl>",
            "Factuur",
            "Factuurnummer: F2024-0042, te betalen voor 31-03-2024 om 14:30",
        ));
        assert_eq!(d.invoice_number.as_deref(), Some("F2024-0042"));
        assert_eq!(d.date, NaiveDate::from_ymd_opt(2024, 3, 31));
        assert_eq!(d.time, NaiveTime::from_hms_opt(14, 30, 0));
        assert_eq!(d.shop_name.as_deref(), Some("Energie"));
    }

    #[test]
    fn dutch_time_notation() {
        let d = extract_details(&message("a@b.nl", "Afspraak", "Graag om 9.15 uur op 2024-05-02"));
        assert_eq!(d.time, NaiveTime::from_hms_opt(9, 15, 0));
        assert_eq!(d.date, NaiveDate::from_ymd_opt(2024, 5, 2));
    }

    #[test]
    fn invalid_dates_are_skipped() {
        let d = extract_details(&message("a@b.nl", "", "31-02-2024 en later 01-03-2024"));
        assert_eq!(d.date, NaiveDate::from_ymd_opt(2024, 3, 1));
    }

    #[test]
    fn urgency_and_payment() {
        let d = extract_details(&message("a@b.nl", "DRINGEND: reactie nodig", ""));
        assert!(d.urgent);
        assert!(!d.payment_detected);
        let d = extract_details(&message("a@b.nl", "Betaling ontvangen", "Je bestelling is betaald."));
        assert!(d.payment_detected);
        assert_eq!(d.order_status, Some(OrderStatus::Paid));
    }

    #[test]
    fn order_status_precedence() {
        let infer = |text: &str| {
            infer_order_status(text, false, infer_package_status(text), PAYMENT_RECEIVED.is_match(text))
        };
        assert_eq!(infer("Je bestelling is geannuleerd, betaald bedrag retour"), Some(OrderStatus::Cancelled));
        assert_eq!(infer("Retour ontvangen"), Some(OrderStatus::Returned));
        assert_eq!(infer("Je pakket is bezorgd"), Some(OrderStatus::Delivered));
        assert_eq!(infer("Je bestelling is verzonden"), Some(OrderStatus::Shipped));
        assert_eq!(infer("Je bestelling is in behandeling"), Some(OrderStatus::Processing));
        assert_eq!(infer("Wacht op betaling"), Some(OrderStatus::AwaitingPayment));
        assert_eq!(infer("Thank you for your order"), Some(OrderStatus::Ordered));
        assert_eq!(infer("Hallo"), None);
        assert_eq!(
            infer_order_status("Hallo", true, PackageStatus::Pending, false),
            Some(OrderStatus::Shipped)
        );
    }

    #[test]
    fn package_status_inference() {
        assert_eq!(infer_package_status("Uw pakket wordt vandaag bezorgd"), PackageStatus::OutForDelivery);
        assert_eq!(infer_package_status("Out for delivery"), PackageStatus::OutForDelivery);
        assert_eq!(infer_package_status("Your parcel was delivered"), PackageStatus::Delivered);
        assert_eq!(infer_package_status("In het sorteercentrum"), PackageStatus::InTransit);
        assert_eq!(infer_package_status("We hebben je label ontvangen"), PackageStatus::Pending);
    }

    #[test]
    fn shop_from_unknown_domain() {
        assert_eq!(shop_from_domain("mail.shopx.nl").as_deref(), Some("Shopx"));
        assert_eq!(shop_from_domain("unknown"), None);
    }
}
