//! PII-stripping message anonymizer.
//!
//! Turns a [`RawMessage`] into an [`AnonymizedMessage`] made only of the
//! sender domain, dictionary tokens, presence flags and coarse metadata.
//! Raw text is redacted before any tokenization happens.

use std::borrow::Cow;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Timelike, Utc};
use regex::{Captures, Regex};

use crate::pipeline::dictionary::{
    self, CARRIERS, FLAG_AMOUNT, FLAG_DATE, FLAG_TRACKING_CODE, KEYWORDS, MERCHANTS,
};
use crate::pipeline::types::{AnonymizedMessage, Category, RawMessage, TemporalFeatures};

/// Replacement for every redacted span.
pub const REDACTED: &str = "[REDACTED]";

const UNKNOWN_DOMAIN: &str = "unknown";
const FALLBACK_MIME: &str = "application/octet-stream";

/// Minimum digit count for a phone-shaped span to be redacted.
const PHONE_MIN_DIGITS: usize = 9;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("email regex")
});

static IBAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z]{2}\d{2}(?:\s?[A-Z0-9]{4}){2,7}(?:\s?[A-Z0-9]{1,3})?\b")
        .expect("iban regex")
});

static CREDIT_CARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{4}[\s\-]?){3}\d{4}\b").expect("credit card regex")
});

// Dutch BSN and Belgian national register number.
static NATIONAL_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{9}\b|\b\d{2}\.\d{2}\.\d{2}-\d{3}\.\d{2}\b").expect("national id regex")
});

static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+|\b00|\b0)\d(?:[\s\-.]?\d){7,13}\b").expect("phone regex")
});

static POSTAL_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[1-9]\d{3}\s?[A-Z]{2}\b").expect("postal code regex"));

static STREET_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b[A-Z]\p{L}*(?:straat|laan|weg|plein|gracht|kade|singel|dijk|dreef|steeg)\s+\d{1,4}\s?[a-zA-Z]?\b",
        r"|\b\d{1,5}\s+[A-Z]\p{L}+\s+(?:Street|St|Avenue|Ave|Road|Rd|Lane|Ln|Boulevard|Blvd)\b",
    ))
    .expect("street address regex")
});

static HONORIFIC_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?i:de heer|mevrouw|heer|dhr|mevr|mw|mrs|mr|ms|dr)\.?\s+(?:(?:van|de|der|den)\s+)*[A-Z][\p{L}'\-]+(?:\s+[A-Z][\p{L}'\-]+)?",
    )
    .expect("honorific regex")
});

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[€$£]\s?\d|\b(?:eur|usd|gbp)\s?\d|\b\d+(?:[.,]\d{2})?\s?(?:eur|euro|usd|gbp)\b")
        .expect("amount regex")
});

static TRACKING_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z0-9]{10,30}\b").expect("tracking regex"));

static DATE_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\b\d{1,2}[\-/.]\d{1,2}[\-/.]\d{2,4}\b|\b\d{4}-\d{2}-\d{2}\b",
        r"|(?i)\b\d{1,2}\s+(?:jan|feb|mrt|maart|mar|apr|mei|may|jun|jul|aug|sep|okt|oct|nov|dec)[a-z]*\b",
    ))
    .expect("date regex")
});

static MIME_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9.+\-]+/[a-z0-9.+\-]+$").expect("mime regex"));

static DOMAIN_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9](?:[a-z0-9\-]*[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9\-]*[a-z0-9])?)+$")
        .expect("domain regex")
});

/// Anonymize a message. Never fails.
pub fn anonymize(message: &RawMessage) -> AnonymizedMessage {
    let subject = redact_pii(&message.subject);
    let body = redact_pii(&message.body);

    let mut attachment_types: Vec<String> = Vec::new();
    for attachment in &message.attachments {
        let mime = normalize_mime(&attachment.mime_type);
        if !attachment_types.contains(&mime) {
            attachment_types.push(mime);
        }
    }

    AnonymizedMessage {
        sender_domain: sender_domain(&message.sender),
        subject_tokens: tokenize(&subject),
        body_tokens: tokenize(&body),
        has_attachments: !message.attachments.is_empty(),
        attachment_types,
        temporal: temporal_features(message.received_at),
    }
}

/// Re-anonymize an already anonymized message.
///
/// Drops any token outside the fixed vocabulary and re-validates the domain
/// and MIME types. The identity on anything produced by [`anonymize`].
pub fn sanitize(message: &AnonymizedMessage) -> AnonymizedMessage {
    let keep = |tokens: &[String]| -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(tokens.len());
        for token in tokens {
            if is_known_token(token) && !out.contains(token) {
                out.push(token.clone());
            }
        }
        out
    };
    let mut attachment_types: Vec<String> = Vec::new();
    for mime in &message.attachment_types {
        let mime = normalize_mime(mime);
        if !attachment_types.contains(&mime) {
            attachment_types.push(mime);
        }
    }

    AnonymizedMessage {
        sender_domain: clean_domain(&message.sender_domain),
        subject_tokens: keep(&message.subject_tokens),
        body_tokens: keep(&message.body_tokens),
        has_attachments: message.has_attachments || !attachment_types.is_empty(),
        attachment_types,
        temporal: message.temporal,
    }
}

/// Replace every PII span in `text` with [`REDACTED`].
pub fn redact_pii(text: &str) -> String {
    let mut out = Cow::Borrowed(text);
    for pattern in [&*EMAIL, &*IBAN, &*CREDIT_CARD, &*NATIONAL_ID] {
        out = Cow::Owned(pattern.replace_all(&out, REDACTED).into_owned());
    }
    out = Cow::Owned(
        PHONE
            .replace_all(&out, |caps: &Captures| {
                let span = &caps[0];
                if digit_count(span) >= PHONE_MIN_DIGITS {
                    REDACTED.to_string()
                } else {
                    span.to_string()
                }
            })
            .into_owned(),
    );
    for pattern in [&*POSTAL_CODE, &*STREET_ADDRESS, &*HONORIFIC_NAME] {
        out = Cow::Owned(pattern.replace_all(&out, REDACTED).into_owned());
    }
    out.into_owned()
}

/// Whether `text` still contains anything shaped like PII.
pub fn contains_pii(text: &str) -> bool {
    [
        &*EMAIL,
        &*IBAN,
        &*CREDIT_CARD,
        &*NATIONAL_ID,
        &*POSTAL_CODE,
        &*STREET_ADDRESS,
        &*HONORIFIC_NAME,
    ]
    .iter()
    .any(|pattern| pattern.is_match(text))
        || PHONE
            .find_iter(text)
            .any(|m| digit_count(m.as_str()) >= PHONE_MIN_DIGITS)
}

fn digit_count(text: &str) -> usize {
    text.chars().filter(char::is_ascii_digit).count()
}

/// Domain of the sender address, lowercased. `"unknown"` when unparseable.
pub fn sender_domain(sender: &str) -> String {
    let Some((_, rest)) = sender.rsplit_once('@') else {
        return UNKNOWN_DOMAIN.to_string();
    };
    let domain = rest
        .split(|c: char| c == '>' || c.is_whitespace() || c == '"' || c == ',')
        .next()
        .unwrap_or_default();
    clean_domain(domain)
}

fn clean_domain(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    if DOMAIN_SHAPE.is_match(&domain) && !contains_pii(&domain) {
        domain
    } else {
        UNKNOWN_DOMAIN.to_string()
    }
}

fn normalize_mime(mime: &str) -> String {
    let mime = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if MIME_SHAPE.is_match(&mime) && !contains_pii(&mime) {
        mime
    } else {
        FALLBACK_MIME.to_string()
    }
}

/// Dictionary tokens and presence flags for one redacted field.
fn tokenize(redacted: &str) -> Vec<String> {
    let lower = redacted.to_lowercase();
    let mut tokens = Vec::new();

    for (category, words) in KEYWORDS {
        for (word, _) in *words {
            if dictionary::contains_word(&lower, word) {
                tokens.push(format!("{category}:{word}"));
            }
        }
    }
    for carrier in CARRIERS {
        if dictionary::contains_word(&lower, carrier) {
            tokens.push(format!("carrier:{carrier}"));
        }
    }
    for merchant in MERCHANTS {
        if dictionary::contains_word(&lower, merchant) {
            tokens.push(format!("merchant:{merchant}"));
        }
    }

    if AMOUNT.is_match(redacted) {
        tokens.push(FLAG_AMOUNT.to_string());
    }
    if has_tracking_shape(redacted) {
        tokens.push(FLAG_TRACKING_CODE.to_string());
    }
    if DATE_SHAPE.is_match(redacted) {
        tokens.push(FLAG_DATE.to_string());
    }
    tokens
}

fn has_tracking_shape(text: &str) -> bool {
    TRACKING_SHAPE
        .find_iter(text)
        .any(|m| digit_count(m.as_str()) >= 4)
}

fn temporal_features(received_at: DateTime<Utc>) -> TemporalFeatures {
    let day_of_week = received_at.weekday().num_days_from_sunday();
    TemporalFeatures {
        day_of_week,
        hour_of_day: received_at.hour(),
        is_weekend: day_of_week == 0 || day_of_week == 6,
    }
}

/// Whether `token` belongs to the fixed anonymizer vocabulary.
pub fn is_known_token(token: &str) -> bool {
    let Some((prefix, word)) = token.split_once(':') else {
        return false;
    };
    match prefix {
        "has" => [FLAG_AMOUNT, FLAG_TRACKING_CODE, FLAG_DATE].contains(&token),
        "carrier" => CARRIERS.contains(&word),
        "merchant" => MERCHANTS.contains(&word),
        other => other
            .parse::<Category>()
            .ok()
            .is_some_and(|category| dictionary::keyword_weight(category, word).is_some()),
    }
}
