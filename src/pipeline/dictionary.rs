//! Keyword dictionaries and the known-domain registry.
//!
//! Tokens emitted by the anonymizer are drawn only from these tables, so no
//! token can ever carry message-specific content.

use crate::pipeline::types::Category;

/// Bonus for a sender domain registered to a category (or a carrier).
pub const DOMAIN_CATEGORY_BONUS: u32 = 30;

/// Bonus to `Order` for a known-merchant sender domain.
pub const MERCHANT_DOMAIN_BONUS: u32 = 25;

/// Bonus to `Invoice` for a PDF attachment.
pub const PDF_ATTACHMENT_BONUS: u32 = 3;

/// Tie-break bonus applied by the order/delivery disambiguation pass.
pub const DISAMBIGUATION_BONUS: u32 = 5;

/// Weight of a `carrier:*` token towards `Delivery`.
pub const CARRIER_TOKEN_WEIGHT: u32 = 5;

/// Weight of a `merchant:*` token towards `Order`.
pub const MERCHANT_TOKEN_WEIGHT: u32 = 4;

pub const FLAG_AMOUNT: &str = "has:amount";
pub const FLAG_TRACKING_CODE: &str = "has:tracking_code";
pub const FLAG_DATE: &str = "has:date";

/// Presence flags and the categories they feed.
pub const FLAG_WEIGHTS: &[(&str, Category, u32)] = &[
    (FLAG_AMOUNT, Category::Invoice, 5),
    (FLAG_TRACKING_CODE, Category::Delivery, 5),
    (FLAG_DATE, Category::Event, 1),
    (FLAG_DATE, Category::Task, 1),
];

const INVOICE: &[(&str, u32)] = &[
    ("factuur", 8),
    ("invoice", 8),
    ("factuurnummer", 9),
    ("rekening", 5),
    ("bill", 5),
    ("betaling", 4),
    ("payment", 4),
    ("betaalverzoek", 7),
    ("te betalen", 6),
    ("vervaldatum", 6),
    ("due date", 5),
    ("bedrag", 3),
    ("amount", 3),
    ("btw", 4),
    ("vat", 4),
    ("aanmaning", 8),
    ("herinnering betaling", 8),
];

const DELIVERY: &[(&str, u32)] = &[
    ("pakket", 7),
    ("package", 6),
    ("parcel", 7),
    ("zending", 6),
    ("shipment", 7),
    ("bezorging", 7),
    ("delivery", 6),
    ("bezorgd", 7),
    ("delivered", 6),
    ("onderweg", 6),
    ("verzonden", 6),
    ("shipped", 6),
    ("in transit", 7),
    ("out for delivery", 8),
    ("tracking", 7),
    ("track & trace", 8),
    ("track and trace", 8),
    ("verzending", 5),
    ("bezorger", 6),
    ("afhaalpunt", 6),
];

const ORDER: &[(&str, u32)] = &[
    ("bestelling", 7),
    ("order", 5),
    ("orderbevestiging", 9),
    ("order confirmation", 9),
    ("order confirmed", 9),
    ("bestelnummer", 8),
    ("ordernummer", 8),
    ("order number", 8),
    ("thank you for your order", 9),
    ("bedankt voor je bestelling", 9),
    ("bedankt voor uw bestelling", 9),
    ("aankoop", 5),
    ("purchase", 5),
    ("winkelwagen", 3),
];

const EVENT: &[(&str, u32)] = &[
    ("uitnodiging", 7),
    ("invitation", 7),
    ("afspraak", 6),
    ("appointment", 6),
    ("meeting", 5),
    ("vergadering", 6),
    ("agenda", 3),
    ("calendar", 4),
    ("webinar", 5),
    ("rsvp", 7),
    ("save the date", 8),
    ("locatie", 2),
    ("location", 2),
];

const TASK: &[(&str, u32)] = &[
    ("verzoek", 4),
    ("request", 3),
    ("actie", 3),
    ("action required", 6),
    ("actie vereist", 6),
    ("todo", 5),
    ("taak", 5),
    ("task", 5),
    ("deadline", 6),
    ("dringend", 5),
    ("urgent", 5),
    ("asap", 5),
    ("herinnering", 3),
    ("reminder", 3),
    ("graag", 1),
    ("please", 1),
];

const NEWSLETTER: &[(&str, u32)] = &[
    ("nieuwsbrief", 8),
    ("newsletter", 8),
    ("unsubscribe", 6),
    ("uitschrijven", 6),
    ("afmelden", 5),
    ("digest", 4),
    ("view in browser", 5),
    ("bekijk in je browser", 5),
    ("weekly update", 4),
];

const SPAM: &[(&str, u32)] = &[
    ("lottery", 8),
    ("loterij", 8),
    ("you have won", 9),
    ("u heeft gewonnen", 9),
    ("claim your prize", 9),
    ("free money", 9),
    ("inheritance", 7),
    ("erfenis", 7),
    ("viagra", 10),
    ("crypto giveaway", 9),
    ("act now", 5),
    ("limited time offer", 4),
];

const PERSONAL: &[(&str, u32)] = &[
    ("hoi", 3),
    ("hey", 2),
    ("groetjes", 5),
    ("liefs", 6),
    ("verjaardag", 4),
    ("birthday", 4),
    ("familie", 4),
    ("family", 4),
    ("etentje", 5),
    ("dinner", 3),
    ("miss you", 6),
    ("love you", 6),
];

/// Per-category keyword dictionaries with weights 1–10.
///
/// Matching is case-insensitive on whole words.
pub const KEYWORDS: &[(Category, &[(&str, u32)])] = &[
    (Category::Invoice, INVOICE),
    (Category::Delivery, DELIVERY),
    (Category::Order, ORDER),
    (Category::Event, EVENT),
    (Category::Task, TASK),
    (Category::Newsletter, NEWSLETTER),
    (Category::Spam, SPAM),
    (Category::Personal, PERSONAL),
];

/// Delivery keywords that only appear once goods are on their way.
pub const SHIPMENT_ONLY: &[&str] = &[
    "shipped",
    "verzonden",
    "onderweg",
    "in transit",
    "out for delivery",
    "track & trace",
    "track and trace",
    "tracking",
    "bezorger",
    "afhaalpunt",
];

/// Order keywords that only appear before anything ships.
pub const ORDER_ONLY: &[&str] = &[
    "orderbevestiging",
    "order confirmation",
    "order confirmed",
    "thank you for your order",
    "bedankt voor je bestelling",
    "bedankt voor uw bestelling",
];

/// Parcel carriers, canonical spelling.
pub const CARRIERS: &[&str] = &[
    "PostNL", "DHL", "DPD", "UPS", "GLS", "FedEx", "TNT", "Trunkrs", "bpost",
];

/// Known web shops, canonical spelling.
pub const MERCHANTS: &[&str] = &[
    "AliExpress",
    "Amazon",
    "Bol.com",
    "Coolblue",
    "Zalando",
    "Temu",
    "IKEA",
    "MediaMarkt",
    "Wehkamp",
    "Etsy",
    "eBay",
    "Shein",
];

/// What a registered sender domain tells us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainKind {
    /// Domain of a parcel carrier; implies `Delivery`.
    Carrier(&'static str),
    /// Domain of a web shop; implies `Order`.
    Merchant(&'static str),
    /// Domain bound to a category.
    Category(Category),
}

const DOMAINS: &[(&str, DomainKind)] = &[
    ("postnl.nl", DomainKind::Carrier("PostNL")),
    ("postnl.com", DomainKind::Carrier("PostNL")),
    ("dhl.com", DomainKind::Carrier("DHL")),
    ("dhl.nl", DomainKind::Carrier("DHL")),
    ("dhlparcel.nl", DomainKind::Carrier("DHL")),
    ("dpd.nl", DomainKind::Carrier("DPD")),
    ("dpd.com", DomainKind::Carrier("DPD")),
    ("ups.com", DomainKind::Carrier("UPS")),
    ("gls-group.eu", DomainKind::Carrier("GLS")),
    ("gls-info.nl", DomainKind::Carrier("GLS")),
    ("fedex.com", DomainKind::Carrier("FedEx")),
    ("tnt.com", DomainKind::Carrier("TNT")),
    ("trunkrs.nl", DomainKind::Carrier("Trunkrs")),
    ("bpost.be", DomainKind::Carrier("bpost")),
    ("aliexpress.com", DomainKind::Merchant("AliExpress")),
    ("amazon.com", DomainKind::Merchant("Amazon")),
    ("amazon.nl", DomainKind::Merchant("Amazon")),
    ("amazon.de", DomainKind::Merchant("Amazon")),
    ("bol.com", DomainKind::Merchant("Bol.com")),
    ("coolblue.nl", DomainKind::Merchant("Coolblue")),
    ("coolblue.be", DomainKind::Merchant("Coolblue")),
    ("zalando.nl", DomainKind::Merchant("Zalando")),
    ("zalando.be", DomainKind::Merchant("Zalando")),
    ("temu.com", DomainKind::Merchant("Temu")),
    ("ikea.com", DomainKind::Merchant("IKEA")),
    ("mediamarkt.nl", DomainKind::Merchant("MediaMarkt")),
    ("wehkamp.nl", DomainKind::Merchant("Wehkamp")),
    ("etsy.com", DomainKind::Merchant("Etsy")),
    ("ebay.com", DomainKind::Merchant("eBay")),
    ("shein.com", DomainKind::Merchant("Shein")),
    ("mollie.com", DomainKind::Category(Category::Invoice)),
    ("stripe.com", DomainKind::Category(Category::Invoice)),
    ("paypal.com", DomainKind::Category(Category::Invoice)),
    ("ing.nl", DomainKind::Category(Category::Invoice)),
    ("rabobank.nl", DomainKind::Category(Category::Invoice)),
    ("abnamro.nl", DomainKind::Category(Category::Invoice)),
    ("bunq.com", DomainKind::Category(Category::Invoice)),
    ("belastingdienst.nl", DomainKind::Category(Category::Invoice)),
    ("mailchimp.com", DomainKind::Category(Category::Newsletter)),
    ("mcsv.net", DomainKind::Category(Category::Newsletter)),
    ("sendgrid.net", DomainKind::Category(Category::Newsletter)),
    ("substack.com", DomainKind::Category(Category::Newsletter)),
    ("mailerlite.com", DomainKind::Category(Category::Newsletter)),
    ("eventbrite.com", DomainKind::Category(Category::Event)),
    ("meetup.com", DomainKind::Category(Category::Event)),
    ("calendly.com", DomainKind::Category(Category::Event)),
];

/// Look up a sender domain, matching registered domains and their subdomains.
///
/// `mail.aliexpress.com` resolves to the `aliexpress.com` entry.
pub fn lookup_domain(domain: &str) -> Option<DomainKind> {
    let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    DOMAINS.iter().find_map(|(registered, kind)| {
        let matches = domain == *registered
            || domain
                .strip_suffix(registered)
                .is_some_and(|prefix| prefix.ends_with('.'));
        matches.then_some(*kind)
    })
}

/// The category a registered domain implies, with its bonus.
pub fn domain_bonus(domain: &str) -> Option<(Category, u32)> {
    match lookup_domain(domain)? {
        DomainKind::Carrier(_) => Some((Category::Delivery, DOMAIN_CATEGORY_BONUS)),
        DomainKind::Category(category) => Some((category, DOMAIN_CATEGORY_BONUS)),
        DomainKind::Merchant(_) => Some((Category::Order, MERCHANT_DOMAIN_BONUS)),
    }
}

/// Weight of a `category:word` token, if the word is in that dictionary.
pub fn keyword_weight(category: Category, word: &str) -> Option<u32> {
    KEYWORDS
        .iter()
        .find(|(c, _)| *c == category)
        .and_then(|(_, words)| words.iter().find(|(w, _)| *w == word))
        .map(|(_, weight)| *weight)
}

/// Whether `needle` occurs in `haystack` on word boundaries.
///
/// Both sides are compared case-insensitively; `haystack` is expected to be
/// lowercased already.
pub fn contains_word(haystack: &str, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(&needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}
