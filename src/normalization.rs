//! Canonicalization and format checks for raw lead form fields.
//!
//! The checks here are a coarse client-side pre-filter. They accept plenty of
//! malformed input; correctness is settled by the backend and by whoever
//! follows up on the lead.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

static PHONE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9()\-]{10,}$").expect("phone pattern is valid"));

/// Human-readable operator names and synonyms mapped to canonical ids.
/// Every canonical id also maps to itself.
static OPERATOR_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        // Display names
        ("Amil", "amil"),
        ("Bradesco", "bradesco"),
        ("Bradesco Saúde", "bradesco"),
        ("SulAmérica", "sulamerica"),
        ("SulAmerica", "sulamerica"),
        ("Sul América", "sulamerica"),
        ("Porto Seguro", "porto_seguro"),
        ("Unimed", "unimed"),
        ("Hapvida", "hapvida"),
        ("NotreDame Intermédica", "notredame"),
        ("NotreDame", "notredame"),
        ("Prevent Senior", "prevent_senior"),
        ("Golden Cross", "golden_cross"),
        ("Care Plus", "care_plus"),
        ("Omint", "omint"),
        // Synonyms for the general contact form
        ("principal", "main"),
        ("geral", "main"),
        ("Geral", "main"),
        // Canonical ids
        ("amil", "amil"),
        ("bradesco", "bradesco"),
        ("sulamerica", "sulamerica"),
        ("porto_seguro", "porto_seguro"),
        ("unimed", "unimed"),
        ("hapvida", "hapvida"),
        ("notredame", "notredame"),
        ("prevent_senior", "prevent_senior"),
        ("golden_cross", "golden_cross"),
        ("care_plus", "care_plus"),
        ("omint", "omint"),
        ("main", "main"),
    ])
});

/// Map a free-form operator name to its canonical snake_case id.
///
/// Unknown names are trimmed and lower-cased, then inner whitespace runs are
/// collapsed to `_`; leading or trailing blanks never become underscores. The
/// transformed value is looked up once more, which keeps the function
/// idempotent for inputs like `"Principal"`.
pub fn normalize_operator(raw: &str) -> String {
    if let Some(id) = OPERATOR_ALIASES.get(raw) {
        return (*id).to_string();
    }

    let transformed = raw
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");

    match OPERATOR_ALIASES.get(transformed.as_str()) {
        Some(id) => (*id).to_string(),
        None => transformed,
    }
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

pub fn is_valid_phone(phone: &str) -> bool {
    let compact: String = phone.chars().filter(|c| !c.is_whitespace()).collect();
    PHONE_REGEX.is_match(&compact)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn normalize_phone(phone: &str) -> String {
    phone.trim().to_string()
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_string()
}

/// Canonical ids known to the alias table, sorted.
pub fn known_operators() -> Vec<&'static str> {
    let mut ids: Vec<&'static str> = OPERATOR_ALIASES.values().copied().collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
