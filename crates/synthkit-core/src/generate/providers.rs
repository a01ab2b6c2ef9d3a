//! # Realistic Value Providers
//!
//! Columns may name a `realistic_rule` ("email", "city", "company_name", ...).
//! The generator asks a `RealisticValueProvider` for a value; an unknown rule
//! yields `None` and the generator falls back to random text. The default
//! provider is backed by the `fake` crate and draws all randomness from the
//! caller's RNG, so realistic columns stay reproducible for a fixed seed.

use fake::faker::address::en::*;
use fake::faker::company::en::*;
use fake::faker::internet::en::*;
use fake::faker::lorem::en::*;
use fake::faker::name::en::*;
use fake::faker::phone_number::en::*;
use fake::Fake;
use rand::rngs::StdRng;
use rand::Rng;

/// Source of realistic string values for a named rule.
///
/// Implementations are shared across worker threads and must derive all
/// randomness from `rng`.
pub trait RealisticValueProvider: Send + Sync {
    fn realistic_value(&self, rule: &str, rng: &mut StdRng) -> Option<String>;
}

/// Provider backed by the `fake` crate's English locale.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakerProvider;

/// Rule names understood by `FakerProvider`.
pub const FAKER_RULES: &[&str] = &[
    "first_name",
    "last_name",
    "full_name",
    "username",
    "email",
    "phone",
    "street_address",
    "city",
    "state",
    "zip_code",
    "country",
    "country_code",
    "company_name",
    "job_title",
    "industry",
    "url",
    "domain_name",
    "ip_address",
    "user_agent",
    "word",
    "sentence",
    "paragraph",
    "title",
    "color",
    "currency_code",
    "status",
];

impl RealisticValueProvider for FakerProvider {
    fn realistic_value(&self, rule: &str, rng: &mut StdRng) -> Option<String> {
        let value: String = match rule.to_ascii_lowercase().as_str() {
            // === Identity ===
            "first_name" => FirstName().fake_with_rng(rng),
            "last_name" => LastName().fake_with_rng(rng),
            "full_name" | "name" => Name().fake_with_rng(rng),
            "username" => Username().fake_with_rng(rng),

            // === Contact ===
            "email" => SafeEmail().fake_with_rng(rng),
            "phone" => PhoneNumber().fake_with_rng(rng),

            // === Address ===
            "street_address" => {
                let number: u16 = rng.random_range(1..9999);
                let street: String = StreetName().fake_with_rng(rng);
                format!("{} {}", number, street)
            }
            "city" => CityName().fake_with_rng(rng),
            "state" => StateName().fake_with_rng(rng),
            "zip_code" | "postal_code" => ZipCode().fake_with_rng(rng),
            "country" => CountryName().fake_with_rng(rng),
            "country_code" => CountryCode().fake_with_rng(rng),

            // === Company ===
            "company_name" | "company" => CompanyName().fake_with_rng(rng),
            "job_title" => Profession().fake_with_rng(rng),
            "industry" => Industry().fake_with_rng(rng),

            // === Internet ===
            "url" => {
                let word: String = Word().fake_with_rng(rng);
                let suffix: String = DomainSuffix().fake_with_rng(rng);
                format!("https://{}.{}", word, suffix)
            }
            "domain_name" => FreeEmailProvider().fake_with_rng(rng),
            "ip_address" => IPv4().fake_with_rng(rng),
            "user_agent" => UserAgent().fake_with_rng(rng),

            // === Content ===
            "word" => Word().fake_with_rng(rng),
            "sentence" => Sentence(4..10).fake_with_rng(rng),
            "paragraph" => {
                let sentences: Vec<String> = Sentences(2..4).fake_with_rng(rng);
                sentences.join(" ")
            }
            "title" => {
                let words: Vec<String> = Words(2..5).fake_with_rng(rng);
                capitalize(&words.join(" "))
            }

            // === Lookups ===
            "color" => pick(
                rng,
                &["red", "blue", "green", "yellow", "purple", "orange", "black", "white"],
            ),
            "currency_code" => pick(rng, &["USD", "EUR", "GBP", "JPY", "CAD", "AUD", "CHF"]),
            "status" => pick(rng, &["active", "pending", "inactive", "archived"]),

            _ => return None,
        };
        Some(value)
    }
}

fn pick(rng: &mut StdRng, options: &[&'static str]) -> String {
    options[rng.random_range(0..options.len())].to_string()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(c) => c.to_uppercase().to_string() + chars.as_str(),
    }
}

/// Random ASCII alphanumeric string of `len` characters.
pub fn random_alphanumeric(rng: &mut impl Rng, len: usize) -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    (0..len)
        .map(|_| CHARS[rng.random_range(0..CHARS.len())] as char)
        .collect()
}

/// A few words of lorem text.
pub fn lorem_text(rng: &mut StdRng) -> String {
    Sentence(3..8).fake_with_rng(rng)
}

/// Truncate to at most `max_chars` characters, respecting char boundaries.
pub fn truncate_chars(s: String, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s,
    }
}
