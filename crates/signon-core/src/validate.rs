//! Field validation shared by the flow reducer and the CLI prompts.

use std::sync::OnceLock;

use regex::Regex;

/// Minimum password length the provider accepts for email accounts.
pub const MIN_PASSWORD_LEN: usize = 6;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("email pattern is valid")
    })
}

/// Returns true when `email` looks like a deliverable address.
pub fn is_well_formed_email(email: &str) -> bool {
    email_pattern().is_match(email)
}

/// Returns true when `password` meets the provider minimum length.
///
/// Counted in characters, not bytes, so multibyte passwords are not
/// penalized.
pub fn password_meets_minimum(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

/// Returns true when a phone number has any content worth submitting.
/// Format checking is left to the provider.
pub fn phone_number_present(phone_number: &str) -> bool {
    !phone_number.trim().is_empty()
}
