//! Fixed control locators for the booking form
//!
//! Lists are ordered by preference; the first control the driver manages to click wins,
//! except consent boxes where every entry is tried.

use super::driver::ControlDescriptor;

/// Appointment-phase submit buttons
pub const APPOINTMENT_SUBMIT: &[&str] = &[
    "button[type='submit']",
    "input[type='submit']",
    "button:contains('Submit')",
    "button:contains('Continue')",
    "button:contains('Next')",
    ".submit-btn",
    "#submit",
    "#continue",
];

/// "Standard" appointment variant, selected when offered
pub const STANDARD_VARIANT: &[&str] = &[
    "input[value*='standard']",
    "input[type='radio'][value*='Standard']",
    "select option[value*='standard']",
    "[data-value*='standard']",
];

/// Terms, privacy and consent checkboxes
pub const CONSENT: &[&str] = &[
    "input[type='checkbox'][name*='terms']",
    "input[type='checkbox'][name*='agree']",
    "input[type='checkbox'][name*='accept']",
    "input[type='checkbox'][name*='condition']",
    "input[type='checkbox'][name*='privacy']",
    "input[type='checkbox'][id*='terms']",
    "input[type='checkbox'][id*='agree']",
    "input[type='checkbox'][id*='accept']",
];

/// Final booking submit buttons
pub const FINAL_SUBMIT: &[&str] = &[
    "button[type='submit']",
    "input[type='submit']",
    "button:contains('Submit')",
    "button:contains('Book')",
    "button:contains('Confirm')",
    "button:contains('Pay')",
    ".submit-btn",
    ".book-btn",
    "#submit",
    "#book",
    "#confirm",
];

/// URL fragments that mark a payment page
pub const PAYMENT_INDICATORS: &[&str] = &["payment", "pay", "checkout", "billing", "invoice"];

pub fn descriptors(locators: &[&str]) -> Vec<ControlDescriptor> {
    locators.iter().map(|l| ControlDescriptor::new(*l)).collect()
}

/// Whether `url` looks like a payment page
pub fn is_payment_url(url: &str) -> bool {
    let url = url.to_lowercase();
    PAYMENT_INDICATORS.iter().any(|indicator| url.contains(indicator))
}
