//! Property-based tests for recipient normalization
//!
//! These tests verify that formatting noise never changes the identity of a
//! recipient, and that the country-code rule only touches bare domestic
//! numbers.

use courier_core::{parse_recipient_list, AddressingConfig, RecipientNormalizer};
use proptest::prelude::*;

/// Generate a digit string of plausible phone-number length
fn arb_digits() -> impl Strategy<Value = String> {
    prop::string::string_regex(r"[0-9]{1,15}").unwrap()
}

/// Generate formatting noise that users paste around numbers
fn arb_noise() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(prop::string::string_regex(r"[ +().\-/@]{0,3}").unwrap(), 16)
}

/// Interleave noise between the digits of `digits`
fn decorate(digits: &str, noise: &[String]) -> String {
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        out.push_str(&noise[i % noise.len()]);
        out.push(c);
    }
    out.push_str(&noise[noise.len() - 1]);
    out
}

proptest! {
    /// Property: raw strings differing only in punctuation normalize identically
    #[test]
    fn punctuation_does_not_change_identity(digits in arb_digits(), noise in arb_noise()) {
        let normalizer = RecipientNormalizer::default();
        let plain = normalizer.normalize(&digits).unwrap();
        let decorated = normalizer.normalize(&decorate(&digits, &noise)).unwrap();
        prop_assert_eq!(plain, decorated);
    }

    /// Property: normalized output is digits only and carries the address suffix
    #[test]
    fn output_is_well_formed(digits in arb_digits(), noise in arb_noise()) {
        let normalizer = RecipientNormalizer::default();
        let recipient = normalizer.normalize(&decorate(&digits, &noise)).unwrap();
        prop_assert!(recipient.digits().chars().all(|c| c.is_ascii_digit()));
        prop_assert!(recipient.address().starts_with(recipient.digits()));
        prop_assert!(recipient.address().ends_with("@s.whatsapp.net"));
    }

    /// Property: only numbers of exactly the domestic length gain a prefix
    #[test]
    fn country_code_applies_to_domestic_length_only(digits in arb_digits()) {
        let normalizer = RecipientNormalizer::default();
        let recipient = normalizer.normalize(&digits).unwrap();
        if digits.len() == 10 {
            prop_assert_eq!(recipient.digits(), format!("91{}", digits));
        } else {
            prop_assert_eq!(recipient.digits(), digits.as_str());
        }
    }

    /// Property: normalizing an already-normalized address is a no-op
    #[test]
    fn normalization_is_idempotent(digits in arb_digits()) {
        let normalizer = RecipientNormalizer::default();
        let once = normalizer.normalize(&digits).unwrap();
        let twice = normalizer.normalize(once.address()).unwrap();
        prop_assert_eq!(once, twice);
    }

    /// Property: list parsing preserves order and drops blanks
    #[test]
    fn list_parsing_preserves_entries(entries in prop::collection::vec(arb_digits(), 0..20)) {
        let joined = entries.join(",\n ; ");
        prop_assert_eq!(parse_recipient_list(&joined), entries);
    }
}

#[test]
fn test_custom_addressing_rules() {
    let normalizer = RecipientNormalizer::new(AddressingConfig {
        default_country_code: "1".to_string(),
        domestic_number_length: 10,
        address_suffix: "@c.example".to_string(),
    });

    let recipient = normalizer.normalize("(415) 555-0100").unwrap();
    assert_eq!(recipient.digits(), "14155550100");
    assert_eq!(recipient.address(), "14155550100@c.example");
}
