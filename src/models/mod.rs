mod lease;
mod listing;
mod payment;
mod person;
mod rental_request;

pub use lease::*;
pub use listing::*;
pub use payment::*;
pub use person::*;
pub use rental_request::*;

use rust_decimal::Decimal;
use validator::{Validate, ValidationError, ValidationErrors};

/// Request DTOs run their derive rules plus checks the derive can't express
/// (money amounts, postal codes, dates relative to today).
pub trait Checked: Validate {
    fn extra_checks(&self, _errors: &mut ValidationErrors) {}

    fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = match self.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };
        self.extra_checks(&mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn field_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Reject negative amounts, and zero as well unless `allow_zero`
pub(crate) fn check_amount(
    errors: &mut ValidationErrors,
    field: &'static str,
    value: Option<&Decimal>,
    allow_zero: bool,
    message: &'static str,
) {
    let Some(value) = value else { return };
    let ok = if allow_zero {
        value >= &Decimal::ZERO
    } else {
        value > &Decimal::ZERO
    };
    if !ok {
        errors.add(field, field_error("range", message));
    }
}

pub(crate) fn check_postal_code(errors: &mut ValidationErrors, postal_code: &str) {
    if postal_code.len() != 5 || !postal_code.chars().all(|c| c.is_ascii_digit()) {
        errors.add("postal_code", field_error("pattern", "postal code must contain 5 digits"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_check_amount() {
        let mut errors = ValidationErrors::new();
        check_amount(&mut errors, "charges", Some(&dec!(0)), true, "x");
        check_amount(&mut errors, "charges", None, false, "x");
        assert!(errors.is_empty());

        check_amount(&mut errors, "monthly_rent", Some(&dec!(0)), false, "x");
        check_amount(&mut errors, "deposit", Some(&dec!(-1)), true, "x");
        let fields = errors.field_errors();
        assert!(fields.contains_key("monthly_rent"));
        assert!(fields.contains_key("deposit"));
    }

    #[test]
    fn test_check_postal_code() {
        let mut errors = ValidationErrors::new();
        check_postal_code(&mut errors, "20000");
        assert!(errors.is_empty());
        check_postal_code(&mut errors, "2000A");
        assert!(!errors.is_empty());
    }
}
