//! # Validation Helpers
//!
//! Field-level checks shared by services before anything is written.

use crate::error::ValidationError;
use crate::types::{VolumeUnit, Volumes};

/// Tolerance for percentage cuts adding up to 100.
const PERCENT_TOLERANCE: f64 = 0.01;

pub fn validate_required(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// ISO 4217 style code: three ASCII uppercase letters.
pub fn validate_currency_code(code: &str) -> Result<(), ValidationError> {
    validate_upper_alpha("currency", code, 3)
}

/// ISO 3166 alpha-2 country code.
pub fn validate_country_code(code: &str) -> Result<(), ValidationError> {
    validate_upper_alpha("country_code", code, 2)
}

fn validate_upper_alpha(field: &str, code: &str, len: usize) -> Result<(), ValidationError> {
    if code.len() != len || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: format!("expected {} uppercase letters, got '{}'", len, code),
        });
    }
    Ok(())
}

/// Site codes become document-number prefixes: 2-10 ASCII alphanumerics.
pub fn validate_site_code(code: &str) -> Result<(), ValidationError> {
    validate_required("site_code", code)?;
    if !(2..=10).contains(&code.len()) || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: "site_code".to_string(),
            reason: "2-10 letters or digits".to_string(),
        });
    }
    Ok(())
}

pub fn validate_first_day_of_month(day: u32) -> Result<(), ValidationError> {
    if !(1..=31).contains(&day) {
        return Err(ValidationError::OutOfRange {
            field: "first_day_of_month".to_string(),
            min: 1,
            max: 31,
        });
    }
    Ok(())
}

pub fn validate_positive_quantity(field: &str, quantity_milli: i64) -> Result<(), ValidationError> {
    if quantity_milli <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Cuts must be non-negative; percentage cuts must add up to 100.
pub fn validate_volumes(volumes: &Volumes) -> Result<(), ValidationError> {
    for (field, value) in [
        ("volumes.oil", volumes.oil),
        ("volumes.water", volumes.water),
        ("volumes.solid", volumes.solid),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ValidationError::InvalidFormat {
                field: field.to_string(),
                reason: "must be a non-negative number".to_string(),
            });
        }
    }

    if volumes.unit == VolumeUnit::Percentage && (volumes.total() - 100.0).abs() > PERCENT_TOLERANCE
    {
        return Err(ValidationError::InvalidFormat {
            field: "volumes".to_string(),
            reason: format!("percentage cuts add up to {}, expected 100", volumes.total()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert!(validate_currency_code("CAD").is_ok());
        assert!(validate_currency_code("cad").is_err());
        assert!(validate_currency_code("CA").is_err());
        assert!(validate_country_code("US").is_ok());
        assert!(validate_country_code("USA").is_err());
    }

    #[test]
    fn test_site_code() {
        assert!(validate_site_code("LF01").is_ok());
        assert!(matches!(
            validate_site_code(" "),
            Err(ValidationError::Required { .. })
        ));
        assert!(validate_site_code("LF-01").is_err());
    }

    #[test]
    fn test_first_day_of_month_range() {
        assert!(validate_first_day_of_month(1).is_ok());
        assert!(validate_first_day_of_month(31).is_ok());
        assert!(validate_first_day_of_month(0).is_err());
        assert!(validate_first_day_of_month(32).is_err());
    }

    #[test]
    fn test_volumes() {
        assert!(validate_volumes(&Volumes::fixed(1.0, 0.0, 2.5)).is_ok());
        assert!(validate_volumes(&Volumes::fixed(-1.0, 0.0, 0.0)).is_err());

        let mut pct = Volumes::fixed(20.0, 70.0, 10.0);
        pct.unit = VolumeUnit::Percentage;
        assert!(validate_volumes(&pct).is_ok());
        pct.solid = 5.0;
        assert!(validate_volumes(&pct).is_err());
    }

    #[test]
    fn test_positive_quantity() {
        assert!(validate_positive_quantity("quantity", 1).is_ok());
        assert!(validate_positive_quantity("quantity", 0).is_err());
    }
}
