//! Common validation utilities.

use validator::ValidationError;

/// Smallest accepted radius for a circular area, in meters.
pub const MIN_RADIUS_METERS: f64 = 1.0;

/// Largest accepted radius for a circular area, in meters.
pub const MAX_RADIUS_METERS: f64 = 100_000.0;

/// Validates that a latitude value is within valid range (-90 to 90).
pub fn validate_latitude(lat: f64) -> Result<(), ValidationError> {
    if (-90.0..=90.0).contains(&lat) {
        Ok(())
    } else {
        let mut err = ValidationError::new("latitude_range");
        err.message = Some("Latitude must be between -90 and 90".into());
        Err(err)
    }
}

/// Validates that a longitude value is within valid range (-180 to 180).
pub fn validate_longitude(lon: f64) -> Result<(), ValidationError> {
    if (-180.0..=180.0).contains(&lon) {
        Ok(())
    } else {
        let mut err = ValidationError::new("longitude_range");
        err.message = Some("Longitude must be between -180 and 180".into());
        Err(err)
    }
}

/// Validates a circle radius in meters.
pub fn validate_radius_meters(radius: f64) -> Result<(), ValidationError> {
    if radius.is_finite() && (MIN_RADIUS_METERS..=MAX_RADIUS_METERS).contains(&radius) {
        Ok(())
    } else {
        let mut err = ValidationError::new("radius_range");
        err.message = Some("Radius must be between 1 and 100000 meters".into());
        Err(err)
    }
}

/// Renders the message carried by a validation error, falling back to its code.
pub fn message_of(err: &ValidationError) -> String {
    err.message
        .as_ref()
        .map(|m| m.to_string())
        .unwrap_or_else(|| err.code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::Fake;

    #[test]
    fn test_validate_latitude() {
        assert!(validate_latitude(0.0).is_ok());
        assert!(validate_latitude(90.0).is_ok());
        assert!(validate_latitude(-90.0).is_ok());
        assert!(validate_latitude(90.1).is_err());
        assert!(validate_latitude(-90.1).is_err());
    }

    #[test]
    fn test_validate_latitude_nan() {
        assert!(validate_latitude(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_latitude_error_message() {
        let err = validate_latitude(100.0).unwrap_err();
        assert_eq!(message_of(&err), "Latitude must be between -90 and 90");
    }

    #[test]
    fn test_validate_longitude() {
        assert!(validate_longitude(0.0).is_ok());
        assert!(validate_longitude(180.0).is_ok());
        assert!(validate_longitude(-180.0).is_ok());
        assert!(validate_longitude(180.1).is_err());
        assert!(validate_longitude(-180.1).is_err());
    }

    #[test]
    fn test_validate_longitude_random_in_range() {
        for _ in 0..50 {
            let lon: f64 = (-180.0..180.0).fake();
            assert!(validate_longitude(lon).is_ok());
        }
    }

    #[test]
    fn test_validate_radius_meters() {
        assert!(validate_radius_meters(1.0).is_ok());
        assert!(validate_radius_meters(500.0).is_ok());
        assert!(validate_radius_meters(100_000.0).is_ok());
        assert!(validate_radius_meters(0.0).is_err());
        assert!(validate_radius_meters(-10.0).is_err());
        assert!(validate_radius_meters(f64::INFINITY).is_err());
    }

    #[test]
    fn test_message_of_falls_back_to_code() {
        let err = ValidationError::new("custom_code");
        assert_eq!(message_of(&err), "custom_code");
    }
}
