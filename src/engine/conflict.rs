use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn validate_interval(interval: &Interval) -> Result<(), EngineError> {
    if interval.start() < MIN_VALID_TIMESTAMP_MS || interval.end() > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if interval.duration_ms() > MAX_BOOKING_DURATION_MS as u64 {
        return Err(EngineError::LimitExceeded("booking too long"));
    }
    Ok(())
}

/// Upper-cased plate of ASCII letters, digits and dashes.
pub(crate) fn normalize_plate(plate: &str) -> Result<String, EngineError> {
    let plate = plate.trim();
    if plate.is_empty() {
        return Err(EngineError::InvalidInput("empty plate"));
    }
    if plate.len() > MAX_PLATE_LEN {
        return Err(EngineError::LimitExceeded("plate too long"));
    }
    if !plate.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(EngineError::InvalidInput("plate may only contain letters, digits and '-'"));
    }
    Ok(plate.to_ascii_uppercase())
}

/// Lower-cased e-mail with exactly one `@` and non-empty local and domain parts.
pub(crate) fn normalize_email(email: &str) -> Result<String, EngineError> {
    let email = email.trim();
    if email.len() > MAX_EMAIL_LEN {
        return Err(EngineError::LimitExceeded("e-mail too long"));
    }
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace) =>
        {
            Ok(email.to_lowercase())
        }
        _ => Err(EngineError::InvalidInput("malformed e-mail")),
    }
}

pub(crate) fn validate_text(text: &str, max: usize, what: &'static str) -> Result<(), EngineError> {
    if text.trim().is_empty() {
        return Err(EngineError::InvalidInput(what));
    }
    if text.len() > max {
        return Err(EngineError::LimitExceeded(what));
    }
    Ok(())
}

pub(crate) fn check_no_conflict(vs: &VehicleState, interval: &Interval) -> Result<(), EngineError> {
    if vs.bookings.is_occupied(interval) {
        metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
        return Err(EngineError::Conflict {
            plate: vs.plate.clone(),
            interval: *interval,
        });
    }
    Ok(())
}
