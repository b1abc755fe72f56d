use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::fmt;

pub const USER_ID_MAX_LEN: usize = 128;
pub const EXTERNAL_REF_MAX_LEN: usize = 255;
pub const CURRENCY_MAX_LEN: usize = 10;
pub const HISTORY_MIN_DAYS: i64 = 1;
pub const HISTORY_MAX_DAYS: i64 = 365;
pub const BACKFILL_MAX_DAYS: i64 = 366;
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Fractional digits an amount may carry; the store columns are NUMERIC(20, 8).
pub const AMOUNT_MAX_SCALE: i64 = 8;
pub const AMOUNT_MAX_INTEGER_DIGITS: u32 = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_user_id(user_id: &str) -> ValidationResult {
    validate_required("user_id", user_id)?;
    validate_max_len("user_id", user_id, USER_ID_MAX_LEN)?;

    if user_id != user_id.trim() || user_id.chars().any(char::is_control) {
        return Err(ValidationError::new(
            "user_id",
            "must not contain surrounding whitespace or control characters",
        ));
    }

    Ok(())
}

pub fn validate_external_ref(reference: &str) -> ValidationResult {
    validate_required("external_payment_ref", reference)?;
    validate_max_len("external_payment_ref", reference, EXTERNAL_REF_MAX_LEN)
}

pub fn validate_currency(currency: &str) -> ValidationResult {
    let currency = sanitize_string(currency);
    validate_required("currency", &currency)?;
    validate_max_len("currency", &currency, CURRENCY_MAX_LEN)?;

    if !currency
        .chars()
        .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit())
    {
        return Err(ValidationError::new(
            "currency",
            "must contain only uppercase letters and digits",
        ));
    }

    Ok(())
}

pub fn validate_positive_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    validate_amount_precision("amount", amount)
}

/// Rejects amounts the ledger cannot store exactly. Trailing zeros beyond the
/// scale are fine; any other extra digit would be rounded away by the store.
pub fn validate_amount_precision(field: &'static str, amount: &BigDecimal) -> ValidationResult {
    if amount.with_scale(AMOUNT_MAX_SCALE) != *amount {
        return Err(ValidationError::new(
            field,
            format!("must have at most {} decimal places", AMOUNT_MAX_SCALE),
        ));
    }

    let limit = BigDecimal::from(10u64.pow(AMOUNT_MAX_INTEGER_DIGITS));
    if amount.abs() >= limit {
        return Err(ValidationError::new(
            field,
            format!("must be below {}", limit),
        ));
    }

    Ok(())
}

pub fn validate_history_days(days: i64) -> ValidationResult {
    if !(HISTORY_MIN_DAYS..=HISTORY_MAX_DAYS).contains(&days) {
        return Err(ValidationError::new(
            "days",
            format!(
                "must be a number between {} and {}",
                HISTORY_MIN_DAYS, HISTORY_MAX_DAYS
            ),
        ));
    }

    Ok(())
}

pub fn validate_dice_face(field: &'static str, face: i16) -> ValidationResult {
    if !(1..=6).contains(&face) {
        return Err(ValidationError::new(field, "must be between 1 and 6"));
    }

    Ok(())
}

pub fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| ValidationError::new(field, "invalid date format, use YYYY-MM-DD"))
}

pub fn validate_not_future(field: &'static str, date: NaiveDate, today: NaiveDate) -> ValidationResult {
    if date > today {
        return Err(ValidationError::new(
            field,
            format!("must not be after {}", today),
        ));
    }

    Ok(())
}
