use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use thiserror::Error;

use crate::types::Field;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L}\s'’\-]+$").expect("name pattern compiles"));
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{4})$").expect("date pattern compiles")
});

pub const MIN_NAME_LEN: usize = 2;
pub const MIN_YEAR: i32 = 1900;
pub const MAX_YEARS_AHEAD: i32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("value is empty")]
    Empty,
    #[error("value is shorter than {min} characters")]
    TooShort { min: usize },
    #[error("name contains characters other than letters, spaces, hyphens or apostrophes")]
    BadNameChars,
    #[error("name has no letters")]
    NoLetters,
    #[error("name looks like a date")]
    NameIsDate,
    #[error("date must look like DD.MM.YYYY")]
    DateFormat,
    #[error("no such calendar date")]
    NoSuchDate,
    #[error("year must be between {min} and {max}")]
    YearOutOfRange { min: i32, max: i32 },
}

impl ValidationError {
    /// Short explanation shown to the user above the repeated prompt.
    pub fn user_message(&self) -> String {
        match self {
            Self::Empty => "Пустой ответ. Попробуйте ещё раз.".to_string(),
            Self::TooShort { min } => {
                format!("Слишком коротко — нужно хотя бы {min} символов.")
            }
            Self::BadNameChars | Self::NoLetters => {
                "Имя может содержать только буквы, пробелы, дефисы и апострофы.".to_string()
            }
            Self::NameIsDate => "Похоже, это дата, а не имя.".to_string(),
            Self::DateFormat => "Дата должна быть в формате ДД.ММ.ГГГГ, например 07.03.1991."
                .to_string(),
            Self::NoSuchDate => "Такой даты не существует. Проверьте день и месяц.".to_string(),
            Self::YearOutOfRange { min, max } => {
                format!("Год должен быть от {min} до {max}.")
            }
        }
    }
}

/// Minimum lengths for the free-text fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLimits {
    pub participants: usize,
    pub backstory: usize,
    pub question: usize,
}

impl Default for FieldLimits {
    fn default() -> Self {
        Self {
            participants: 2,
            backstory: 20,
            question: 10,
        }
    }
}

/// Validate `raw` for `field` and return the normalized value to store.
pub fn validate_field(
    field: Field,
    raw: &str,
    limits: &FieldLimits,
    today: NaiveDate,
) -> Result<String, ValidationError> {
    match field {
        Field::Name => validate_name(raw),
        Field::BirthDate => validate_date(raw, today.year()).map(|d| d.format("%d.%m.%Y").to_string()),
        Field::Participants => validate_text(raw, limits.participants),
        Field::Backstory => validate_text(raw, limits.backstory),
        Field::Question => validate_text(raw, limits.question),
    }
}

pub fn validate_name(raw: &str) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationError::Empty);
    }
    if DATE_RE.is_match(name) {
        return Err(ValidationError::NameIsDate);
    }
    if name.chars().count() < MIN_NAME_LEN {
        return Err(ValidationError::TooShort { min: MIN_NAME_LEN });
    }
    if !NAME_RE.is_match(name) {
        return Err(ValidationError::BadNameChars);
    }
    if !name.chars().any(char::is_alphabetic) {
        return Err(ValidationError::NoLetters);
    }
    Ok(collapse_spaces(name))
}

pub fn validate_date(raw: &str, current_year: i32) -> Result<NaiveDate, ValidationError> {
    let raw = raw.trim();
    let caps = DATE_RE.captures(raw).ok_or(ValidationError::DateFormat)?;
    let part = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or_default();
    let (Ok(day), Ok(month), Ok(year)) = (
        part(1).parse::<u32>(),
        part(2).parse::<u32>(),
        part(3).parse::<i32>(),
    ) else {
        return Err(ValidationError::DateFormat);
    };

    let max_year = current_year + MAX_YEARS_AHEAD;
    if !(MIN_YEAR..=max_year).contains(&year) {
        return Err(ValidationError::YearOutOfRange {
            min: MIN_YEAR,
            max: max_year,
        });
    }
    NaiveDate::from_ymd_opt(year, month, day).ok_or(ValidationError::NoSuchDate)
}

pub fn validate_text(raw: &str, min_len: usize) -> Result<String, ValidationError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ValidationError::Empty);
    }
    if text.chars().count() < min_len {
        return Err(ValidationError::TooShort { min: min_len });
    }
    Ok(text.to_string())
}

fn collapse_spaces(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
