//! Period Catalog
//!
//! Billing periods are derived, not stored by callers: a MONTHLY catalog is the
//! twelve months of a year, an ANNUAL catalog is a run of consecutive years.
//! `PeriodKey` is the validated `(period_type, year, month?)` triple used by
//! every other component.

use serde::{Deserialize, Serialize};

use crate::validation::{validate_year, ValidationError};

/// Default number of years shown in an ANNUAL catalog.
pub const DEFAULT_ANNUAL_SPAN: u32 = 6;

const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Billing cadence, matching database period_type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "period_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodType {
    Monthly,
    Annual,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Monthly => "MONTHLY",
            PeriodType::Annual => "ANNUAL",
        }
    }
}

impl std::fmt::Display for PeriodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated billing period identity.
///
/// `month` is `Some(1..=12)` for MONTHLY and always `None` for ANNUAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodKey {
    pub period_type: PeriodType,
    pub year: i32,
    pub month: Option<i32>,
}

impl PeriodKey {
    pub fn new(
        period_type: PeriodType,
        year: i32,
        month: Option<i32>,
    ) -> Result<Self, ValidationError> {
        validate_year(year)?;
        match (period_type, month) {
            (PeriodType::Monthly, None) => Err(ValidationError::MissingMonth),
            (PeriodType::Monthly, Some(m)) if !(1..=12).contains(&m) => {
                Err(ValidationError::InvalidMonth(m))
            }
            (PeriodType::Annual, Some(m)) => Err(ValidationError::UnexpectedMonth(m)),
            _ => Ok(Self {
                period_type,
                year,
                month,
            }),
        }
    }

    pub fn monthly(year: i32, month: i32) -> Result<Self, ValidationError> {
        Self::new(PeriodType::Monthly, year, Some(month))
    }

    pub fn annual(year: i32) -> Result<Self, ValidationError> {
        Self::new(PeriodType::Annual, year, None)
    }

    /// Catalog id of this period ("2025-03" or "2025")
    pub fn period_id(&self) -> String {
        match self.month {
            Some(m) => format!("{}-{:02}", self.year, m),
            None => self.year.to_string(),
        }
    }
}

/// One column of the status matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub id: String,
    pub period_type: PeriodType,
    pub year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<i32>,
    pub label: String,
}

impl Period {
    pub fn key(&self) -> PeriodKey {
        PeriodKey {
            period_type: self.period_type,
            year: self.year,
            month: self.month,
        }
    }
}

/// Twelve monthly periods for a year
pub fn monthly_periods(year: i32) -> Vec<Period> {
    MONTH_LABELS
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let month = i as i32 + 1;
            Period {
                id: format!("{}-{:02}", year, month),
                period_type: PeriodType::Monthly,
                year,
                month: Some(month),
                label: format!("{}/{}", name, year),
            }
        })
        .collect()
}

/// `count` consecutive annual periods starting at `start_year`
pub fn annual_periods(start_year: i32, count: u32) -> Vec<Period> {
    (0..count as i32)
        .map(|offset| {
            let year = start_year + offset;
            Period {
                id: year.to_string(),
                period_type: PeriodType::Annual,
                year,
                month: None,
                label: year.to_string(),
            }
        })
        .collect()
}

/// Full catalog for a period type
pub fn catalog(period_type: PeriodType, year: i32, annual_span: u32) -> Vec<Period> {
    match period_type {
        PeriodType::Monthly => monthly_periods(year),
        PeriodType::Annual => annual_periods(year, annual_span.max(1)),
    }
}

/// Every period key a yearly batch touches (12 months, or the single year)
pub fn keys_for_year(period_type: PeriodType, year: i32) -> Vec<PeriodKey> {
    match period_type {
        PeriodType::Monthly => (1..=12)
            .map(|month| PeriodKey {
                period_type,
                year,
                month: Some(month),
            })
            .collect(),
        PeriodType::Annual => vec![PeriodKey {
            period_type,
            year,
            month: None,
        }],
    }
}
