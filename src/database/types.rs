// src/database/types.rs
use crate::errors::ValidationError;
use crate::models::Mdn;

/// MDN as stored in `BIGINT` columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(transparent)]
pub struct DbMdn(pub i64);

impl From<Mdn> for DbMdn {
    fn from(mdn: Mdn) -> Self {
        // At most 15 digits, always fits
        Self(mdn.value() as i64)
    }
}

impl TryFrom<DbMdn> for Mdn {
    type Error = ValidationError;

    fn try_from(value: DbMdn) -> Result<Self, Self::Error> {
        let raw = u64::try_from(value.0)
            .map_err(|_| ValidationError::InvalidMdn(value.0.to_string()))?;
        Mdn::try_from(raw)
    }
}

/// Convert an unsigned identifier into its `BIGINT` column value
pub(crate) fn signed(field: &'static str, value: u64) -> Result<i64, ValidationError> {
    i64::try_from(value).map_err(|_| ValidationError::OutOfRange {
        field,
        value: value.to_string(),
    })
}

/// Convert a signed column back into the unsigned domain type
pub(crate) fn unsigned<S, T>(field: &'static str, value: S) -> Result<T, ValidationError>
where
    S: Copy + ToString,
    T: TryFrom<S>,
{
    T::try_from(value).map_err(|_| ValidationError::OutOfRange {
        field,
        value: value.to_string(),
    })
}
