use mealkit_core::StoreError;

/// Classifies a driver error. Constraint violations (SQLSTATE class 23) are
/// integrity problems the caller can act on; everything else is infrastructure
/// and only safe to retry as a whole attempt.
pub(crate) fn db_err(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().is_some_and(|code| code.starts_with("23")) {
            return StoreError::Integrity(db.message().to_string());
        }
    }
    StoreError::Infrastructure(Box::new(err))
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

/// A stored enum column held a value outside its domain.
pub(crate) fn corrupt_column(column: &str, value: &str) -> StoreError {
    StoreError::Integrity(format!("unexpected {} value in storage: {}", column, value))
}
