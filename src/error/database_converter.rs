use crate::error::AppError;
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};

/// Utility for converting database errors to structured AppError variants.
///
/// Constraint names follow the postgres defaults used by the migrations
/// (`<table>_<column>_key`, `<table>_<column>_fkey`), which is enough to
/// recover the offending table and column without parsing the message text.
pub struct DatabaseErrorConverter;

impl DatabaseErrorConverter {
    /// Converts a Diesel error to an appropriate AppError variant.
    pub fn convert_diesel_error(error: DieselError, operation: &str) -> AppError {
        match error {
            DieselError::DatabaseError(kind, info) => {
                Self::convert_database_error(kind, info.as_ref(), operation)
            }
            DieselError::NotFound => AppError::NotFound {
                entity: "resource".to_string(),
                field: "id".to_string(),
                value: "unknown".to_string(),
            },
            other => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::from(other),
            },
        }
    }

    fn convert_database_error(
        kind: DatabaseErrorKind,
        info: &(dyn DatabaseErrorInformation + Send + Sync),
        operation: &str,
    ) -> AppError {
        let split = info
            .constraint_name()
            .and_then(|name| Self::split_constraint_name(name, info.table_name()));

        match (kind, split) {
            (DatabaseErrorKind::UniqueViolation, Some((entity, field))) => AppError::Duplicate {
                entity,
                field,
                value: info.details().unwrap_or_default().to_string(),
            },
            (DatabaseErrorKind::ForeignKeyViolation, Some((entity, field))) => {
                AppError::Validation {
                    field,
                    reason: format!("Invalid reference from {}", entity),
                }
            }
            (DatabaseErrorKind::NotNullViolation, _) => AppError::Validation {
                field: info.column_name().unwrap_or("unknown").to_string(),
                reason: "Field is required".to_string(),
            },
            _ => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::msg(format!("Database error: {}", info.message())),
            },
        }
    }

    /// Splits `action_parameters_action_id_fkey` into (`action_parameters`, `action_id`).
    fn split_constraint_name(constraint: &str, table: Option<&str>) -> Option<(String, String)> {
        let stem = constraint
            .strip_suffix("_fkey")
            .or_else(|| constraint.strip_suffix("_key"))?;

        match table {
            Some(table) => {
                let column = stem.strip_prefix(table)?.strip_prefix('_')?;
                Some((table.to_string(), column.to_string()))
            }
            None => {
                let (entity, field) = stem.split_once('_')?;
                Some((entity.to_string(), field.to_string()))
            }
        }
    }
}
