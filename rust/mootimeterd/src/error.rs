use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MtmError {
    /// Unresolvable or non-conforming tool handler, or a missing template.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    NotFound(String),

    #[error("invalid {}", summarize_fields(.0))]
    Validation(Vec<FieldError>),

    /// Tool cleanup refused or failed; nothing was removed.
    #[error("Something went wrong while deleting the page. Please contact your support.")]
    DeleteFailed { pageid: i64 },

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type MtmResult<T> = Result<T, MtmError>;

fn summarize_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl MtmError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        MtmError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn page_not_found(pageid: i64) -> Self {
        MtmError::NotFound(format!("page {} not found", pageid))
    }

    pub fn page_not_in_instance() -> Self {
        MtmError::NotFound("The provided pageid is not part of Mootimeter instance.".to_string())
    }

    pub fn code(&self) -> &'static str {
        match self {
            MtmError::Configuration(_) => "configuration_error",
            MtmError::NotFound(_) => "not_found",
            MtmError::Validation(_) => "validation_failed",
            MtmError::DeleteFailed { .. } => "delete_failed",
            MtmError::Db(_) => "db_query_failed",
            MtmError::Internal(_) => "internal",
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            MtmError::Validation(fields) => Some(json!({ "fields": fields })),
            MtmError::DeleteFailed { pageid } => Some(json!({ "pageid": pageid })),
            _ => None,
        }
    }
}
