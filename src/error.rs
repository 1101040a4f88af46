use crate::database::DbError;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Database error")]
    Store(#[from] DbError),

    #[error("Template error")]
    Template(#[from] tera::Error),

    #[error("Password hashing error")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("Session error")]
    Session(String),
}

impl AppError {
    /// Errors the visitor can fix by resubmitting a form.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_)
                | AppError::Conflict(_)
                | AppError::Auth(_)
                | AppError::NotFound(_)
        )
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Store(_)
            | AppError::Template(_)
            | AppError::Hash(_)
            | AppError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Store(err) => log::error!("{}: {:?}", self, err),
            AppError::Template(err) => log::error!("{}: {:?}", self, err),
            AppError::Hash(err) => log::error!("{}: {:?}", self, err),
            AppError::Session(err) => log::error!("{}: {}", self, err),
            _ => log::debug!("{:?}", self),
        }
        // Internal details stay in the log.
        HttpResponse::build(self.status_code())
            .content_type("text/plain; charset=utf-8")
            .body(self.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_hide_details() {
        let err = AppError::Store(DbError::TicketNumberTaken(123456));
        assert!(!err.is_recoverable());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Database error");
    }

    #[test]
    fn form_errors_are_recoverable() {
        assert!(AppError::Validation("Missing form data: seat".to_owned()).is_recoverable());
        assert!(AppError::Auth("Please log in.".to_owned()).is_recoverable());
        assert_eq!(
            AppError::Conflict("taken".to_owned()).status_code(),
            StatusCode::CONFLICT
        );
    }
}
