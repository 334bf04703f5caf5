use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{CoreError, ErrorCode};

/// Success envelope: `{"success": true, "data": <payload>}`.
pub fn ok<T: Serialize>(data: T) -> Response {
    envelope(StatusCode::OK, data)
}

/// 201 envelope for newly created resources.
pub fn created<T: Serialize>(data: T) -> Response {
    envelope(StatusCode::CREATED, data)
}

pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

fn envelope<T: Serialize>(status: StatusCode, data: T) -> Response {
    (status, Json(json!({ "success": true, "data": data }))).into_response()
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        // Internal details are logged, never returned.
        if let CoreError::Internal(detail) = &self {
            tracing::error!(detail = %detail, "internal error surfaced at request boundary");
        }
        // Ledger invariant violations reaching the boundary are bugs, not
        // caller errors; they are logged and reported as INTERNAL.
        let code = match self.code() {
            ErrorCode::UnbalancedEntry | ErrorCode::CurrencyMismatch => {
                tracing::error!(error = %self, "ledger invariant violation at request boundary");
                ErrorCode::Internal
            }
            other => other,
        };

        let status =
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = match code {
            ErrorCode::Internal => "internal error".to_string(),
            _ => self.to_string(),
        };

        let mut error = json!({
            "code": code.as_str(),
            "message": message,
        });
        if let Some(details) = error_details(&self) {
            error["details"] = details;
        }

        (status, Json(json!({ "success": false, "error": error }))).into_response()
    }
}

fn error_details(err: &CoreError) -> Option<Value> {
    match err {
        CoreError::VerificationRequired { request_id } => {
            Some(json!({ "request_id": request_id }))
        }
        CoreError::InsufficientFunds {
            available,
            requested,
        } => Some(json!({ "available": available, "requested": requested })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Paise;

    #[test]
    fn test_error_details_for_verification_required() {
        let id = uuid::Uuid::new_v4();
        let details = error_details(&CoreError::VerificationRequired { request_id: id }).unwrap();
        assert_eq!(details["request_id"], json!(id));
    }

    #[test]
    fn test_error_details_for_insufficient_funds() {
        let details = error_details(&CoreError::InsufficientFunds {
            available: Paise(300),
            requested: Paise(700),
        })
        .unwrap();
        assert_eq!(details["available"], json!(300));
        assert_eq!(details["requested"], json!(700));
    }
}
