//! API error types with RPC status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use catalog::CatalogError;
use inventory::InventoryError;
use orders::OrderStoreError;
use saga::SagaError;
use serde::Serialize;

/// RPC-level error returned by every handler.
///
/// Downstream failures other than caller mistakes and missing rows collapse
/// into [`ApiError::Internal`]; the cause is logged, not returned.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or non-positive identifier, or a malformed request.
    InvalidArgument(String),
    /// The requested row does not exist.
    NotFound(String),
    /// The endpoint is deliberately not implemented.
    Unimplemented(String),
    /// Any other failure.
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Status code name carried in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidArgument(_) => "InvalidArgument",
            ApiError::NotFound(_) => "NotFound",
            ApiError::Unimplemented(_) => "Unimplemented",
            ApiError::Internal(_) => "Internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unimplemented(_) => StatusCode::NOT_IMPLEMENTED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!(error = %err, "internal error");
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match self {
            ApiError::InvalidArgument(msg)
            | ApiError::NotFound(msg)
            | ApiError::Unimplemented(msg)
            | ApiError::Internal(msg) => msg,
        };
        (status, axum::Json(ErrorBody { code, message })).into_response()
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::InvalidArgument(msg) => ApiError::InvalidArgument(msg),
            CatalogError::GoodsNotFound(_) => ApiError::NotFound(err.to_string()),
            CatalogError::Database(_) => ApiError::internal(err),
        }
    }
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InvalidArgument(msg) => ApiError::InvalidArgument(msg),
            InventoryError::NotFound(_) => ApiError::NotFound(err.to_string()),
            _ => ApiError::internal(err),
        }
    }
}

impl From<OrderStoreError> for ApiError {
    fn from(err: OrderStoreError) -> Self {
        match err {
            OrderStoreError::NotFound(_) => ApiError::NotFound(err.to_string()),
            _ => ApiError::internal(err),
        }
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        match err {
            SagaError::InvalidArgument(msg) => ApiError::InvalidArgument(msg),
            _ => ApiError::internal(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use common::{GoodsId, OrderId};

    use super::*;

    #[test]
    fn test_caller_errors_keep_their_code() {
        let err = ApiError::from(CatalogError::InvalidArgument("room id".to_string()));
        assert_eq!(err.code(), "InvalidArgument");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = ApiError::from(InventoryError::NotFound(GoodsId::new(3)));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_business_failures_collapse_to_internal() {
        let err = ApiError::from(InventoryError::Understock {
            goods_id: GoodsId::new(3),
            available: 1,
            requested: 2,
        });
        assert_eq!(err.code(), "Internal");

        let err = ApiError::from(SagaError::OrderCreationFailed {
            order_id: OrderId::new(9),
            reason: "understock".to_string(),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unimplemented_is_501() {
        assert_eq!(
            ApiError::Unimplemented("RollbackStock".to_string()).status(),
            StatusCode::NOT_IMPLEMENTED
        );
    }
}
