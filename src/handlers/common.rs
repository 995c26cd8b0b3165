use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use validator::Validate;

use crate::errors::ServiceError;

/// Uniform success envelope: `{"status":"success","data":…}`.
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub status: &'static str,
    pub data: T,
}

pub fn success_response<T: Serialize>(data: T) -> Response {
    (
        StatusCode::OK,
        Json(SuccessResponse {
            status: "success",
            data,
        }),
    )
        .into_response()
}

pub fn created_response<T: Serialize>(data: T) -> Response {
    (
        StatusCode::CREATED,
        Json(SuccessResponse {
            status: "success",
            data,
        }),
    )
        .into_response()
}

/// Validate request input before any service call.
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input.validate().map_err(ServiceError::from)
}
