use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use serde_json::json;

type Rejection = (StatusCode, Json<serde_json::Value>);

/// Checks the bearer token when an operator key is configured; an absent
/// key leaves the endpoint open.
pub fn verify_operator(headers: &HeaderMap, expected_key: Option<&str>) -> Result<(), Rejection> {
    let Some(expected_key) = expected_key else {
        return Ok(());
    };

    if operator_token(headers)?.trim() != expected_key {
        return Err(reject("OPERATOR_KEY_MISMATCH", "Operator key does not match"));
    }
    Ok(())
}

fn operator_token(headers: &HeaderMap) -> Result<&str, Rejection> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| reject("OPERATOR_KEY_MISSING", "This operation needs the operator key"))?
        .to_str()
        .map_err(|_| reject("OPERATOR_KEY_MISSING", "Authorization header is not readable text"))?;

    value
        .strip_prefix("Bearer ")
        .ok_or_else(|| reject("OPERATOR_KEY_MISSING", "Send the operator key as `Bearer <key>`"))
}

fn reject(code: &str, message: &str) -> Rejection {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": { "code": code, "message": message } })),
    )
}
