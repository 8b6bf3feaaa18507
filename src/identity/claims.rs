//! Unverified JWT claim decoding.
//!
//! Used to read `exp` for logging and to render diagnostics. Nothing here
//! is a trust decision: signatures are checked by whoever receives the token.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde_json::Value;

use super::AuthError;

pub type Claims = serde_json::Map<String, Value>;

fn insecure_validation() -> Validation {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation
}

/// Decode the claims of a compact JWT without checking its signature.
pub fn decode_unverified(token: &str) -> Result<Claims, AuthError> {
    let data = decode::<Claims>(token.trim(), &DecodingKey::from_secret(&[]), &insecure_validation())
        .map_err(|e| AuthError::MalformedToken(e.to_string()))?;
    Ok(data.claims)
}

/// `exp` of the token as a UTC timestamp, if the token has one.
pub fn expiry(token: &str) -> Result<Option<DateTime<Utc>>, AuthError> {
    let claims = decode_unverified(token)?;
    expiry_from_claims(&claims)
}

pub fn expiry_from_claims(claims: &Claims) -> Result<Option<DateTime<Utc>>, AuthError> {
    let exp = match claims.get("exp") {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };

    let secs = exp
        .as_i64()
        .or_else(|| exp.as_f64().map(|f| f as i64))
        .ok_or_else(|| AuthError::MalformedToken(format!("exp claim is not numeric: {}", exp)))?;

    DateTime::from_timestamp(secs, 0)
        .map(Some)
        .ok_or_else(|| AuthError::MalformedToken(format!("exp claim out of range: {}", secs)))
}
