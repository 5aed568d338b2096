use axum::http::StatusCode;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// JWT Claims structure, as issued by the auth service
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user ID)
    pub exp: usize,  // Expiration time
    pub iat: usize,  // Issued at
}

/// Validate a JWT token against the `JWT_SECRET` environment variable
pub fn validate_token(token: &str) -> Result<Claims, JwtError> {
    let jwt_secret = std::env::var("JWT_SECRET").map_err(|_| JwtError::MissingSecret)?;
    validate_token_with_secret(token, jwt_secret.as_bytes())
}

/// Validate a JWT token and extract claims
pub fn validate_token_with_secret(token: &str, secret: &[u8]) -> Result<Claims, JwtError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.leeway = 0;

    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|_| JwtError::InvalidToken)?;

    Ok(token_data.claims)
}

#[derive(Debug)]
pub enum JwtError {
    MissingSecret,
    InvalidToken,
}

impl fmt::Display for JwtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JwtError::MissingSecret => write!(f, "JWT secret is missing or not set"),
            JwtError::InvalidToken => write!(f, "Invalid or expired JWT token"),
        }
    }
}

impl From<JwtError> for StatusCode {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::MissingSecret => StatusCode::INTERNAL_SERVER_ERROR,
            JwtError::InvalidToken => StatusCode::UNAUTHORIZED,
        }
    }
}
