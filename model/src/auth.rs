//! Password login and HS256 bearer tokens.

use crate::config::AuthConfig;
use crate::types::Token;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Incorrect username or password")]
    InvalidCredentials,

    #[error("Could not validate credentials")]
    InvalidToken,

    #[error("Failed to create token: {message}")]
    TokenCreation { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    pub exp: i64,
}

pub struct Authenticator {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl Authenticator {
    pub fn new(config: AuthConfig) -> AuthResult<Self> {
        config
            .validate()
            .map_err(|message| AuthError::InvalidConfig { message })?;

        // Expired means expired: no clock-skew allowance.
        let mut validation = Validation::new(TOKEN_ALGORITHM);
        validation.leeway = 0;

        let secret = config.secret_key.as_bytes();
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            config,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Exchanges the admin credentials for a bearer token.
    pub fn login(&self, username: &str, password: &str) -> AuthResult<Token> {
        if username != self.config.admin_username || password != self.config.admin_password {
            warn!(username, "rejected login");
            return Err(AuthError::InvalidCredentials);
        }
        self.issue(username)
    }

    pub fn issue(&self, username: &str) -> AuthResult<Token> {
        let ttl = chrono::Duration::from_std(self.config.token_ttl).map_err(|e| {
            AuthError::TokenCreation {
                message: e.to_string(),
            }
        })?;
        let claims = Claims {
            sub: Some(username.to_string()),
            exp: (Utc::now() + ttl).timestamp(),
        };
        self.sign(&claims).map(Token::bearer)
    }

    fn sign(&self, claims: &Claims) -> AuthResult<String> {
        encode(&Header::new(TOKEN_ALGORITHM), claims, &self.encoding_key).map_err(|e| {
            AuthError::TokenCreation {
                message: e.to_string(),
            }
        })
    }

    /// Returns the username a valid token was issued to.
    pub fn verify(&self, token: &str) -> AuthResult<String> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!(error = %e, "token rejected");
            AuthError::InvalidToken
        })?;

        match data.claims.sub {
            Some(sub) if sub == self.config.admin_username => Ok(sub),
            _ => Err(AuthError::InvalidToken),
        }
    }
}
