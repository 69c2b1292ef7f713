use jsonwebtoken::Algorithm;
use jsonwebtoken::errors::ErrorKind;
use rocket::Request;
use rocket::http::ContentType;
use rocket::http::Status;
use rocket::response;
use std::io::Cursor;
use thiserror::Error;

/// Body returned to end users for every failed login, whatever the cause.
pub const GENERIC_FAILURE: &str = "authentication failed";

/// Failures while retrieving a provider's published key set.
#[derive(Debug, Error)]
pub enum KeyFetchError {
    /// Connection failure, timeout or unreadable body.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// Any answer other than 2xx, redirects included.
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
    /// The body is not valid in its declared (or default utf-8) charset.
    #[error("body is not valid {0}")]
    Decode(&'static str),
    /// The body is not a JSON object with a `keys` array.
    #[error("invalid key set document: {0}")]
    Json(#[from] serde_json::Error),
}

/// The specific reason an id_token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenValidationError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("token header carries no key id")]
    MissingKeyId,
    #[error("algorithm {0:?} is not accepted, only RS256")]
    UnsupportedAlgorithm(Algorithm),
    #[error("signing key {0:?} not found in provider key set")]
    KeyNotFound(String),
    #[error("provider key is unusable: {0}")]
    InvalidKey(String),
    #[error("signature mismatch")]
    InvalidSignature,
    #[error("audience mismatch")]
    InvalidAudience,
    #[error("token has expired")]
    Expired,
    #[error("token is not valid yet")]
    NotYetValid,
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    #[error("{0}")]
    Other(String),
}

impl From<jsonwebtoken::errors::Error> for TokenValidationError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => TokenValidationError::Malformed(err.to_string()),
            ErrorKind::InvalidSignature => TokenValidationError::InvalidSignature,
            ErrorKind::InvalidAudience => TokenValidationError::InvalidAudience,
            ErrorKind::ExpiredSignature => TokenValidationError::Expired,
            ErrorKind::ImmatureSignature => TokenValidationError::NotYetValid,
            ErrorKind::MissingRequiredClaim(claim) => {
                TokenValidationError::MissingClaim(claim.clone())
            }
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => TokenValidationError::InvalidKey(err.to_string()),
            _ => TokenValidationError::Other(err.to_string()),
        }
    }
}

/// Provider configuration that cannot be used as given.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("malformed token_map rule {0:?}, expected \"from:to\"")]
    MalformedRule(String),
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] openidconnect::url::ParseError),
    #[error("provider flow is not id_token")]
    FlowNotIdToken,
}

#[derive(Debug, Error)]
pub enum OIDCError {
    #[error("failed to fetch signing keys from {endpoint}: {source}")]
    KeyFetch {
        endpoint: String,
        #[source]
        source: KeyFetchError,
    },
    #[error("token validation error: {0}")]
    TokenValidation(#[from] TokenValidationError),
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl OIDCError {
    pub(crate) fn key_fetch(endpoint: &str, source: impl Into<KeyFetchError>) -> Self {
        OIDCError::KeyFetch {
            endpoint: endpoint.to_string(),
            source: source.into(),
        }
    }

    /// Status a host should answer with when this error aborts a login.
    pub fn status(&self) -> Status {
        match self {
            OIDCError::TokenValidation(_) => Status::Unauthorized,
            OIDCError::KeyFetch { .. } | OIDCError::Configuration(_) | OIDCError::HttpClient(_) => {
                Status::InternalServerError
            }
        }
    }
}

impl From<jsonwebtoken::errors::Error> for OIDCError {
    fn from(err: jsonwebtoken::errors::Error) -> OIDCError {
        OIDCError::TokenValidation(err.into())
    }
}

impl<'r> response::Responder<'r, 'static> for OIDCError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        tracing::error!(uri = %request.uri(), error = %self, "login aborted");
        let body = GENERIC_FAILURE;

        response::Response::build()
            .status(self.status())
            .header(ContentType::Plain)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}
