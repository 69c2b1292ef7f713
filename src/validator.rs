use crate::claims::{Claims, map_claims};
use crate::errors::{ConfigError, OIDCError, TokenValidationError};
use crate::keys::{HttpKeyResolver, KeyResolver};
use crate::{Flow, ProviderConfig};
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};

/// The only algorithm id_tokens may be signed with. The token header is
/// checked against it, never used to choose it.
pub const ID_TOKEN_ALGORITHM: Algorithm = Algorithm::RS256;

/// Verification rules for an id_token issued to `audience`.
///
/// `exp` is required and checked, `nbf` is checked when present, both with
/// jsonwebtoken's default leeway.
pub fn id_token_validation(audience: &str) -> Validation {
    let mut validation = Validation::new(ID_TOKEN_ALGORITHM);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.set_audience(&[audience]);
    validation.algorithms = vec![ID_TOKEN_ALGORITHM];
    validation
}

/// Verifies OpenID Connect id_tokens against the signing keys a provider
/// publishes at its validation endpoint.
///
/// The resolver defaults to [`HttpKeyResolver`], which fetches the key set
/// for every token; wrap it in a [`crate::keys::CachedKeyResolver`] to reuse
/// key sets between logins.
#[derive(Debug, Clone)]
pub struct Validator<R: KeyResolver = HttpKeyResolver> {
    resolver: R,
}

impl Validator<HttpKeyResolver> {
    pub fn new() -> Result<Self, OIDCError> {
        Ok(Self::with_resolver(HttpKeyResolver::new()?))
    }
}

impl<R: KeyResolver> Validator<R> {
    pub fn with_resolver(resolver: R) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Verifies the signature of `id_token` and returns its full claim set.
    ///
    /// The header's `kid` selects the provider key; the algorithm must be
    /// RS256 and the audience must equal the provider's `client_id`.
    ///
    /// # Errors
    /// - [`ConfigError::FlowNotIdToken`] when the provider uses the access_token flow.
    /// - [`OIDCError::KeyFetch`] when the key set cannot be retrieved.
    /// - [`OIDCError::TokenValidation`] for every other rejection, including
    ///   a `kid` the provider does not publish.
    pub async fn verify_and_decode(
        &self,
        id_token: &str,
        config: &ProviderConfig,
    ) -> Result<Claims, OIDCError> {
        if config.flow != Flow::IdToken {
            return Err(ConfigError::FlowNotIdToken.into());
        }

        let result = self.verify(id_token, config).await;
        if let Err(OIDCError::TokenValidation(reason)) = &result {
            tracing::warn!(
                endpoint = config.validation_endpoint.url().as_str(),
                %reason,
                "id_token rejected"
            );
        }
        result
    }

    async fn verify(&self, id_token: &str, config: &ProviderConfig) -> Result<Claims, OIDCError> {
        let header = decode_header(id_token).map_err(TokenValidationError::from)?;
        if header.alg != ID_TOKEN_ALGORITHM {
            return Err(TokenValidationError::UnsupportedAlgorithm(header.alg).into());
        }
        let kid = match header.kid {
            Some(kid) if !kid.is_empty() => kid,
            _ => return Err(TokenValidationError::MissingKeyId.into()),
        };

        let endpoint = config.validation_endpoint.url().as_str();
        let key = self.resolver.resolve_key(endpoint, &kid).await?;
        let key = key.ok_or(TokenValidationError::KeyNotFound(kid))?;
        let decoding_key = key.decoding_key()?;

        let validation = id_token_validation(config.client_id.as_str());
        let data = decode::<Claims>(id_token, &decoding_key, &validation)?;
        Ok(data.claims)
    }

    /// Verifies `id_token` and applies the provider's `token_map` to the
    /// claims, producing what the host uses to find or create the user.
    pub async fn parse_id_token(
        &self,
        id_token: &str,
        config: &ProviderConfig,
    ) -> Result<Claims, OIDCError> {
        let claims = self.verify_and_decode(id_token, config).await?;
        Ok(map_claims(claims, &config.token_map))
    }
}
