/*!
OpenID Connect `id_token` support for OAuth2 login providers.

A provider configured with the `id_token` flow publishes its signing keys at a
validation endpoint (a JWKS document). Verifying a login then means reading
the token's `kid`, fetching the matching key, checking the RS256 signature,
audience and lifetime, and finally renaming claims with the provider's
`token_map` so the host finds the fields it expects (`user_id`, `email`, ...).

```rust,no_run
use auth_oidc::{ProviderConfig, Validator};

#[tokio::main]
async fn main() -> Result<(), auth_oidc::OIDCError> {
    let config = ProviderConfig::new(
        "https://login.example.com/discovery/v2.0/keys",
        "my-client-id",
    )?
    .with_token_map("sub:user_id upn:email".parse()?);

    let validator = Validator::new()?;
    let claims = validator.parse_id_token("eyJhbGciOi...", &config).await?;
    println!("logged in as {}", claims["user_id"]);
    Ok(())
}
```

Hosts serving logins with Rocket can mount the verification route instead,
see [`setup`].
*/
#[macro_use]
extern crate rocket;

pub mod claims;
pub mod errors;
pub mod keys;
pub mod routes;
pub mod validator;

#[cfg(test)]
pub(crate) mod sign;

pub use claims::{Claims, RenameRule, TokenMap, map_claims};
pub use errors::{ConfigError, KeyFetchError, OIDCError, TokenValidationError};
pub use keys::{CachedKeyResolver, HttpKeyResolver, KeyRecord, KeyResolver, KeySet};
pub use validator::Validator;

use openidconnect::{AuthUrl, ClientId, JsonWebKeySetUrl};
use rocket::{Build, Rocket};
use serde_derive::{Deserialize, Serialize};

/// Which login flow a provider uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    /// Plain OAuth2; the host validates the access token itself.
    #[default]
    AccessToken,
    /// OpenID Connect; logins carry an id_token verified by this crate.
    IdToken,
}

/// The host's record for one OAuth2/OIDC provider, as far as token
/// verification is concerned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub flow: Flow,
    /// Where users are sent to authenticate. Only used by the host's
    /// redirect step.
    #[serde(default)]
    pub auth_endpoint: Option<AuthUrl>,
    /// Location of the provider's public keys (JWKS).
    pub validation_endpoint: JsonWebKeySetUrl,
    /// Expected `aud` of every id_token.
    pub client_id: ClientId,
    #[serde(default)]
    pub token_map: TokenMap,
}

impl ProviderConfig {
    /// An `id_token` provider with no claim renaming.
    pub fn new(validation_endpoint: &str, client_id: &str) -> Result<Self, OIDCError> {
        let validation_endpoint =
            JsonWebKeySetUrl::new(validation_endpoint.to_string()).map_err(ConfigError::from)?;
        Ok(Self {
            flow: Flow::IdToken,
            auth_endpoint: None,
            validation_endpoint,
            client_id: ClientId::new(client_id.to_string()),
            token_map: TokenMap::default(),
        })
    }

    pub fn with_flow(mut self, flow: Flow) -> Self {
        self.flow = flow;
        self
    }

    pub fn with_token_map(mut self, token_map: TokenMap) -> Self {
        self.token_map = token_map;
        self
    }

    pub fn with_auth_endpoint(mut self, auth_endpoint: &str) -> Result<Self, OIDCError> {
        self.auth_endpoint =
            Some(AuthUrl::new(auth_endpoint.to_string()).map_err(ConfigError::from)?);
        Ok(self)
    }
}

/// Managed state behind [`routes::get_routes`].
#[derive(Debug, Clone)]
pub struct AuthState {
    pub validator: Validator,
    pub config: ProviderConfig,
}

/// Manages an [`AuthState`] for `config` and mounts the id_token route
/// under `/oidc`.
pub fn setup(rocket: Rocket<Build>, config: ProviderConfig) -> Result<Rocket<Build>, OIDCError> {
    let auth_state = AuthState {
        validator: Validator::new()?,
        config,
    };
    Ok(rocket
        .manage(auth_state)
        .mount("/oidc", routes::get_routes()))
}
