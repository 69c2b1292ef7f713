//! Login glue for Rocket hosts: the OAuth callback handler posts the raw
//! id_token here and gets back the mapped claims, or a generic failure.

use crate::AuthState;
use crate::claims::Claims;
use crate::errors::OIDCError;
use rocket::form::Form;
use rocket::serde::json::Json;
use rocket::{Route, State, routes};

#[derive(Debug, FromForm)]
pub struct IdTokenForm {
    id_token: String,
}

#[post("/id_token", data = "<form>")]
pub async fn id_token(
    auth_state: &State<AuthState>,
    form: Form<IdTokenForm>,
) -> Result<Json<Claims>, OIDCError> {
    let claims = auth_state
        .validator
        .parse_id_token(&form.id_token, &auth_state.config)
        .await?;
    Ok(Json(claims))
}

pub fn get_routes() -> Vec<Route> {
    routes![id_token]
}

#[cfg(test)]
mod tests {
    use crate::errors::GENERIC_FAILURE;
    use crate::sign::{id_token_claims, test_signer};
    use crate::{Claims, ProviderConfig, setup};
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;

    async fn client_for(config: ProviderConfig) -> Client {
        let rocket = setup(rocket::build(), config).expect("setup");
        Client::tracked(rocket).await.expect("valid rocket instance")
    }

    #[rocket::async_test]
    async fn valid_id_token_returns_mapped_claims() {
        let signer = test_signer("key-1");
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/jwks")
            .with_header("content-type", "application/json")
            .with_body(json!({ "keys": [signer.jwk()] }).to_string())
            .create_async()
            .await;
        let config = ProviderConfig::new(&format!("{}/jwks", server.url()), "web-client")
            .unwrap()
            .with_token_map("sub:user_id".parse().unwrap());
        let client = client_for(config).await;

        let token = signer.sign(&id_token_claims("web-client"));
        let response = client
            .post("/oidc/id_token")
            .header(ContentType::Form)
            .body(format!("id_token={}", token))
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);
        let claims: Claims = response.into_json().await.expect("claims body");
        assert_eq!(claims["user_id"], json!("abc123"));
        assert_eq!(claims["email"], json!("ada@example.com"));
    }

    #[rocket::async_test]
    async fn rejected_token_gets_generic_unauthorized() {
        let signer = test_signer("key-1");
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/jwks")
            .with_header("content-type", "application/json")
            .with_body(json!({ "keys": [signer.jwk()] }).to_string())
            .create_async()
            .await;
        let config = ProviderConfig::new(&format!("{}/jwks", server.url()), "web-client").unwrap();
        let client = client_for(config).await;

        let token = signer.sign(&id_token_claims("another-client"));
        let response = client
            .post("/oidc/id_token")
            .header(ContentType::Form)
            .body(format!("id_token={}", token))
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(response.into_string().await.as_deref(), Some(GENERIC_FAILURE));
    }

    #[rocket::async_test]
    async fn provider_outage_does_not_leak_details() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/jwks")
            .with_status(500)
            .with_body("upstream stack trace")
            .create_async()
            .await;
        let config = ProviderConfig::new(&format!("{}/jwks", server.url()), "web-client").unwrap();
        let client = client_for(config).await;

        let token = test_signer("key-1").sign(&id_token_claims("web-client"));
        let response = client
            .post("/oidc/id_token")
            .header(ContentType::Form)
            .body(format!("id_token={}", token))
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::InternalServerError);
        assert_eq!(response.into_string().await.as_deref(), Some(GENERIC_FAILURE));
    }
}
