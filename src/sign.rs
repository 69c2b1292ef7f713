//! Test-side token issuing: an RSA signer standing in for an identity
//! provider, emitting a `kid` in the JWT header and publishing its public key
//! as a JWK.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use rsa::pkcs8::EncodePrivateKey;
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

struct KeyPair {
    private_pem: String,
    n: String,
    e: String,
}

fn generate_key_pair() -> KeyPair {
    let mut rng = OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("failed to generate key");
    let private_pem = private_key
        .to_pkcs8_pem(Default::default())
        .expect("failed to encode private key");

    KeyPair {
        private_pem: private_pem.to_string(),
        n: URL_SAFE_NO_PAD.encode(private_key.n().to_bytes_be()),
        e: URL_SAFE_NO_PAD.encode(private_key.e().to_bytes_be()),
    }
}

// Key generation is slow in debug builds, so each pair is made once per run.
fn provider_pair() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    PAIR.get_or_init(generate_key_pair)
}

fn attacker_pair() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    PAIR.get_or_init(generate_key_pair)
}

/// Signs claims as-is with a fixed RSA key.
pub struct OidcSigner {
    pair: &'static KeyPair,
    pub kid: String,
    pub algorithm: Algorithm,
}

impl OidcSigner {
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn sign(&self, claims: &Value) -> String {
        let key = EncodingKey::from_rsa_pem(self.pair.private_pem.as_bytes())
            .expect("failed to load signing key");
        let mut header = Header::new(self.algorithm);
        header.kid = Some(self.kid.clone());
        encode(&header, claims, &key).expect("failed to sign token")
    }

    /// Public key as published in a provider key set, under this signer's kid.
    pub fn jwk(&self) -> Value {
        self.jwk_with_kid(&self.kid)
    }

    pub fn jwk_with_kid(&self, kid: &str) -> Value {
        json!({
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "kid": kid,
            "n": self.pair.n,
            "e": self.pair.e,
        })
    }
}

/// Signer whose public key tests publish in their key sets.
pub fn test_signer(kid: &str) -> OidcSigner {
    OidcSigner {
        pair: provider_pair(),
        kid: kid.to_string(),
        algorithm: Algorithm::RS256,
    }
}

/// Signer with a different private key, never published.
pub fn foreign_signer(kid: &str) -> OidcSigner {
    OidcSigner {
        pair: attacker_pair(),
        kid: kid.to_string(),
        algorithm: Algorithm::RS256,
    }
}

pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Typical id_token claims for `aud`, valid for one hour.
pub fn id_token_claims(aud: &str) -> Value {
    let now = now();
    json!({
        "iss": "https://idp.example.com",
        "sub": "abc123",
        "aud": aud,
        "email": "ada@example.com",
        "iat": now,
        "exp": now + 3600,
    })
}
