// utils/security.rs
use crate::utils::error::{AppError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Tolérance maximale entre l'horodatage signé et l'heure de réception
pub const WEBHOOK_TOLERANCE_SECONDS: i64 = 300;

/// Claims JWT pour les tokens d'accès
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: Uuid,        // User ID
    pub email: String,    // User email
    pub exp: usize,       // Expiration timestamp
    pub iat: usize,       // Issued at timestamp
}

/// Générer un token d'accès JWT
pub fn generate_access_token(user_id: Uuid, email: &str, secret: &str) -> String {
    let now = chrono::Utc::now();
    let expires_at = now + chrono::Duration::hours(2);

    let claims = AccessTokenClaims {
        sub: user_id,
        email: email.to_string(),
        exp: expires_at.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Failed to generate access token")
}

/// Vérifier un token d'accès
pub fn verify_access_token(token: &str, secret: &str) -> Result<TokenData<AccessTokenClaims>> {
    let token_data = decode::<AccessTokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::InvalidToken)?;

    Ok(token_data)
}

/// Décode le secret webhook. Un préfixe `whsec_` indique une clé base64,
/// sinon les octets bruts sont utilisés.
fn webhook_key(secret: &str) -> Result<Vec<u8>> {
    if let Some(encoded) = secret.strip_prefix("whsec_") {
        BASE64
            .decode(encoded)
            .map_err(|_| AppError::Validation("Secret webhook base64 invalide".to_string()))
    } else {
        Ok(secret.as_bytes().to_vec())
    }
}

/// Signer un payload webhook: HMAC-SHA256 sur `id.timestamp.body`
pub fn sign_webhook(secret: &str, webhook_id: &str, timestamp: i64, body: &[u8]) -> Result<String> {
    let key = webhook_key(secret)?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    mac.update(webhook_id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);

    Ok(format!("v1,{}", BASE64.encode(mac.finalize().into_bytes())))
}

/// Vérifier la signature d'une livraison webhook.
///
/// Le header de signature peut contenir plusieurs candidats séparés par des
/// espaces; la livraison est acceptée si l'un d'eux correspond. Les
/// horodatages au-delà de la tolérance sont rejetés pour bloquer le rejeu.
pub fn verify_webhook_signature(
    secret: &str,
    webhook_id: &str,
    timestamp: &str,
    body: &[u8],
    signature_header: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<()> {
    if webhook_id.is_empty() || timestamp.is_empty() || signature_header.is_empty() {
        return Err(AppError::InvalidSignature);
    }

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| AppError::InvalidSignature)?;

    if (now.timestamp() - ts).abs() > WEBHOOK_TOLERANCE_SECONDS {
        return Err(AppError::InvalidSignature);
    }

    let key = webhook_key(secret)?;

    for candidate in signature_header.split_whitespace() {
        // Seule la version v1 (HMAC-SHA256) est supportée
        let Some(encoded) = candidate.strip_prefix("v1,") else {
            continue;
        };
        let Ok(candidate_bytes) = BASE64.decode(encoded) else {
            continue;
        };

        let mut mac = HmacSha256::new_from_slice(&key)
            .map_err(|e| AppError::Validation(e.to_string()))?;
        mac.update(webhook_id.as_bytes());
        mac.update(b".");
        mac.update(ts.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);

        // verify_slice effectue une comparaison en temps constant
        if mac.verify_slice(&candidate_bytes).is_ok() {
            return Ok(());
        }
    }

    Err(AppError::InvalidSignature)
}
