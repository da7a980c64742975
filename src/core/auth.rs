// core/auth.rs
//
// Extraction de l'utilisateur courant depuis le token d'accès Bearer.
// L'émission des comptes et des sessions est hors périmètre: ce module ne
// fait que vérifier l'identité portée par le token.

use actix_web::HttpRequest;
use uuid::Uuid;

use crate::infrastructure::database::UsersRepository;
use crate::utils::error::{AppError, Result};
use crate::utils::security::verify_access_token;

/// Identité authentifiée portée par le token d'accès
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: String,
}

/// Vérifie le token Bearer de la requête et garantit la ligne utilisateur locale
pub async fn get_current_user(
    req: &HttpRequest,
    jwt_secret: &str,
    users: &UsersRepository,
) -> Result<AuthenticatedUser> {
    let token = extract_bearer_token(req)?;
    let token_data = verify_access_token(token, jwt_secret)?;

    let user = AuthenticatedUser {
        id: token_data.claims.sub,
        email: token_data.claims.email,
    };

    // Ligne locale créée paresseusement: support du compteur gratuit à vie
    users.ensure(&user.id, &user.email).await?;

    Ok(user)
}

fn extract_bearer_token(req: &HttpRequest) -> Result<&str> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    header.strip_prefix("Bearer ").ok_or(AppError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_extract_bearer_token() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc.def.ghi"))
            .to_http_request();
        assert_eq!(extract_bearer_token(&req).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_missing_header_is_unauthorized() {
        let req = TestRequest::default().to_http_request();
        assert!(matches!(
            extract_bearer_token(&req),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_non_bearer_scheme_is_unauthorized() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Basic dXNlcjpwYXNz"))
            .to_http_request();
        assert!(matches!(
            extract_bearer_token(&req),
            Err(AppError::Unauthorized)
        ));
    }
}
