use jsonwebtoken::{DecodingKey, Validation, decode};

use crate::web::models::{AuthenticatedUser, Claims};

/// Signs an operator session token. Sessions are issued by the operator login
/// service; the control plane only verifies them.
#[cfg(test)]
pub fn create_jwt(
    user_id: uuid::Uuid,
    org_id: uuid::Uuid,
    username: &str,
    jwt_secret: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    use jsonwebtoken::{EncodingKey, Header, encode};

    let expiration = (chrono::Utc::now() + chrono::Duration::hours(24)).timestamp();

    let claims = Claims {
        sub: username.to_owned(),
        user_id,
        org_id,
        exp: expiration as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_ref()),
    )
}

pub fn decode_jwt(token: &str, jwt_secret: &str) -> Result<AuthenticatedUser, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(AuthenticatedUser {
        id: data.claims.user_id,
        org_id: data.claims.org_id,
        username: data.claims.sub,
    })
}
