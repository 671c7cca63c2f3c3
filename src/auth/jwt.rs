use jsonwebtoken::{DecodingKey, Validation, decode};

use crate::models::{Claims, TokenType};

/// Decodes and validates an access token. Refresh tokens are refused.
pub fn verify_access_token(token: &str, secret: &str) -> Result<Claims, String> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())?;

    if claims.token_type != TokenType::Access {
        return Err("not an access token".to_string());
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &str = "test-secret";

    fn token(token_type: TokenType, exp_offset: i64) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset) as usize;
        let claims = Claims {
            user_id: 7,
            sub: "jdoe".into(),
            role: 3,
            exp,
            jti: uuid::Uuid::new_v4().to_string(),
            token_type,
            employee_id: Some(1000),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_valid_access_token() {
        let claims = verify_access_token(&token(TokenType::Access, 900), SECRET).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.employee_id, Some(1000));
    }

    #[test]
    fn rejects_refresh_expired_and_foreign_tokens() {
        assert!(verify_access_token(&token(TokenType::Refresh, 900), SECRET).is_err());
        assert!(verify_access_token(&token(TokenType::Access, -3600), SECRET).is_err());
        assert!(verify_access_token(&token(TokenType::Access, 900), "other").is_err());
    }
}
