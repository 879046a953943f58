use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::model::user::Teacher;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}

/// The token carries the whole teacher identity, so handlers never need a lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(flatten)]
    pub teacher: Teacher,
    pub exp: usize,
    pub jti: String,
    pub token_type: TokenType,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub(crate) fn now() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as usize)
        .unwrap_or_default()
}

fn issue(
    teacher: &Teacher,
    token_type: TokenType,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), Error> {
    let claims = Claims {
        teacher: teacher.clone(),
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok((token, claims))
}

pub fn generate_access_token(teacher: &Teacher, secret: &str, ttl: usize) -> Result<String, Error> {
    issue(teacher, TokenType::Access, secret, ttl).map(|(token, _)| token)
}

pub fn generate_refresh_token(
    teacher: &Teacher,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), Error> {
    issue(teacher, TokenType::Refresh, secret, ttl)
}

pub fn issue_pair(teacher: &Teacher, config: &Config) -> Result<TokenPair, Error> {
    let access_token =
        generate_access_token(teacher, &config.jwt_secret, config.access_token_ttl)?;
    let (refresh_token, _) =
        generate_refresh_token(teacher, &config.jwt_secret, config.refresh_token_ttl)?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::user::avatar_url;

    pub(crate) fn budi() -> Teacher {
        Teacher {
            username: "budi".into(),
            name: "Budi Santoso".into(),
            employee_id: "198501012010011001".into(),
            role: "GURU".into(),
            employment_status: "ASN".into(),
            school: "SMPN 1 Padarincang".into(),
            avatar: avatar_url("Budi Santoso"),
        }
    }

    #[test]
    fn access_token_round_trips_identity() {
        let token = generate_access_token(&budi(), "s3cret", 60).unwrap();
        let claims = verify_token(&token, "s3cret").unwrap();
        assert_eq!(claims.teacher, budi());
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn wrong_secret_or_expired_is_rejected() {
        let token = generate_access_token(&budi(), "s3cret", 60).unwrap();
        assert!(verify_token(&token, "other").is_err());

        // jsonwebtoken allows 60s of leeway by default
        let (token, _) = issue(&budi(), TokenType::Access, "s3cret", 0).unwrap();
        let mut claims = verify_token(&token, "s3cret").unwrap();
        claims.exp = now() - 3600;
        let stale = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"s3cret"),
        )
        .unwrap();
        assert!(verify_token(&stale, "s3cret").is_err());
    }

    #[test]
    fn refresh_tokens_have_distinct_ids() {
        let (_, a) = generate_refresh_token(&budi(), "s3cret", 60).unwrap();
        let (_, b) = generate_refresh_token(&budi(), "s3cret", 60).unwrap();
        assert_ne!(a.jti, b.jti);
        assert_eq!(a.token_type, TokenType::Refresh);
    }
}
