use domains::models::{AuthContext, UserId};
use domains::traits::ViewerResolver;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Claims carried by viewer tokens. `sub` is the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerClaims {
    pub sub: String,
    pub exp: u64,
}

/// Verifies HS256 bearer tokens and reads the viewer id from `sub`.
pub struct JwtViewerResolver {
    key: DecodingKey,
    validation: Validation,
}

impl JwtViewerResolver {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl ViewerResolver for JwtViewerResolver {
    fn resolve_viewer_id(&self, ctx: &AuthContext) -> Option<UserId> {
        let token = ctx.bearer_token.as_deref()?;
        let claims = match decode::<ViewerClaims>(token, &self.key, &self.validation) {
            Ok(data) => data.claims,
            Err(err) => {
                debug!(error = %err, "rejecting bearer token");
                return None;
            }
        };
        match Uuid::parse_str(&claims.sub) {
            Ok(id) => Some(id),
            Err(_) => {
                debug!(sub = %claims.sub, "token subject is not a user id");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &[u8] = b"feed-ranker-test-secret";

    fn token(sub: &str, secret: &[u8], expires_in: Duration) -> String {
        let claims = ViewerClaims {
            sub: sub.to_string(),
            exp: (Utc::now() + expires_in).timestamp() as u64,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    fn ctx(token: &str) -> AuthContext {
        AuthContext::from_authorization_header(Some(&format!("Bearer {token}")))
    }

    #[test]
    fn valid_token_resolves_subject() {
        let viewer = Uuid::now_v7();
        let resolver = JwtViewerResolver::new(SECRET);
        let t = token(&viewer.to_string(), SECRET, Duration::hours(1));
        assert_eq!(resolver.resolve_viewer_id(&ctx(&t)), Some(viewer));
    }

    #[test]
    fn wrong_secret_or_expired_token_is_anonymous() {
        let viewer = Uuid::now_v7().to_string();
        let resolver = JwtViewerResolver::new(SECRET);
        let forged = token(&viewer, b"someone-else", Duration::hours(1));
        let expired = token(&viewer, SECRET, Duration::hours(-2));
        assert_eq!(resolver.resolve_viewer_id(&ctx(&forged)), None);
        assert_eq!(resolver.resolve_viewer_id(&ctx(&expired)), None);
    }

    #[test]
    fn non_uuid_subject_and_missing_token_are_anonymous() {
        let resolver = JwtViewerResolver::new(SECRET);
        let t = token("admin", SECRET, Duration::hours(1));
        assert_eq!(resolver.resolve_viewer_id(&ctx(&t)), None);
        assert_eq!(resolver.resolve_viewer_id(&AuthContext::anonymous()), None);
    }
}
