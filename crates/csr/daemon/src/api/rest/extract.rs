//! Request extractors and path parsing
//!
//! Caller identity is asserted by the upstream auth gateway through the
//! `x-user-id` and `x-user-role` headers; the daemon trusts them as given.

use crate::error::{ApiError, ApiResult};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use csr_checkpoints::CheckpointError;
use csr_types::{Actor, CheckpointNumber, ProgramId, Role, SponsorId, UserId};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller of a request
#[derive(Debug, Clone)]
pub struct CallerActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for CallerActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let user_id = header(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", USER_ID_HEADER)))?;
        let role: Role = header(USER_ROLE_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {} header", USER_ROLE_HEADER)))?
            .parse()
            .map_err(ApiError::Unauthorized)?;

        Ok(CallerActor(Actor {
            user_id: UserId::new(user_id),
            role,
        }))
    }
}

pub fn parse_program_id(id: &str) -> ApiResult<ProgramId> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid program ID: {}", id)))
}

pub fn parse_sponsor_id(id: &str) -> ApiResult<SponsorId> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid sponsor ID: {}", id)))
}

/// Malformed or out-of-range numbers are validation errors, not bad requests
pub fn parse_checkpoint_number(raw: &str) -> ApiResult<CheckpointNumber> {
    raw.parse::<CheckpointNumber>()
        .map_err(|e| CheckpointError::from(e).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(headers: &[(&str, &str)]) -> Result<CallerActor, ApiError> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        CallerActor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_actor_from_headers() {
        let CallerActor(actor) = extract(&[("x-user-id", "u-1"), ("x-user-role", "admin")])
            .await
            .unwrap();
        assert_eq!(actor, Actor::admin("u-1"));

        let CallerActor(actor) = extract(&[("x-user-id", "u-2"), ("x-user-role", "CSR")])
            .await
            .unwrap();
        assert_eq!(actor.role, Role::Sponsor);
    }

    #[tokio::test]
    async fn test_missing_or_unknown_identity_is_unauthorized() {
        assert!(matches!(
            extract(&[("x-user-role", "admin")]).await,
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            extract(&[("x-user-id", "u-1"), ("x-user-role", "superuser")]).await,
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_parse_checkpoint_number() {
        assert_eq!(parse_checkpoint_number("3").unwrap().get(), 3);
        assert!(matches!(
            parse_checkpoint_number("9"),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            parse_checkpoint_number("x"),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_program_id_accepts_prefix() {
        let id = ProgramId::generate();
        assert_eq!(parse_program_id(&format!("program:{}", id)).unwrap(), id);
        assert!(matches!(
            parse_program_id("nope"),
            Err(ApiError::BadRequest(_))
        ));
    }
}
