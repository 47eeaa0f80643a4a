use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use medrag_memory::{Caller, CallerRole, UserId};

use crate::error::ApiError;

pub(crate) const USER_ID_HEADER: &str = "x-user-id";
pub(crate) const USER_ROLE_HEADER: &str = "x-user-role";
pub(crate) const USER_DEPARTMENT_HEADER: &str = "x-user-department";

/// Caller identity forwarded by the upstream auth service.
///
/// `x-user-id` is required. A missing role means least-privileged staff.
pub(crate) struct Identity(pub Caller);

impl<S: Send + Sync> FromRequestParts<S> for Identity {
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

        let Some(raw_id) = header(USER_ID_HEADER) else {
            return Err(ApiError::new(
                StatusCode::UNAUTHORIZED,
                "missing caller identity",
            ));
        };
        let user_id = raw_id.parse::<i64>().map_err(|_| {
            ApiError::new(StatusCode::BAD_REQUEST, format!("invalid {USER_ID_HEADER}"))
        })?;
        let role = header(USER_ROLE_HEADER).map_or(CallerRole::Staff, CallerRole::parse);
        let department = header(USER_DEPARTMENT_HEADER).map(str::to_owned);

        Ok(Self(Caller {
            user_id: UserId(user_id),
            role,
            department,
        }))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(request: Request<()>) -> Result<Caller, StatusCode> {
        let (mut parts, ()) = request.into_parts();
        Identity::from_request_parts(&mut parts, &())
            .await
            .map(|Identity(caller)| caller)
            .map_err(|e| e.status())
    }

    #[tokio::test]
    async fn full_identity() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "42")
            .header(USER_ROLE_HEADER, "Nurse")
            .header(USER_DEPARTMENT_HEADER, "oncology")
            .body(())
            .unwrap();
        let caller = extract(request).await.unwrap();
        assert_eq!(caller.user_id, UserId(42));
        assert_eq!(caller.role, CallerRole::Nurse);
        assert_eq!(caller.department.as_deref(), Some("oncology"));
    }

    #[tokio::test]
    async fn missing_role_is_staff() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "7")
            .body(())
            .unwrap();
        let caller = extract(request).await.unwrap();
        assert_eq!(caller.role, CallerRole::Staff);
        assert!(caller.department.is_none());
    }

    #[tokio::test]
    async fn missing_user_id_is_unauthorized() {
        let request = Request::builder().body(()).unwrap();
        assert_eq!(extract(request).await.unwrap_err(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_user_id_is_bad_request() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "abc")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap_err(), StatusCode::BAD_REQUEST);
    }
}
