use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Numeric user identifier issued by the API.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Numeric company identifier issued by the API.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
pub struct CompanyId(pub i64);

/// The authenticated identity, including the live access token.
///
/// Created on a successful login or restored at startup; the current value
/// is published through [`AuthService::session`](crate::AuthService::session)
/// and becomes `None` on logout.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: UserId,
    pub user_name: String,
    pub role: String,
    pub name: String,
    pub last_name: String,
    /// Current access token. Replaced in place when the token is renewed.
    pub token: String,
    /// Company the session operates in, once one is selected.
    pub company_id: Option<CompanyId>,
}

/// A company (tenant) the authenticated user may operate within.
///
/// Wire name for the display name is `nombre`, matching the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

/// Credentials posted to the login endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_name: String,
    pub password: String,
}

/// Login endpoint response.
///
/// Which fields are populated depends on the account: a final `token` for
/// zero- and single-company users, a transient `session_token` plus the
/// `empresas` candidate list when the user must pick a company first.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct LoginResponse {
    pub user_id: UserId,
    pub user_name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub empresas: Vec<Company>,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub session_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Response of the token exchange and refresh endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct TokenResponse {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Payload for the user registration endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub user_name: String,
    pub password: String,
    pub role: String,
    pub name: String,
    pub last_name: String,
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Registration endpoint response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct UserResponse {
    pub id: UserId,
    pub user_name: String,
    pub role: String,
}

/// Error body the API attaches to non-success responses.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct ErrorResponse {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub timestamp: String,
}

/// Persisted shape of the user-data blob (everything but the token).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredUser {
    pub user_id: UserId,
    pub user_name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empresa_id: Option<CompanyId>,
}

impl StoredUser {
    pub(crate) fn into_session(self, token: String) -> Session {
        Session {
            user_id: self.user_id,
            user_name: self.user_name,
            role: self.role,
            name: self.name,
            last_name: self.last_name,
            token,
            company_id: self.empresa_id,
        }
    }
}

impl From<&Session> for StoredUser {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id,
            user_name: session.user_name.clone(),
            role: session.role.clone(),
            name: session.name.clone(),
            last_name: session.last_name.clone(),
            empresa_id: session.company_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn company_uses_wire_field_names() {
        let company: Company =
            serde_json::from_str(r#"{"id":7,"nombre":"Acme","email":"ops@acme.com"}"#).unwrap();
        assert_eq!(company.id, CompanyId(7));
        assert_eq!(company.name, "Acme");

        let json = serde_json::to_string(&company).unwrap();
        assert!(json.contains("\"nombre\":\"Acme\""));
    }

    #[test]
    fn login_response_tolerates_missing_fields() {
        let response: LoginResponse =
            serde_json::from_str(r#"{"userId":1,"userName":"driver"}"#).unwrap();
        assert!(response.empresas.is_empty());
        assert!(response.token.is_empty());
        assert!(response.session_token.is_empty());
        assert!(response.refresh_token.is_none());
    }

    #[test]
    fn login_request_serializes_camel_case() {
        let request = LoginRequest { user_name: "driver".into(), password: "secret".into() };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"userName\":\"driver\""));
        assert!(json.contains("\"password\":\"secret\""));
    }

    #[test]
    fn stored_user_roundtrip_keeps_company() {
        let session = Session {
            user_id: UserId(4),
            user_name: "driver".into(),
            role: "admin".into(),
            name: "Dana".into(),
            last_name: "Reyes".into(),
            token: "T1".into(),
            company_id: Some(CompanyId(9)),
        };
        let stored = StoredUser::from(&session);
        let json = serde_json::to_string(&stored).unwrap();
        assert!(json.contains("\"empresaId\":9"));

        let parsed: StoredUser = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.into_session("T1".into()), session);
    }

    #[test]
    fn ids_do_not_mix() {
        fn takes_user(_: UserId) {}
        fn takes_company(_: CompanyId) {}

        takes_user(UserId(1));
        takes_company(CompanyId(1));
        // takes_user(CompanyId(1));  // Compile error!
    }
}
