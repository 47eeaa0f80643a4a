use serde::{Deserialize, Serialize};

/// Strongly typed wrapper for document row IDs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct DocumentId(pub i64);

/// Strongly typed wrapper for user IDs issued by the authentication service.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Staff role as reported by the authentication service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerRole {
    Doctor,
    Nurse,
    Admin,
    /// Any role the portal does not know about; gets the least privileges.
    #[serde(other)]
    Staff,
}

impl CallerRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Doctor => "doctor",
            Self::Nurse => "nurse",
            Self::Admin => "admin",
            Self::Staff => "staff",
        }
    }

    /// Parse a role string, mapping unknown values to [`CallerRole::Staff`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "doctor" => Self::Doctor,
            "nurse" => Self::Nurse,
            "admin" => Self::Admin,
            _ => Self::Staff,
        }
    }
}

impl std::fmt::Display for CallerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated identity of whoever issued the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: UserId,
    pub role: CallerRole,
    pub department: Option<String>,
}

impl Caller {
    #[must_use]
    pub fn new(user_id: i64, role: CallerRole, department: Option<&str>) -> Self {
        Self {
            user_id: UserId(user_id),
            role,
            department: department.map(str::to_owned),
        }
    }
}
