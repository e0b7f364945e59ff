use serde::{Deserialize, Serialize};

/// The closed set of roles known to the system. Shared by every component;
/// never re-declared elsewhere.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Employee,
    Manager,
    Cfo,
    Director,
    Admin,
}

/// Roles whose members are eligible to approve expenses.
pub const ELEVATED_ROLES: [Role; 4] = [Role::Manager, Role::Cfo, Role::Director, Role::Admin];

impl Role {
    pub fn is_elevated(self) -> bool {
        ELEVATED_ROLES.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Employee => "Employee",
            Self::Manager => "Manager",
            Self::Cfo => "CFO",
            Self::Director => "Director",
            Self::Admin => "Admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "employee" => Some(Self::Employee),
            "manager" => Some(Self::Manager),
            "cfo" => Some(Self::Cfo),
            "director" => Some(Self::Director),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
