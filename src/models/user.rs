use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Superadmin,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Permission {
    /// Review top-ups, list payments and set balances.
    ManagePoints,
    ManageUsers,
    ManagePurchases,
    ManageScripts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub discord_id: String,
    pub username: String,
    pub avatar: Option<String>,
    pub points: i64,
    pub role: Role,
    pub permissions: Vec<Permission>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role >= Role::Admin
    }

    /// Superadmins hold every permission; admins hold only what they were granted.
    pub fn has_permission(&self, permission: Permission) -> bool {
        match self.role {
            Role::Superadmin => true,
            Role::Admin => self.permissions.contains(&permission),
            Role::User => false,
        }
    }
}

/// Profile data handed over by the Discord OAuth flow.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordProfile {
    pub discord_id: String,
    pub username: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRoles {
    pub role: Role,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl UpdateUserRoles {
    /// Plain users carry no permissions, superadmins carry all of them,
    /// and admin grants are deduplicated.
    pub fn normalized_permissions(&self) -> Vec<Permission> {
        match self.role {
            Role::User => Vec::new(),
            Role::Superadmin => Permission::iter().collect(),
            Role::Admin => Permission::iter()
                .filter(|p| self.permissions.contains(p))
                .collect(),
        }
    }
}
