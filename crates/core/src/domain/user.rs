use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Identity-provider user id (e.g. `user_2abc...`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Administrator,
    SalesManager,
    SalesRepresentative,
    Support,
}

impl Role {
    pub const ALL: [Role; 4] =
        [Self::Administrator, Self::SalesManager, Self::SalesRepresentative, Self::Support];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::SalesManager => "sales_manager",
            Self::SalesRepresentative => "sales_representative",
            Self::Support => "support",
        }
    }

    /// Higher ranks may decide approvals routed to lower ranks.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Administrator => 3,
            Self::SalesManager => 2,
            Self::SalesRepresentative => 1,
            Self::Support => 0,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let key = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match key.as_str() {
            "administrator" | "admin" => Ok(Self::Administrator),
            "sales_manager" | "manager" => Ok(Self::SalesManager),
            "sales_representative" | "sales_rep" | "rep" => Ok(Self::SalesRepresentative),
            "support" => Ok(Self::Support),
            _ => Err(DomainError::Validation(format!("unknown role `{value}`"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermissions {
    pub role: Role,
    pub max_discount_pct: Decimal,
    pub can_approve_discounts: bool,
    pub can_manage_catalog: bool,
    pub can_manage_users: bool,
}

impl RolePermissions {
    pub fn defaults_for(role: Role) -> Self {
        match role {
            Role::Administrator => Self {
                role,
                max_discount_pct: Decimal::from(100),
                can_approve_discounts: true,
                can_manage_catalog: true,
                can_manage_users: true,
            },
            Role::SalesManager => Self {
                role,
                max_discount_pct: Decimal::from(20),
                can_approve_discounts: true,
                can_manage_catalog: true,
                can_manage_users: false,
            },
            Role::SalesRepresentative => Self {
                role,
                max_discount_pct: Decimal::from(10),
                can_approve_discounts: false,
                can_manage_catalog: false,
                can_manage_users: false,
            },
            Role::Support => Self {
                role,
                max_discount_pct: Decimal::ZERO,
                can_approve_discounts: false,
                can_manage_catalog: false,
                can_manage_users: false,
            },
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.max_discount_pct < Decimal::ZERO || self.max_discount_pct > Decimal::from(100) {
            return Err(DomainError::Validation(format!(
                "max_discount_pct for `{}` must be in range 0..=100",
                self.role
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect();
        if parts.is_empty() {
            self.email.clone()
        } else {
            parts.join(" ")
        }
    }
}

/// The authenticated user behind a request together with the permissions of
/// their role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub user: User,
    pub permissions: RolePermissions,
}

impl Actor {
    pub fn id(&self) -> &UserId {
        &self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.role
    }
}
