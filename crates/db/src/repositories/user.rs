use homequote_core::domain::user::{Role, RolePermissions, User, UserId};

use super::{
    column, decimal_column, parsed_column, timestamp_column, RepositoryError,
    RolePermissionRepository, UserRepository,
};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    Ok(User {
        id: UserId(column(row, "id")?),
        email: column(row, "email")?,
        first_name: column(row, "first_name")?,
        last_name: column(row, "last_name")?,
        role: parsed_column(row, "role")?,
        active: column(row, "active")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, email, first_name, last_name, role, active, created_at, updated_at
             FROM app_user WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_user(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO app_user (id, email, first_name, last_name, role, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 email = excluded.email,
                 first_name = excluded.first_name,
                 last_name = excluded.last_name,
                 role = excluded.role,
                 active = excluded.active,
                 updated_at = excluded.updated_at",
        )
        .bind(&user.id.0)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(user.active)
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, email, first_name, last_name, role, active, created_at, updated_at
             FROM app_user ORDER BY email ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect::<Result<Vec<_>, _>>()
    }

    async fn count_active_with_role(&self, role: Role) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM app_user WHERE role = ? AND active = 1")
                .bind(role.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

pub struct SqlRolePermissionRepository {
    pool: DbPool,
}

impl SqlRolePermissionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_permissions(row: &sqlx::sqlite::SqliteRow) -> Result<RolePermissions, RepositoryError> {
    Ok(RolePermissions {
        role: parsed_column(row, "role")?,
        max_discount_pct: decimal_column(row, "max_discount_pct")?,
        can_approve_discounts: column(row, "can_approve_discounts")?,
        can_manage_catalog: column(row, "can_manage_catalog")?,
        can_manage_users: column(row, "can_manage_users")?,
    })
}

#[async_trait::async_trait]
impl RolePermissionRepository for SqlRolePermissionRepository {
    async fn list(&self) -> Result<Vec<RolePermissions>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT role, max_discount_pct, can_approve_discounts, can_manage_catalog, can_manage_users
             FROM role_permission",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut permissions = rows.iter().map(row_to_permissions).collect::<Result<Vec<_>, _>>()?;
        permissions.sort_by_key(|entry| std::cmp::Reverse(entry.role.rank()));
        Ok(permissions)
    }

    async fn save(&self, permissions: RolePermissions) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO role_permission (role, max_discount_pct, can_approve_discounts,
                                          can_manage_catalog, can_manage_users)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(role) DO UPDATE SET
                 max_discount_pct = excluded.max_discount_pct,
                 can_approve_discounts = excluded.can_approve_discounts,
                 can_manage_catalog = excluded.can_manage_catalog,
                 can_manage_users = excluded.can_manage_users",
        )
        .bind(permissions.role.as_str())
        .bind(permissions.max_discount_pct.to_string())
        .bind(permissions.can_approve_discounts)
        .bind(permissions.can_manage_catalog)
        .bind(permissions.can_manage_users)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
