//! Role administration: listings and role bindings. Every operation here
//! requires MANAGE_ROLES.

use serde::{Deserialize, Serialize};

use reson8_db::DbPool;
use reson8_models::permissions::Permissions;

use crate::error::CoreError;
use crate::permissions::{permissions_for, require_permission};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSummary {
    pub id: String,
    pub name: String,
    pub permissions: Permissions,
    pub power_level: i64,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWithRoles {
    pub user_id: String,
    pub nickname: String,
    pub roles: Vec<RoleSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleAction {
    Add,
    Remove,
}

/// Every user holding at least one role on the server, with their roles,
/// sorted by nickname ascending.
pub async fn list_role_holders(
    pool: &DbPool,
    server_id: i64,
    actor_id: &str,
) -> Result<Vec<UserWithRoles>, CoreError> {
    let mask = permissions_for(pool, server_id, actor_id).await?;
    require_permission(mask, Permissions::MANAGE_ROLES)?;

    let rows = reson8_db::roles::get_role_holders(pool, server_id).await?;
    let mut users: Vec<UserWithRoles> = Vec::new();
    for row in rows {
        let summary = RoleSummary {
            id: row.role_id.to_string(),
            name: row.role_name,
            permissions: Permissions::from_bits_truncate(row.permissions as u64),
            power_level: row.power_level,
            color: row.color,
        };
        match users.last_mut() {
            // Rows arrive sorted by nickname then power level, so holders
            // group into consecutive runs.
            Some(user) if user.user_id == row.user_id => user.roles.push(summary),
            _ => users.push(UserWithRoles {
                user_id: row.user_id,
                nickname: row.nickname,
                roles: vec![summary],
            }),
        }
    }
    Ok(users)
}

/// Every role on the server, power level descending.
pub async fn list_roles(
    pool: &DbPool,
    server_id: i64,
    actor_id: &str,
) -> Result<Vec<RoleSummary>, CoreError> {
    let mask = permissions_for(pool, server_id, actor_id).await?;
    require_permission(mask, Permissions::MANAGE_ROLES)?;

    let rows = reson8_db::roles::get_server_roles(pool, server_id).await?;
    Ok(rows
        .into_iter()
        .map(|row| RoleSummary {
            id: row.id.to_string(),
            name: row.name,
            permissions: Permissions::from_bits_truncate(row.permissions as u64),
            power_level: row.power_level,
            color: row.color,
        })
        .collect())
}

/// Bind or unbind a role, idempotently. The server does not stop a client
/// from removing its own admin role.
pub async fn assign_role(
    pool: &DbPool,
    server_id: i64,
    actor_id: &str,
    user_id: &str,
    role_id: i64,
    action: RoleAction,
) -> Result<(), CoreError> {
    let mask = permissions_for(pool, server_id, actor_id).await?;
    require_permission(mask, Permissions::MANAGE_ROLES)?;

    let role = reson8_db::roles::get_role(pool, role_id)
        .await?
        .ok_or(CoreError::NotFound("role"))?;
    if role.server_id != server_id {
        return Err(CoreError::NotFound("role"));
    }
    reson8_db::users::get_user(pool, user_id)
        .await?
        .ok_or(CoreError::NotFound("user"))?;

    match action {
        RoleAction::Add => reson8_db::roles::assign_role(pool, user_id, role_id).await?,
        RoleAction::Remove => reson8_db::roles::remove_role(pool, user_id, role_id).await?,
    }
    tracing::info!(user_id, role_id, ?action, "role binding changed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn stack() -> (DbPool, i64) {
        let pool = reson8_db::create_pool("sqlite::memory:", 1).await.unwrap();
        reson8_db::run_migrations(&pool).await.unwrap();
        let server_id = reson8_db::seed::seed_template(&pool, "test", "", 64)
            .await
            .unwrap();

        reson8_db::users::upsert_user(&pool, "admin-install", "Zoe")
            .await
            .unwrap();
        reson8_db::seed::ensure_admin_role(&pool, server_id, "admin-install")
            .await
            .unwrap();
        reson8_db::users::upsert_user(&pool, "member-install", "Ada")
            .await
            .unwrap();
        reson8_db::seed::ensure_member_role(&pool, server_id, "member-install")
            .await
            .unwrap();
        (pool, server_id)
    }

    #[tokio::test]
    async fn listings_require_manage_roles() {
        let (pool, server_id) = stack().await;

        let err = list_roles(&pool, server_id, "member-install").await.unwrap_err();
        assert!(matches!(err, CoreError::MissingPermission));

        let roles = list_roles(&pool, server_id, "admin-install").await.unwrap();
        assert_eq!(roles[0].name, "Admin");
    }

    #[tokio::test]
    async fn role_holders_group_by_user_sorted_by_nickname() {
        let (pool, server_id) = stack().await;

        let users = list_role_holders(&pool, server_id, "admin-install")
            .await
            .unwrap();
        let nicknames: Vec<&str> = users.iter().map(|u| u.nickname.as_str()).collect();
        assert_eq!(nicknames, vec!["Ada", "Zoe"]);
        assert_eq!(users[0].roles.len(), 1);
    }

    #[tokio::test]
    async fn add_then_remove_round_trips() {
        let (pool, server_id) = stack().await;
        let admin_role = reson8_db::roles::get_role_by_name(&pool, server_id, "Admin")
            .await
            .unwrap()
            .unwrap();

        assign_role(
            &pool,
            server_id,
            "admin-install",
            "member-install",
            admin_role.id,
            RoleAction::Add,
        )
        .await
        .unwrap();
        let held = reson8_db::roles::get_user_roles(&pool, server_id, "member-install")
            .await
            .unwrap();
        assert_eq!(held.len(), 2);

        assign_role(
            &pool,
            server_id,
            "admin-install",
            "member-install",
            admin_role.id,
            RoleAction::Remove,
        )
        .await
        .unwrap();
        let held = reson8_db::roles::get_user_roles(&pool, server_id, "member-install")
            .await
            .unwrap();
        assert_eq!(held.len(), 1);
    }

    #[tokio::test]
    async fn foreign_server_roles_are_invisible() {
        let (pool, server_id) = stack().await;
        reson8_db::servers::create_server(&pool, 999, "other", "", 64)
            .await
            .unwrap();
        let foreign = reson8_db::roles::create_role(&pool, 9001, 999, "Mod", 16, 10, None)
            .await
            .unwrap();

        let err = assign_role(
            &pool,
            server_id,
            "admin-install",
            "member-install",
            foreign.id,
            RoleAction::Add,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
