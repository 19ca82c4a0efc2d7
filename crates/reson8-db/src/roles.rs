use crate::{DbError, DbPool};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoleRow {
    pub id: i64,
    pub server_id: i64,
    pub name: String,
    pub permissions: i64,
    pub power_level: i64,
    pub color: Option<String>,
    pub created_at: String,
}

const COLUMNS: &str = "id, server_id, name, permissions, power_level, color, created_at";

pub async fn create_role(
    pool: &DbPool,
    id: i64,
    server_id: i64,
    name: &str,
    permissions: i64,
    power_level: i64,
    color: Option<&str>,
) -> Result<RoleRow, DbError> {
    let row = sqlx::query_as::<_, RoleRow>(
        "INSERT INTO roles (id, server_id, name, permissions, power_level, color, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         RETURNING id, server_id, name, permissions, power_level, color, created_at",
    )
    .bind(id)
    .bind(server_id)
    .bind(name)
    .bind(permissions)
    .bind(power_level)
    .bind(color)
    .bind(reson8_util::time::now_rfc3339())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_role(pool: &DbPool, id: i64) -> Result<Option<RoleRow>, DbError> {
    let row = sqlx::query_as::<_, RoleRow>(&format!("SELECT {COLUMNS} FROM roles WHERE id = ?1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn get_role_by_name(
    pool: &DbPool,
    server_id: i64,
    name: &str,
) -> Result<Option<RoleRow>, DbError> {
    let row = sqlx::query_as::<_, RoleRow>(&format!(
        "SELECT {COLUMNS} FROM roles WHERE server_id = ?1 AND name = ?2"
    ))
    .bind(server_id)
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Administrative listing order: strongest role first.
pub async fn get_server_roles(pool: &DbPool, server_id: i64) -> Result<Vec<RoleRow>, DbError> {
    let rows = sqlx::query_as::<_, RoleRow>(&format!(
        "SELECT {COLUMNS} FROM roles WHERE server_id = ?1 ORDER BY power_level DESC, id"
    ))
    .bind(server_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_user_roles(
    pool: &DbPool,
    server_id: i64,
    user_id: &str,
) -> Result<Vec<RoleRow>, DbError> {
    let rows = sqlx::query_as::<_, RoleRow>(
        "SELECT r.id, r.server_id, r.name, r.permissions, r.power_level, r.color, r.created_at
         FROM roles r
         INNER JOIN role_assignments ra ON ra.role_id = r.id
         WHERE ra.user_id = ?1 AND r.server_id = ?2
         ORDER BY r.power_level DESC, r.id",
    )
    .bind(user_id)
    .bind(server_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn assign_role(pool: &DbPool, user_id: &str, role_id: i64) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO role_assignments (user_id, role_id) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(role_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn remove_role(pool: &DbPool, user_id: &str, role_id: i64) -> Result<(), DbError> {
    sqlx::query("DELETE FROM role_assignments WHERE user_id = ?1 AND role_id = ?2")
        .bind(user_id)
        .bind(role_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// A user together with one held role, one row per (user, role) pair.
/// The admin service groups these into users-with-roles.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoleHolderRow {
    pub user_id: String,
    pub nickname: String,
    pub role_id: i64,
    pub role_name: String,
    pub permissions: i64,
    pub power_level: i64,
    pub color: Option<String>,
}

pub async fn get_role_holders(pool: &DbPool, server_id: i64) -> Result<Vec<RoleHolderRow>, DbError> {
    let rows = sqlx::query_as::<_, RoleHolderRow>(
        "SELECT u.id AS user_id, u.nickname,
                r.id AS role_id, r.name AS role_name,
                r.permissions, r.power_level, r.color
         FROM users u
         INNER JOIN role_assignments ra ON ra.user_id = u.id
         INNER JOIN roles r ON r.id = ra.role_id
         WHERE r.server_id = ?1
         ORDER BY u.nickname ASC, r.power_level DESC",
    )
    .bind(server_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pool;

    #[tokio::test]
    async fn assignment_is_idempotent() {
        let pool = test_pool().await;
        crate::servers::create_server(&pool, 1, "test", "", 64)
            .await
            .unwrap();
        crate::users::upsert_user(&pool, "install-0001", "Ada")
            .await
            .unwrap();
        create_role(&pool, 50, 1, "Member", 7, 1, None).await.unwrap();

        assign_role(&pool, "install-0001", 50).await.unwrap();
        assign_role(&pool, "install-0001", 50).await.unwrap();

        let roles = get_user_roles(&pool, 1, "install-0001").await.unwrap();
        assert_eq!(roles.len(), 1);

        remove_role(&pool, "install-0001", 50).await.unwrap();
        remove_role(&pool, "install-0001", 50).await.unwrap();
        assert!(get_user_roles(&pool, 1, "install-0001").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_roles_order_by_power_descending() {
        let pool = test_pool().await;
        crate::servers::create_server(&pool, 1, "test", "", 64)
            .await
            .unwrap();
        create_role(&pool, 50, 1, "Member", 7, 1, None).await.unwrap();
        create_role(&pool, 51, 1, "Admin", 256, 100, Some("#d97706"))
            .await
            .unwrap();

        let roles = get_server_roles(&pool, 1).await.unwrap();
        assert_eq!(roles[0].name, "Admin");
        assert_eq!(roles[1].name, "Member");
    }
}
