use crate::{channels, roles, servers, DbError, DbPool};
use reson8_models::permissions::Permissions;
use reson8_util::snowflake;

pub const MEMBER_ROLE: &str = "Member";
pub const ADMIN_ROLE: &str = "Admin";

/// Opt-in template seed: one server, a default channel pair and the
/// Member/Admin roles. Idempotent — an existing server row short-circuits.
pub async fn seed_template(
    pool: &DbPool,
    server_name: &str,
    address: &str,
    max_clients: i64,
) -> Result<i64, DbError> {
    if let Some(existing) = servers::default_server(pool).await? {
        return Ok(existing.id);
    }

    let server = servers::create_server(pool, snowflake::generate(), server_name, address, max_clients).await?;
    tracing::info!(server_id = server.id, name = server_name, "seeded server");

    channels::create_channel(
        pool,
        snowflake::generate(),
        server.id,
        "General",
        "TEXT",
        None,
        0,
        None,
    )
    .await?;
    channels::create_channel(
        pool,
        snowflake::generate(),
        server.id,
        "Lobby",
        "VOICE",
        None,
        1,
        None,
    )
    .await?;

    let member = Permissions::CONNECT | Permissions::SPEAK | Permissions::SEND_MESSAGES;
    roles::create_role(
        pool,
        snowflake::generate(),
        server.id,
        MEMBER_ROLE,
        member.bits() as i64,
        1,
        None,
    )
    .await?;
    roles::create_role(
        pool,
        snowflake::generate(),
        server.id,
        ADMIN_ROLE,
        Permissions::ADMIN.bits() as i64,
        100,
        Some("#d97706"),
    )
    .await?;

    Ok(server.id)
}

/// Make sure a joining user holds the server's default role.
pub async fn ensure_member_role(
    pool: &DbPool,
    server_id: i64,
    user_id: &str,
) -> Result<(), DbError> {
    if let Some(role) = roles::get_role_by_name(pool, server_id, MEMBER_ROLE).await? {
        roles::assign_role(pool, user_id, role.id).await?;
    }
    Ok(())
}

/// The configured admin installation id gets the Admin role on join.
pub async fn ensure_admin_role(
    pool: &DbPool,
    server_id: i64,
    user_id: &str,
) -> Result<(), DbError> {
    if let Some(role) = roles::get_role_by_name(pool, server_id, ADMIN_ROLE).await? {
        roles::assign_role(pool, user_id, role.id).await?;
    }
    Ok(())
}
