use reson8_db::roles::RoleRow;
use reson8_db::DbPool;
use reson8_models::permissions::Permissions;

use crate::error::CoreError;

/// Effective mask for a set of held roles: bitwise OR over every role.
pub fn effective_permissions(roles: &[RoleRow]) -> Permissions {
    let mut mask = Permissions::empty();
    for role in roles {
        mask |= Permissions::from_bits_truncate(role.permissions as u64);
    }
    mask
}

/// Effective mask for `(user, server)` from the durable role bindings.
pub async fn permissions_for(
    pool: &DbPool,
    server_id: i64,
    user_id: &str,
) -> Result<Permissions, CoreError> {
    let roles = reson8_db::roles::get_user_roles(pool, server_id, user_id).await?;
    Ok(effective_permissions(&roles))
}

pub fn require_permission(mask: Permissions, flag: Permissions) -> Result<(), CoreError> {
    if !mask.has(flag) {
        return Err(CoreError::MissingPermission);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role(permissions: u64) -> RoleRow {
        RoleRow {
            id: 1,
            server_id: 1,
            name: "r".to_string(),
            permissions: permissions as i64,
            power_level: 0,
            color: None,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn masks_or_together() {
        let mask = effective_permissions(&[
            role(Permissions::CONNECT.bits()),
            role(Permissions::SEND_MESSAGES.bits()),
        ]);
        assert!(mask.has(Permissions::CONNECT));
        assert!(mask.has(Permissions::SEND_MESSAGES));
        assert!(!mask.has(Permissions::MANAGE_ROLES));
    }

    #[test]
    fn admin_bit_short_circuits_requirements() {
        let mask = effective_permissions(&[role(Permissions::ADMIN.bits())]);
        assert!(require_permission(mask, Permissions::BAN_USER).is_ok());
        assert!(require_permission(mask, Permissions::MANAGE_CHANNELS).is_ok());
    }

    #[test]
    fn missing_flag_is_an_error() {
        let mask = effective_permissions(&[role(Permissions::CONNECT.bits())]);
        assert!(matches!(
            require_permission(mask, Permissions::MANAGE_ROLES),
            Err(CoreError::MissingPermission)
        ));
    }
}
