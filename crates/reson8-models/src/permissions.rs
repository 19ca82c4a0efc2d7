use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permissions: u64 {
        const CONNECT         = 1 << 0;
        const SPEAK           = 1 << 1;
        const SEND_MESSAGES   = 1 << 2;
        const CREATE_CHANNEL  = 1 << 3;
        const MANAGE_CHANNELS = 1 << 4;
        const MANAGE_ROLES    = 1 << 5;
        const KICK_USER       = 1 << 6;
        const BAN_USER        = 1 << 7;
        const ADMIN           = 1 << 8;
    }
}

impl Permissions {
    /// Flag test with the ADMIN short-circuit: an admin mask passes every check.
    pub fn has(self, flag: Permissions) -> bool {
        self.contains(Permissions::ADMIN) || self.contains(flag)
    }
}

// Serialized as a decimal string: the mask is 64 bits wide and JSON numbers
// lose integer precision past 2^53.
impl Serialize for Permissions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.bits().to_string())
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let bits = raw
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("permissions must be a decimal string"))?;
        Ok(Permissions::from_bits_truncate(bits))
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::CONNECT | Self::SPEAK | Self::SEND_MESSAGES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_speak_mask_passes_speak_only() {
        let mask = Permissions::CONNECT | Permissions::SPEAK;
        assert_eq!(mask.bits(), 3);
        assert!(mask.has(Permissions::SPEAK));
        assert!(!mask.has(Permissions::MANAGE_ROLES));
    }

    #[test]
    fn admin_mask_passes_every_flag() {
        let mask = Permissions::ADMIN;
        assert_eq!(mask.bits(), 256);
        for flag in Permissions::all().iter() {
            assert!(mask.has(flag), "ADMIN must imply {flag:?}");
        }
        assert!(mask.has(Permissions::KICK_USER));
    }

    #[test]
    fn serializes_as_decimal_string() {
        let mask = Permissions::CONNECT | Permissions::MANAGE_CHANNELS;
        let json = serde_json::to_string(&mask).unwrap();
        assert_eq!(json, "\"17\"");
        let back: Permissions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, mask);
    }
}
