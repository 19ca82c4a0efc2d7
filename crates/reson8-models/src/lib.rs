pub mod channel;
pub mod events;
pub mod permissions;
pub mod presence;
