//! Volatile who-is-where store.
//!
//! All multi-key updates run under one mutex, so a reader never observes a
//! user in two channels or in a channel without being on the server. Entries
//! carry a TTL (refreshed on channel change); expired entries are purged on
//! access and by the server's periodic sweep.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use reson8_models::presence::{ChannelOccupancy, Occupant, PresenceSnapshot};

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
struct PresenceEntry {
    server_id: i64,
    channel_id: Option<i64>,
    nickname: String,
    expires_at: Instant,
}

#[derive(Default)]
struct PresenceInner {
    servers: HashMap<i64, HashSet<String>>,
    channels: HashMap<i64, HashSet<String>>,
    users: HashMap<String, PresenceEntry>,
}

impl PresenceInner {
    fn purge_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .users
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(user, _)| user.clone())
            .collect();
        for user in expired {
            self.evict(&user);
        }
    }

    fn evict(&mut self, user_id: &str) {
        if let Some(entry) = self.users.remove(user_id) {
            if let Some(members) = self.servers.get_mut(&entry.server_id) {
                members.remove(user_id);
                if members.is_empty() {
                    self.servers.remove(&entry.server_id);
                }
            }
            if let Some(channel_id) = entry.channel_id {
                self.remove_from_channel(channel_id, user_id);
            }
        }
    }

    fn remove_from_channel(&mut self, channel_id: i64, user_id: &str) {
        if let Some(members) = self.channels.get_mut(&channel_id) {
            members.remove(user_id);
            if members.is_empty() {
                self.channels.remove(&channel_id);
            }
        }
    }
}

pub struct PresenceStore {
    ttl: Duration,
    inner: Mutex<PresenceInner>,
}

impl PresenceStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(PresenceInner::default()),
        }
    }

    /// Register the user as online on a server, with no channel.
    pub fn join_server(&self, user_id: &str, server_id: i64, nickname: &str) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        inner.purge_expired(now);
        // A re-join replaces any stale placement.
        inner.evict(user_id);
        inner
            .servers
            .entry(server_id)
            .or_default()
            .insert(user_id.to_string());
        inner.users.insert(
            user_id.to_string(),
            PresenceEntry {
                server_id,
                channel_id: None,
                nickname: nickname.to_string(),
                expires_at: now + self.ttl,
            },
        );
    }

    /// Move the user into a channel: leaves the previous channel, joins the
    /// new one, refreshes the TTL. One lock, all or nothing.
    pub fn join_channel(&self, user_id: &str, channel_id: i64) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        inner.purge_expired(now);

        let Some(mut entry) = inner.users.remove(user_id) else {
            return false;
        };
        if let Some(previous) = entry.channel_id {
            inner.remove_from_channel(previous, user_id);
        }
        inner
            .channels
            .entry(channel_id)
            .or_default()
            .insert(user_id.to_string());
        entry.channel_id = Some(channel_id);
        entry.expires_at = now + self.ttl;
        inner.users.insert(user_id.to_string(), entry);
        true
    }

    /// Take the user out of its channel, keeping it on the server.
    pub fn leave_channel(&self, user_id: &str) -> Option<i64> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        inner.purge_expired(now);

        let mut entry = inner.users.remove(user_id)?;
        let previous = entry.channel_id.take();
        if let Some(previous) = previous {
            inner.remove_from_channel(previous, user_id);
        }
        entry.expires_at = now + self.ttl;
        inner.users.insert(user_id.to_string(), entry);
        previous
    }

    /// Drop the user from the server and whatever channel it was in.
    pub fn leave_server(&self, user_id: &str, _server_id: i64) {
        let mut inner = self.inner.lock().unwrap();
        inner.evict(user_id);
    }

    pub fn server_users(&self, server_id: i64) -> Vec<Occupant> {
        let mut inner = self.inner.lock().unwrap();
        inner.purge_expired(Instant::now());
        let Some(members) = inner.servers.get(&server_id) else {
            return Vec::new();
        };
        let mut users: Vec<Occupant> = members
            .iter()
            .filter_map(|user_id| {
                inner.users.get(user_id).map(|entry| Occupant {
                    user_id: user_id.clone(),
                    nickname: entry.nickname.clone(),
                })
            })
            .collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }

    pub fn channel_users(&self, channel_id: i64) -> Vec<Occupant> {
        let mut inner = self.inner.lock().unwrap();
        inner.purge_expired(Instant::now());
        let Some(members) = inner.channels.get(&channel_id) else {
            return Vec::new();
        };
        let mut users: Vec<Occupant> = members
            .iter()
            .filter_map(|user_id| {
                inner.users.get(user_id).map(|entry| Occupant {
                    user_id: user_id.clone(),
                    nickname: entry.nickname.clone(),
                })
            })
            .collect();
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }

    pub fn channel_of(&self, user_id: &str) -> Option<i64> {
        let mut inner = self.inner.lock().unwrap();
        inner.purge_expired(Instant::now());
        inner.users.get(user_id).and_then(|entry| entry.channel_id)
    }

    /// Full per-channel occupancy for one server, for PRESENCE_UPDATE.
    pub fn snapshot(&self, server_id: i64) -> PresenceSnapshot {
        let mut inner = self.inner.lock().unwrap();
        inner.purge_expired(Instant::now());

        let mut by_channel: HashMap<i64, Vec<Occupant>> = HashMap::new();
        for (user_id, entry) in &inner.users {
            if entry.server_id != server_id {
                continue;
            }
            if let Some(channel_id) = entry.channel_id {
                by_channel.entry(channel_id).or_default().push(Occupant {
                    user_id: user_id.clone(),
                    nickname: entry.nickname.clone(),
                });
            }
        }

        let mut channels: Vec<ChannelOccupancy> = by_channel
            .into_iter()
            .map(|(channel_id, mut users)| {
                users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
                ChannelOccupancy {
                    channel_id: channel_id.to_string(),
                    users,
                }
            })
            .collect();
        channels.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
        PresenceSnapshot {
            server_id: server_id.to_string(),
            channels,
        }
    }

    /// Drop every expired entry. The server runs this on an interval so idle
    /// ghosts disappear even without traffic.
    pub fn sweep(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.purge_expired(Instant::now());
    }
}

impl Default for PresenceStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
