use chrono::{DateTime, Duration, Utc};
use crates::domain::value_objects::subscriptions::EntitlementSnapshot;
use serde::{Deserialize, Serialize};

/// A snapshot as the client last saw it, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CachedSnapshot {
    Authoritative {
        snapshot: EntitlementSnapshot,
        fetched_at: DateTime<Utc>,
    },
    Optimistic {
        snapshot: EntitlementSnapshot,
        issued_at: DateTime<Utc>,
    },
}

impl CachedSnapshot {
    pub fn snapshot(&self) -> &EntitlementSnapshot {
        match self {
            CachedSnapshot::Authoritative { snapshot, .. }
            | CachedSnapshot::Optimistic { snapshot, .. } => snapshot,
        }
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        match self {
            CachedSnapshot::Authoritative { fetched_at, .. } => *fetched_at,
            CachedSnapshot::Optimistic { issued_at, .. } => *issued_at,
        }
    }

    pub fn is_authoritative(&self) -> bool {
        matches!(self, CachedSnapshot::Authoritative { .. })
    }

    /// The server's `isActive` answer, re-checked against the clock so a cached
    /// snapshot stops entitling once its period has ended.
    pub fn is_entitling_at(&self, now: DateTime<Utc>) -> bool {
        let snapshot = self.snapshot();
        snapshot.is_active
            && snapshot
                .current_period_end
                .is_some_and(|period_end| now < period_end)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntitlementView {
    Loading,
    Fresh(CachedSnapshot),
    Stale { cached: CachedSnapshot, age: Duration },
    /// The server could not be reached and nothing was cached.
    Unknown,
}

impl EntitlementView {
    pub fn none_at(now: DateTime<Utc>) -> Self {
        EntitlementView::Fresh(CachedSnapshot::Authoritative {
            snapshot: EntitlementSnapshot::none(),
            fetched_at: now,
        })
    }

    pub fn cached(&self) -> Option<&CachedSnapshot> {
        match self {
            EntitlementView::Fresh(cached) | EntitlementView::Stale { cached, .. } => Some(cached),
            EntitlementView::Loading | EntitlementView::Unknown => None,
        }
    }

    pub fn is_premium_at(&self, now: DateTime<Utc>) -> bool {
        self.cached()
            .is_some_and(|cached| cached.is_entitling_at(now))
    }

    pub fn is_premium_fresh_at(&self, now: DateTime<Utc>) -> bool {
        match self {
            EntitlementView::Fresh(cached) => {
                cached.is_authoritative() && cached.is_entitling_at(now)
            }
            _ => false,
        }
    }
}

/// Everything the client persists between sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalState {
    pub email: Option<String>,
    pub cached: Option<CachedSnapshot>,
    #[serde(default)]
    pub reset_requested: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crates::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;

    fn active_until(period_end: DateTime<Utc>) -> EntitlementSnapshot {
        EntitlementSnapshot {
            status: SubscriptionStatus::Active,
            current_period_end: Some(period_end),
            is_active: true,
            ..EntitlementSnapshot::none()
        }
    }

    #[test]
    fn stale_view_still_gates_premium_but_not_fresh_premium() {
        let now = Utc::now();
        let view = EntitlementView::Stale {
            cached: CachedSnapshot::Authoritative {
                snapshot: active_until(now + Duration::days(10)),
                fetched_at: now - Duration::hours(2),
            },
            age: Duration::hours(2),
        };

        assert!(view.is_premium_at(now));
        assert!(!view.is_premium_fresh_at(now));
    }

    #[test]
    fn cached_snapshot_expires_with_its_period() {
        let now = Utc::now();
        let cached = CachedSnapshot::Authoritative {
            snapshot: active_until(now),
            fetched_at: now - Duration::days(1),
        };

        assert!(cached.is_entitling_at(now - Duration::seconds(1)));
        assert!(!cached.is_entitling_at(now));
    }

    #[test]
    fn raw_active_status_without_is_active_does_not_gate() {
        let now = Utc::now();
        let mut snapshot = active_until(now + Duration::days(10));
        snapshot.is_active = false;
        let view = EntitlementView::Fresh(CachedSnapshot::Authoritative {
            snapshot,
            fetched_at: now,
        });

        assert!(!view.is_premium_at(now));
        assert!(!view.is_premium_fresh_at(now));
    }

    #[test]
    fn optimistic_snapshot_is_not_fresh_premium() {
        let now = Utc::now();
        let view = EntitlementView::Fresh(CachedSnapshot::Optimistic {
            snapshot: active_until(now + Duration::days(10)),
            issued_at: now,
        });

        assert!(view.is_premium_at(now));
        assert!(!view.is_premium_fresh_at(now));
    }

    #[test]
    fn local_state_survives_json() {
        let now = Utc::now();
        let state = LocalState {
            email: Some("a@example.com".to_string()),
            cached: Some(CachedSnapshot::Optimistic {
                snapshot: active_until(now),
                issued_at: now,
            }),
            reset_requested: false,
        };

        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"source\":\"optimistic\""));
        assert_eq!(serde_json::from_str::<LocalState>(&json).unwrap(), state);
    }
}
