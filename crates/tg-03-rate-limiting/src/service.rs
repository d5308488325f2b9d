//! # Rate Limit Registry
//!
//! Lazily created buckets per tenant and per customer. A bucket is created
//! at most once per id: racing first requests for an unseen id share the
//! bucket that won the insert.

use crate::algorithms::MultiTierBucket;
use crate::domain::{
    parse_configuration, RateLimitConfigError, RateLimitError, RateLimitsConfig, TierSpec,
};
use crate::ports::RateLimitApi;
use dashmap::DashMap;
use governor::clock::{Clock, DefaultClock};
use shared_types::{EntityType, SecurityUser};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

struct Buckets<C: Clock> {
    tiers: Option<Vec<TierSpec>>,
    by_id: DashMap<Uuid, Arc<MultiTierBucket<C>>>,
}

impl<C: Clock + Clone> Buckets<C> {
    fn new(enabled: bool, configuration: &str) -> Result<Self, RateLimitConfigError> {
        let tiers = if enabled {
            Some(parse_configuration(configuration)?)
        } else {
            None
        };
        Ok(Self {
            tiers,
            by_id: DashMap::new(),
        })
    }

    fn try_consume(&self, id: Uuid, clock: &C, entity_type: EntityType) -> bool {
        let Some(tiers) = &self.tiers else {
            return true;
        };
        let bucket = self
            .by_id
            .entry(id)
            .or_insert_with(|| {
                debug!("[tg-03] Creating rate limit bucket for {} {}", entity_type, id);
                Arc::new(MultiTierBucket::with_clock(tiers, clock))
            })
            .clone();
        bucket.try_consume()
    }
}

/// Per tenant and per customer admission control.
pub struct RateLimitRegistry<C: Clock = DefaultClock> {
    tenants: Buckets<C>,
    customers: Buckets<C>,
    clock: C,
}

impl RateLimitRegistry<DefaultClock> {
    /// Registry on the system clock.
    pub fn new(config: &RateLimitsConfig) -> Result<Self, RateLimitConfigError> {
        Self::with_clock(config, DefaultClock::default())
    }
}

impl<C: Clock + Clone> RateLimitRegistry<C> {
    /// Registry on an explicit clock.
    pub fn with_clock(config: &RateLimitsConfig, clock: C) -> Result<Self, RateLimitConfigError> {
        Ok(Self {
            tenants: Buckets::new(config.tenant.enabled, &config.tenant.configuration)?,
            customers: Buckets::new(config.customer.enabled, &config.customer.configuration)?,
            clock,
        })
    }

    /// Takes one request from the budget of a tenant or customer.
    ///
    /// Always admits when the limit for that entity type is disabled, and
    /// for entity types that carry no limit.
    pub fn try_consume(&self, entity_type: EntityType, id: Uuid) -> bool {
        match entity_type {
            EntityType::Tenant => self.tenants.try_consume(id, &self.clock, entity_type),
            EntityType::Customer => self.customers.try_consume(id, &self.clock, entity_type),
            _ => true,
        }
    }

    /// Number of ids with a bucket.
    pub fn tracked(&self, entity_type: EntityType) -> usize {
        match entity_type {
            EntityType::Tenant => self.tenants.by_id.len(),
            EntityType::Customer => self.customers.by_id.len(),
            _ => 0,
        }
    }
}

impl<C: Clock + Clone + Send + Sync> RateLimitApi for RateLimitRegistry<C>
where
    C::Instant: Send + Sync,
{
    /// System administrators are exempt. Tenant budget first, then the
    /// customer budget for customer users.
    fn check_user(&self, user: &SecurityUser) -> Result<(), RateLimitError> {
        if user.is_system_admin() {
            return Ok(());
        }
        if !self.try_consume(EntityType::Tenant, user.tenant_id) {
            warn!("[tg-03] Tenant {} exceeded its request budget", user.tenant_id);
            return Err(RateLimitError::Tenant);
        }
        if let (true, Some(customer_id)) = (user.is_customer_user(), user.customer_id) {
            if !self.try_consume(EntityType::Customer, customer_id) {
                warn!("[tg-03] Customer {} exceeded its request budget", customer_id);
                return Err(RateLimitError::Customer);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityLimitConfig;
    use governor::clock::FakeRelativeClock;
    use shared_types::Authority;
    use std::time::Duration;

    fn config(tenant: &str, customer: &str) -> RateLimitsConfig {
        RateLimitsConfig {
            tenant: EntityLimitConfig {
                enabled: true,
                configuration: tenant.into(),
            },
            customer: EntityLimitConfig {
                enabled: true,
                configuration: customer.into(),
            },
        }
    }

    fn registry(tenant: &str, customer: &str) -> (RateLimitRegistry<FakeRelativeClock>, FakeRelativeClock) {
        let clock = FakeRelativeClock::default();
        let registry = RateLimitRegistry::with_clock(&config(tenant, customer), clock.clone()).unwrap();
        (registry, clock)
    }

    fn user(authority: Authority, customer_id: Option<Uuid>) -> SecurityUser {
        SecurityUser {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            customer_id,
            authority,
        }
    }

    #[test]
    fn test_window_resets() {
        let (registry, clock) = registry("2:1", "2:1");
        let tenant = Uuid::new_v4();
        assert!(registry.try_consume(EntityType::Tenant, tenant));
        assert!(registry.try_consume(EntityType::Tenant, tenant));
        assert!(!registry.try_consume(EntityType::Tenant, tenant));

        clock.advance(Duration::from_secs(1));
        assert!(registry.try_consume(EntityType::Tenant, tenant));
    }

    #[test]
    fn test_tenants_do_not_interfere() {
        let (registry, _clock) = registry("1:60", "1:60");
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(registry.try_consume(EntityType::Tenant, a));
        assert!(!registry.try_consume(EntityType::Tenant, a));
        assert!(registry.try_consume(EntityType::Tenant, b));
        assert_eq!(registry.tracked(EntityType::Tenant), 2);
    }

    #[test]
    fn test_disabled_limits_admit_everything() {
        let registry = RateLimitRegistry::new(&RateLimitsConfig::default()).unwrap();
        let tenant = Uuid::new_v4();
        for _ in 0..1000 {
            assert!(registry.try_consume(EntityType::Tenant, tenant));
        }
        assert_eq!(registry.tracked(EntityType::Tenant), 0);
    }

    #[test]
    fn test_invalid_configuration_is_rejected() {
        let result = RateLimitRegistry::new(&config("oops", "1:1"));
        assert!(result.is_err());
    }

    #[test]
    fn test_check_user_exempts_sysadmin() {
        let (registry, _clock) = registry("1:60", "1:60");
        let admin = user(Authority::SysAdmin, None);
        for _ in 0..10 {
            assert_eq!(registry.check_user(&admin), Ok(()));
        }
    }

    #[test]
    fn test_check_user_tenant_then_customer() {
        let (registry, _clock) = registry("5:60", "1:60");
        let customer_user = user(Authority::CustomerUser, Some(Uuid::new_v4()));

        assert_eq!(registry.check_user(&customer_user), Ok(()));
        assert_eq!(
            registry.check_user(&customer_user),
            Err(RateLimitError::Customer)
        );

        let tenant_admin = SecurityUser {
            authority: Authority::TenantAdmin,
            customer_id: None,
            ..customer_user
        };
        // Two tenant tokens spent above, three left.
        for _ in 0..3 {
            assert_eq!(registry.check_user(&tenant_admin), Ok(()));
        }
        assert_eq!(registry.check_user(&tenant_admin), Err(RateLimitError::Tenant));
    }

    #[test]
    fn test_first_requests_share_one_bucket() {
        let (registry, _clock) = registry("100:60", "1:1");
        let registry = Arc::new(registry);
        let tenant = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .filter(|_| registry.try_consume(EntityType::Tenant, tenant))
                        .count()
                })
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(admitted, 100);
        assert_eq!(registry.tracked(EntityType::Tenant), 1);
    }
}
