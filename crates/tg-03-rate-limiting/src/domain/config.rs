//! # Limit Configuration
//!
//! A limit is a comma separated list of `capacity:seconds` tiers:
//!
//! ```text
//! "100:1,2000:60"   at most 100 per second AND at most 2000 per minute
//! ```

use crate::domain::errors::RateLimitConfigError;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;

/// Default tenant limits.
pub const DEFAULT_TENANT_CONFIGURATION: &str = "100:1,2000:60";
/// Default customer limits.
pub const DEFAULT_CUSTOMER_CONFIGURATION: &str = "50:1,1000:60";

/// One tier: `capacity` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierSpec {
    /// Requests allowed per window.
    pub capacity: NonZeroU32,
    /// Window length.
    pub window: Duration,
}

/// Parses `"100:1,2000:60"`. Whitespace around tiers is ignored.
pub fn parse_configuration(configuration: &str) -> Result<Vec<TierSpec>, RateLimitConfigError> {
    let tiers = configuration
        .split(',')
        .map(str::trim)
        .filter(|tier| !tier.is_empty())
        .map(parse_tier)
        .collect::<Result<Vec<_>, _>>()?;
    if tiers.is_empty() {
        return Err(RateLimitConfigError::Empty);
    }
    Ok(tiers)
}

fn parse_tier(tier: &str) -> Result<TierSpec, RateLimitConfigError> {
    let invalid = || RateLimitConfigError::InvalidTier(tier.to_string());
    let (capacity, seconds) = tier.split_once(':').ok_or_else(invalid)?;
    let capacity: u32 = capacity.trim().parse().map_err(|_| invalid())?;
    let seconds: u64 = seconds.trim().parse().map_err(|_| invalid())?;
    match (NonZeroU32::new(capacity), seconds) {
        (Some(capacity), seconds) if seconds > 0 => Ok(TierSpec {
            capacity,
            window: Duration::from_secs(seconds),
        }),
        _ => Err(RateLimitConfigError::ZeroTier(tier.to_string())),
    }
}

/// Limits for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityLimitConfig {
    /// Apply the limit at all.
    pub enabled: bool,
    /// Tier list.
    pub configuration: String,
}

/// Tenant and customer limits. Both disabled by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitsConfig {
    /// Per tenant limits.
    pub tenant: EntityLimitConfig,
    /// Per customer limits.
    pub customer: EntityLimitConfig,
}

impl Default for EntityLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            configuration: DEFAULT_TENANT_CONFIGURATION.to_string(),
        }
    }
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            tenant: EntityLimitConfig::default(),
            customer: EntityLimitConfig {
                enabled: false,
                configuration: DEFAULT_CUSTOMER_CONFIGURATION.to_string(),
            },
        }
    }
}

impl RateLimitsConfig {
    /// Checks that every enabled limit parses.
    pub fn validate(&self) -> Result<(), RateLimitConfigError> {
        for limit in [&self.tenant, &self.customer] {
            if limit.enabled {
                parse_configuration(&limit.configuration)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_tiers() {
        let tiers = parse_configuration("100:1,2000:60").unwrap();
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].capacity.get(), 100);
        assert_eq!(tiers[0].window, Duration::from_secs(1));
        assert_eq!(tiers[1].capacity.get(), 2000);
        assert_eq!(tiers[1].window, Duration::from_secs(60));
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        let tiers = parse_configuration(" 5:1 , 10:2 ,").unwrap();
        assert_eq!(tiers.len(), 2);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(parse_configuration(""), Err(RateLimitConfigError::Empty));
        assert!(matches!(
            parse_configuration("100"),
            Err(RateLimitConfigError::InvalidTier(_))
        ));
        assert!(matches!(
            parse_configuration("a:1"),
            Err(RateLimitConfigError::InvalidTier(_))
        ));
        assert!(matches!(
            parse_configuration("0:1"),
            Err(RateLimitConfigError::ZeroTier(_))
        ));
        assert!(matches!(
            parse_configuration("10:0"),
            Err(RateLimitConfigError::ZeroTier(_))
        ));
    }

    #[test]
    fn test_defaults_are_disabled() {
        let config = RateLimitsConfig::default();
        assert!(!config.tenant.enabled);
        assert!(!config.customer.enabled);
        assert_eq!(config.customer.configuration, DEFAULT_CUSTOMER_CONFIGURATION);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_only_checks_enabled() {
        let mut config = RateLimitsConfig::default();
        config.tenant.configuration = "junk".into();
        assert!(config.validate().is_ok());
        config.tenant.enabled = true;
        assert!(config.validate().is_err());
    }
}
