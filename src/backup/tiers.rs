// dbcapture/src/backup/tiers.rs
use chrono::{DateTime, Datelike, TimeZone, Timelike};
use std::fmt;

use crate::errors::{BackupError, Result};

/// Retention tier an artifact copy lands in. Declaration order is upload order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Hot,
    Daily,
    Monthly,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Hot, Tier::Daily, Tier::Monthly];

    /// The primary copy; every other tier is a secondary retention copy.
    pub fn is_primary(self) -> bool {
        self == Tier::Hot
    }

    pub fn name(self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Daily => "daily",
            Tier::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Object-key prefixes and activation thresholds for each tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPolicy {
    pub hot_prefix: String,
    pub daily_prefix: String,
    pub monthly_prefix: String,
    pub daily_hour: u32,
    pub monthly_day: u32,
}

impl Default for TierPolicy {
    fn default() -> Self {
        TierPolicy {
            hot_prefix: Tier::Hot.name().to_string(),
            daily_prefix: Tier::Daily.name().to_string(),
            monthly_prefix: Tier::Monthly.name().to_string(),
            daily_hour: 3,
            monthly_day: 1,
        }
    }
}

impl TierPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.daily_hour > 23 {
            return Err(BackupError::Config(format!(
                "daily hour must be between 0 and 23, got {}",
                self.daily_hour
            )));
        }
        if !(1..=31).contains(&self.monthly_day) {
            return Err(BackupError::Config(format!(
                "monthly day must be between 1 and 31, got {}",
                self.monthly_day
            )));
        }
        for tier in Tier::ALL {
            if self.prefix(tier).trim_matches('/').is_empty() {
                return Err(BackupError::Config(format!(
                    "{} tier prefix cannot be empty",
                    tier
                )));
            }
        }
        Ok(())
    }

    pub fn prefix(&self, tier: Tier) -> &str {
        match tier {
            Tier::Hot => &self.hot_prefix,
            Tier::Daily => &self.daily_prefix,
            Tier::Monthly => &self.monthly_prefix,
        }
    }

    fn is_active<Tz: TimeZone>(&self, tier: Tier, now: &DateTime<Tz>) -> bool {
        match tier {
            Tier::Hot => true,
            Tier::Daily => now.hour() == self.daily_hour,
            Tier::Monthly => now.day() == self.monthly_day,
        }
    }

    /// Tiers that receive a copy when uploading at `now`, hot first.
    pub fn plan<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Vec<Tier> {
        Tier::ALL
            .into_iter()
            .filter(|tier| self.is_active(*tier, now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, day, hour, 15, 0)
            .unwrap()
    }

    fn policy(daily_hour: u32) -> TierPolicy {
        TierPolicy {
            daily_hour,
            ..TierPolicy::default()
        }
    }

    #[test]
    fn hot_only_outside_thresholds() {
        assert_eq!(policy(6).plan(&at(12, 14)), vec![Tier::Hot]);
    }

    #[test]
    fn daily_joins_on_designated_hour() {
        assert_eq!(policy(6).plan(&at(12, 6)), vec![Tier::Hot, Tier::Daily]);
        assert_eq!(policy(6).plan(&at(12, 7)), vec![Tier::Hot]);
    }

    #[test]
    fn monthly_joins_on_first_day() {
        assert_eq!(policy(6).plan(&at(1, 14)), vec![Tier::Hot, Tier::Monthly]);
    }

    #[test]
    fn all_tiers_in_order() {
        assert_eq!(
            policy(6).plan(&at(1, 6)),
            vec![Tier::Hot, Tier::Daily, Tier::Monthly]
        );
    }

    #[test]
    fn plan_is_pure() {
        let p = policy(0);
        let now = at(1, 0);
        let first = p.plan(&now);
        for _ in 0..5 {
            assert_eq!(p.plan(&now), first);
        }
    }

    #[test]
    fn hour_uses_the_timestamp_own_offset() {
        // 05:30 UTC is 06:30 at +01:00
        let utc = chrono::Utc.with_ymd_and_hms(2024, 3, 12, 5, 30, 0).unwrap();
        let paris = utc.with_timezone(&FixedOffset::east_opt(3600).unwrap());
        assert_eq!(policy(6).plan(&utc), vec![Tier::Hot]);
        assert_eq!(policy(6).plan(&paris), vec![Tier::Hot, Tier::Daily]);
    }

    #[test]
    fn validate_rejects_bad_thresholds_and_prefixes() {
        assert!(policy(24).validate().is_err());
        assert!(TierPolicy {
            monthly_day: 0,
            ..TierPolicy::default()
        }
        .validate()
        .is_err());
        assert!(TierPolicy {
            daily_prefix: "/".into(),
            ..TierPolicy::default()
        }
        .validate()
        .is_err());
        assert!(TierPolicy::default().validate().is_ok());
    }
}
