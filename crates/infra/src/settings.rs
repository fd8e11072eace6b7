//! Runtime settings for the intake pipeline.
//!
//! Read from the environment once at startup with working defaults, so a
//! bare binary runs fully in-memory. Misconfiguration degrades loudly
//! (warn + fallback) instead of refusing to boot.

use acopio_materials::MovementKind;

/// Kardex reference codes stamped on receipt movement rows.
///
/// Issue and return movements carry no code; the kind itself is the
/// reporting key for those.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementCodes {
    pub purchase_in: u16,
    pub transfer: u16,
    pub surplus: u16,
    pub reentry: u16,
}

impl Default for MovementCodes {
    fn default() -> Self {
        Self {
            purchase_in: 101,
            transfer: 311,
            surplus: 501,
            reentry: 601,
        }
    }
}

impl MovementCodes {
    pub fn code_for(&self, kind: MovementKind) -> Option<u16> {
        match kind {
            MovementKind::PurchaseIn => Some(self.purchase_in),
            MovementKind::Transfer => Some(self.transfer),
            MovementKind::Surplus => Some(self.surplus),
            MovementKind::Reentry => Some(self.reentry),
            MovementKind::IssueConsumption
            | MovementKind::IssueAsset
            | MovementKind::Return => None,
        }
    }
}

/// Which event store backend to wire at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventStoreBackend {
    Memory,
    Postgres { database_url: String },
}

/// Environment-driven pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Tax rate applied when recomputing document totals (percent).
    pub tax_rate_percent: u16,
    /// Kardex reference codes for receipt movements.
    pub movement_codes: MovementCodes,
    /// Location tag recorded when a release names no aisle/shelf/level.
    pub general_area: String,
    /// Advisory threshold: flag request lines above this percentage of the
    /// budget item's theoretical quantity.
    pub efficient_usage_percent: u16,
    /// Event store backend selection.
    pub event_store: EventStoreBackend,
    /// HTTP bind address for the API binary.
    pub http_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tax_rate_percent: 16,
            movement_codes: MovementCodes::default(),
            general_area: "GENERAL STORAGE".to_string(),
            efficient_usage_percent: 40,
            event_store: EventStoreBackend::Memory,
            http_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Settings {
    /// Build settings from the environment, falling back to defaults on
    /// missing or unparseable values.
    pub fn from_env() -> Self {
        let defaults = Settings::default();

        let tax_rate_percent = env_parsed("ACOPIO_TAX_RATE_PERCENT", defaults.tax_rate_percent);
        let general_area = std::env::var("ACOPIO_GENERAL_AREA")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.general_area);
        let efficient_usage_percent =
            env_parsed("ACOPIO_EFFICIENT_USAGE_PERCENT", defaults.efficient_usage_percent);
        let http_addr = std::env::var("ACOPIO_HTTP_ADDR").unwrap_or(defaults.http_addr);

        let event_store = match std::env::var("ACOPIO_EVENT_STORE").as_deref() {
            Ok("postgres") => match std::env::var("DATABASE_URL") {
                Ok(database_url) => EventStoreBackend::Postgres { database_url },
                Err(_) => {
                    tracing::warn!(
                        "ACOPIO_EVENT_STORE=postgres but DATABASE_URL not set, falling back to in-memory"
                    );
                    EventStoreBackend::Memory
                }
            },
            Ok("memory") | Err(_) => EventStoreBackend::Memory,
            Ok(other) => {
                tracing::warn!(backend = other, "unknown ACOPIO_EVENT_STORE, using in-memory");
                EventStoreBackend::Memory
            }
        };

        Self {
            tax_rate_percent,
            movement_codes: defaults.movement_codes,
            general_area,
            efficient_usage_percent,
            event_store,
            http_addr,
        }
    }
}

fn env_parsed<T: std::str::FromStr + Copy>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_warehouse_baseline() {
        let s = Settings::default();
        assert_eq!(s.tax_rate_percent, 16);
        assert_eq!(s.general_area, "GENERAL STORAGE");
        assert_eq!(s.efficient_usage_percent, 40);
        assert_eq!(s.event_store, EventStoreBackend::Memory);
        assert_eq!(s.http_addr, "0.0.0.0:8080");
    }

    #[test]
    fn receipt_kinds_carry_reference_codes() {
        let codes = MovementCodes::default();
        assert_eq!(codes.code_for(MovementKind::PurchaseIn), Some(101));
        assert_eq!(codes.code_for(MovementKind::Transfer), Some(311));
        assert_eq!(codes.code_for(MovementKind::Surplus), Some(501));
        assert_eq!(codes.code_for(MovementKind::Reentry), Some(601));
        assert_eq!(codes.code_for(MovementKind::IssueConsumption), None);
        assert_eq!(codes.code_for(MovementKind::IssueAsset), None);
        assert_eq!(codes.code_for(MovementKind::Return), None);
    }
}
