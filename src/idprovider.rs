//! Opaque identifier generation for newly created Rules and
//! ReportConfigs.

use uuid::Uuid;

/// Produces a fresh opaque identifier. Abstracted behind a trait so
/// tests can supply deterministic ids.
pub trait IdProvider: Send + Sync {
    fn id(&self) -> String;
}

/// `IdProvider` backed by a random UUIDv4, matching the rest of the
/// teacher workspace's use of `uuid::Uuid::new_v4()` for command and
/// entity ids.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdProvider;

impl IdProvider for UuidIdProvider {
    fn id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_provider_yields_distinct_well_formed_ids() {
        let p = UuidIdProvider;
        let a = p.id();
        let b = p.id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
