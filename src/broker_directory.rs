// =============================================================================
// broker_directory.rs — THE WHO'S WHO OF FREIGHT BROKERAGE
// =============================================================================
//
// A seed list of brokers that will, sooner or later, email every carrier in
// America, plus whatever brokers the operator adds by hand. The directory is
// append-only: entries never expire and are never removed, and no two
// entries share a domain.
//
// One owned instance, shared behind an Arc. Reads are concurrent; appends
// take the write lock and bump a generation counter so caches that were
// built from an older snapshot know to throw themselves away.
// =============================================================================

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::error::DirectoryError;
use crate::models::{BrokerClass, BrokerDirectoryEntry};

/// (name, domain, class). Real brokers, real domains.
const SEED_BROKERS: &[(&str, &str, BrokerClass)] = &[
    ("C.H. Robinson", "chrobinson.com", BrokerClass::Major),
    ("TQL", "tql.com", BrokerClass::Major),
    ("Coyote Logistics", "coyote.com", BrokerClass::Major),
    ("Echo Global Logistics", "echo.com", BrokerClass::Major),
    ("RXO", "rxo.com", BrokerClass::Major),
    ("XPO", "xpo.com", BrokerClass::Major),
    ("J.B. Hunt", "jbhunt.com", BrokerClass::Major),
    ("Landstar", "landstar.com", BrokerClass::Major),
    ("Hub Group", "hubgroup.com", BrokerClass::Major),
    ("Schneider", "schneider.com", BrokerClass::Major),
    ("Arrive Logistics", "arrivelogistics.com", BrokerClass::Major),
    ("GlobalTranz", "globaltranz.com", BrokerClass::Major),
    ("Werner Logistics", "werner.com", BrokerClass::Major),
    ("Mode Global", "modeglobal.com", BrokerClass::Regional),
    ("Allen Lund Company", "allenlund.com", BrokerClass::Regional),
    ("Nolan Transportation Group", "ntgfreight.com", BrokerClass::Regional),
    ("BlueGrace Logistics", "mybluegrace.com", BrokerClass::Regional),
    ("Trinity Logistics", "trinitylogistics.com", BrokerClass::Regional),
    ("Armstrong Transport Group", "armstrongtransport.com", BrokerClass::Regional),
    ("Redwood Logistics", "redwoodlogistics.com", BrokerClass::Regional),
    ("MoLo Solutions", "molosolutions.com", BrokerClass::Regional),
    ("Sunteck TTS", "sunteckttl.com", BrokerClass::Regional),
    ("Worldwide Express", "wwex.com", BrokerClass::Regional),
    ("Axle Logistics", "axlelogistics.com", BrokerClass::Regional),
    ("Uber Freight", "uberfreight.com", BrokerClass::Digital),
    ("Convoy", "convoy.com", BrokerClass::Digital),
    ("Loadsmart", "loadsmart.com", BrokerClass::Digital),
    ("Transfix", "transfix.io", BrokerClass::Digital),
    ("Emerge", "emergemarket.com", BrokerClass::Digital),
    ("Flock Freight", "flockfreight.com", BrokerClass::Digital),
];

pub struct BrokerDirectory {
    entries: RwLock<Vec<BrokerDirectoryEntry>>,
    generation: AtomicU64,
}

impl BrokerDirectory {
    /// A directory holding only the shipped seed list.
    pub fn seeded() -> Self {
        let entries = SEED_BROKERS
            .iter()
            .map(|(name, domain, class)| BrokerDirectoryEntry::new(*name, *domain, *class))
            .collect();
        Self {
            entries: RwLock::new(entries),
            generation: AtomicU64::new(0),
        }
    }

    pub fn empty() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Append an operator-supplied broker. Refuses a domain that is already listed.
    pub fn add_custom_broker(&self, entry: BrokerDirectoryEntry) -> Result<(), DirectoryError> {
        let entry = BrokerDirectoryEntry::new(entry.name, entry.domain, entry.class);
        if entry.name.is_empty() {
            return Err(DirectoryError::EmptyField("name"));
        }
        if entry.domain.is_empty() {
            return Err(DirectoryError::EmptyField("domain"));
        }

        let mut entries = self.entries.write();
        if entries.iter().any(|existing| existing.domain == entry.domain) {
            return Err(DirectoryError::DuplicateDomain(entry.domain));
        }

        info!(
            name = %entry.name,
            domain = %entry.domain,
            class = %entry.class,
            "Custom broker added to directory"
        );
        entries.push(entry);
        self.generation.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Consistent copy of the current entries, in insertion order.
    pub fn snapshot(&self) -> Vec<BrokerDirectoryEntry> {
        self.entries.read().clone()
    }

    /// Bumped on every successful append.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn find_by_domain(&self, domain: &str) -> Option<BrokerDirectoryEntry> {
        let domain = domain.trim().to_ascii_lowercase();
        self.entries.read().iter().find(|e| e.domain == domain).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for BrokerDirectory {
    fn default() -> Self {
        Self::seeded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_list_has_unique_domains() {
        let directory = BrokerDirectory::seeded();
        let mut domains: Vec<_> = directory.snapshot().into_iter().map(|e| e.domain).collect();
        let before = domains.len();
        domains.sort();
        domains.dedup();
        assert_eq!(before, domains.len());
        assert!(directory.find_by_domain("HubGroup.com").is_some());
    }

    #[test]
    fn test_add_custom_broker_appends_and_bumps_generation() {
        let directory = BrokerDirectory::seeded();
        let before = directory.len();
        directory
            .add_custom_broker(BrokerDirectoryEntry::new(
                "Prairie Freight",
                "prairiefreight.net",
                BrokerClass::Regional,
            ))
            .unwrap();
        assert_eq!(directory.len(), before + 1);
        assert_eq!(directory.generation(), 1);
        assert_eq!(directory.snapshot().last().unwrap().name, "Prairie Freight");
    }

    #[test]
    fn test_duplicate_domain_is_rejected() {
        let directory = BrokerDirectory::seeded();
        let err = directory
            .add_custom_broker(BrokerDirectoryEntry::new("Fake TQL", "TQL.com", BrokerClass::Major))
            .unwrap_err();
        assert_eq!(err, DirectoryError::DuplicateDomain("tql.com".into()));
        assert_eq!(directory.generation(), 0);
    }

    #[test]
    fn test_empty_fields_are_rejected() {
        let directory = BrokerDirectory::empty();
        let err = directory
            .add_custom_broker(BrokerDirectoryEntry::new("  ", "x.com", BrokerClass::Regional))
            .unwrap_err();
        assert_eq!(err, DirectoryError::EmptyField("name"));
        assert!(directory.is_empty());
    }
}
