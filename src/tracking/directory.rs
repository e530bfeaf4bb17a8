//! Hostname to website id directory
//!
//! Seeded from the static configuration, merged with the collector's
//! website listing on connect and extended by the delivery worker when it
//! creates websites on demand. Existing entries are never overwritten.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::ip_extractor::normalize_hostname;

/// Hostname -> collector website id.
///
/// Read on every classified request, written only by the connection step
/// and the delivery worker. Keys are always normalized hostnames.
#[derive(Debug, Default)]
pub struct SiteDirectory {
    sites: RwLock<HashMap<String, String>>,
}

impl SiteDirectory {
    pub fn new(sites: &HashMap<String, String>) -> Self {
        let sites = sites
            .iter()
            .map(|(host, id)| (normalize_hostname(host), id.clone()))
            .collect();

        Self {
            sites: RwLock::new(sites),
        }
    }

    pub fn lookup(&self, hostname: &str) -> Option<String> {
        self.sites
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hostname)
            .cloned()
    }

    pub fn contains(&self, hostname: &str) -> bool {
        self.sites
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(hostname)
    }

    /// Insert unless the hostname is already known. Returns the id that ends
    /// up stored for the hostname.
    pub fn insert_if_absent(&self, hostname: &str, site_id: &str) -> String {
        let mut sites = self.sites.write().unwrap_or_else(PoisonError::into_inner);
        sites
            .entry(normalize_hostname(hostname))
            .or_insert_with(|| site_id.to_string())
            .clone()
    }

    /// Merge several entries without overwriting existing ones. Returns how
    /// many were added.
    pub fn merge<'a, I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut sites = self.sites.write().unwrap_or_else(PoisonError::into_inner);
        let mut added = 0;
        for (hostname, site_id) in entries {
            let hostname = normalize_hostname(hostname);
            if hostname.is_empty() || sites.contains_key(&hostname) {
                continue;
            }
            sites.insert(hostname, site_id.to_string());
            added += 1;
        }
        added
    }

    /// Sorted copy of all entries.
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let sites = self.sites.read().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<(String, String)> = sites
            .iter()
            .map(|(host, id)| (host.clone(), id.clone()))
            .collect();
        entries.sort();
        entries
    }

    pub fn len(&self) -> usize {
        self.sites.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
