use crate::models::Property;
use crate::parsing::squash_whitespace;
use std::collections::HashSet;

/// What a cleaning pass removed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanReport {
    pub input: usize,
    pub empty: usize,
    pub duplicates: usize,
}

impl CleanReport {
    pub fn kept(&self) -> usize {
        self.input - self.empty - self.duplicates
    }
}

/// Drops unusable rows and exact duplicates from scraped records.
#[derive(Debug, Default)]
pub struct DataCleaner;

impl DataCleaner {
    pub fn new() -> Self {
        Self
    }

    /// Normalize whitespace, drop rows with neither description nor address,
    /// then drop exact duplicates keeping the first occurrence.
    pub fn clean(&self, records: Vec<Property>) -> (Vec<Property>, CleanReport) {
        let mut report = CleanReport {
            input: records.len(),
            ..Default::default()
        };
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(records.len());

        for record in records {
            let record = normalize_whitespace(record);
            if record.description.is_empty() && record.address.is_empty() {
                report.empty += 1;
                continue;
            }
            if !seen.insert(record.fingerprint()) {
                report.duplicates += 1;
                continue;
            }
            kept.push(record);
        }

        (kept, report)
    }
}

fn normalize_whitespace(mut record: Property) -> Property {
    record.description = squash_whitespace(&record.description);
    record.address = squash_whitespace(&record.address);
    record.property_type = squash_whitespace(&record.property_type);
    for field in [&mut record.state, &mut record.city] {
        *field = field
            .as_deref()
            .map(squash_whitespace)
            .filter(|v| !v.is_empty());
    }
    record
}
