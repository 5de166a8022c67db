//! Register map loading
//!
//! A map is always replaced wholesale on reload; there is no partial merge.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use errors::{GcsError, GcsResult};

use crate::normalize::normalize_addresses;
use crate::register::{PollGroup, RegisterDefinition, RegisterEntry, RegisterKind};

/// The part of a configuration document the register map cares about
#[derive(Debug, Default, Deserialize)]
struct RegisterDocument {
    #[serde(default)]
    registers: Vec<RegisterEntry>,
}

/// Addresses split by poll group
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupPartition {
    pub group_a: Vec<u16>,
    pub group_b: Vec<u16>,
    /// Registers per group; packed flags count one each
    pub a_registers: usize,
    pub b_registers: usize,
}

impl GroupPartition {
    /// Addresses to poll; group A only when throttled
    ///
    /// With no group A addresses a throttled cycle polls everything, so the
    /// latency that releases the throttle is still measured.
    pub fn addresses(&self, throttled: bool) -> Vec<u16> {
        if throttled && !self.group_a.is_empty() {
            self.group_a.clone()
        } else {
            let mut all = Vec::with_capacity(self.group_a.len() + self.group_b.len());
            all.extend_from_slice(&self.group_a);
            all.extend_from_slice(&self.group_b);
            all
        }
    }
}

/// A validated, normalized register map
#[derive(Debug, Clone, Default)]
pub struct RegisterMap {
    registers: Vec<RegisterDefinition>,
    legacy_base: Option<u32>,
}

impl RegisterMap {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate, normalize and de-duplicate raw rows
    ///
    /// Numeric registers are keyed by address and booleans by `(address, bit)`,
    /// so several flags can share one status word. Later rows win.
    pub fn from_entries(entries: Vec<RegisterEntry>) -> Self {
        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.raw_address() {
                Some(address) => rows.push((address, entry)),
                None => warn!(
                    "Register '{}' has non-numeric address {}, skipped",
                    entry.name, entry.address
                ),
            }
        }

        let mut addresses: Vec<u32> = rows.iter().map(|(a, _)| *a).collect();
        let legacy_base = normalize_addresses(&mut addresses);
        if let Some(base) = legacy_base {
            debug!("Legacy register numbering detected, base {}", base);
        }

        let mut slots: HashMap<(u16, Option<u8>), usize> = HashMap::new();
        let mut registers: Vec<RegisterDefinition> = Vec::with_capacity(rows.len());
        for ((_, entry), address) in rows.into_iter().zip(addresses) {
            let Some(def) = RegisterDefinition::from_entry(entry, address) else {
                continue;
            };
            let key = (def.address, def.bit());
            match slots.get(&key) {
                Some(&idx) => {
                    debug!(
                        "Duplicate register at {}: '{}' replaces '{}'",
                        def.address, def.name, registers[idx].name
                    );
                    registers[idx] = def;
                },
                None => {
                    slots.insert(key, registers.len());
                    registers.push(def);
                },
            }
        }

        Self {
            registers,
            legacy_base,
        }
    }

    /// Parse a YAML document with a top-level `registers:` list
    pub fn from_yaml_str(text: &str) -> GcsResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::empty());
        }
        let doc: Option<RegisterDocument> = serde_yaml::from_str(text)?;
        Ok(Self::from_entries(doc.unwrap_or_default().registers))
    }

    /// Load a single file; a missing file is `ConfigurationAbsent`
    pub fn load(path: &Path) -> GcsResult<Self> {
        if !path.exists() {
            return Err(GcsError::ConfigurationAbsent(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text).map_err(|e| GcsError::ParseError {
            file: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Load the first candidate that exists, degrading to an empty map
    pub fn load_first(paths: &[PathBuf]) -> Self {
        for path in paths {
            match Self::load(path) {
                Ok(map) => {
                    info!("Loaded {} registers from {}", map.len(), path.display());
                    return map;
                },
                Err(GcsError::ConfigurationAbsent(_)) => continue,
                Err(e) => {
                    warn!("Register map {} unusable: {}", path.display(), e);
                },
            }
        }
        warn!(
            "No register map found (tried {:?}), polling nothing",
            paths
        );
        Self::empty()
    }

    pub fn registers(&self) -> &[RegisterDefinition] {
        &self.registers
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RegisterDefinition> {
        self.registers.iter()
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// Base subtracted during normalization, if any
    pub fn legacy_base(&self) -> Option<u32> {
        self.legacy_base
    }

    pub fn by_name(&self, name: &str) -> Option<&RegisterDefinition> {
        self.registers.iter().find(|r| r.name == name)
    }

    /// Distinct addresses per group, sorted
    ///
    /// A word shared by flags of different groups is polled with group A.
    pub fn partition(&self) -> GroupPartition {
        let mut group_a: Vec<u16> = Vec::new();
        let mut group_b: Vec<u16> = Vec::new();
        for reg in &self.registers {
            match reg.effective_group() {
                PollGroup::A => group_a.push(reg.address),
                PollGroup::B => group_b.push(reg.address),
            }
        }
        let a_registers = group_a.len();
        let b_registers = group_b.len();
        group_a.sort_unstable();
        group_a.dedup();
        group_b.sort_unstable();
        group_b.dedup();
        group_b.retain(|a| group_a.binary_search(a).is_err());
        GroupPartition {
            group_a,
            group_b,
            a_registers,
            b_registers,
        }
    }

    /// Count of numeric vs boolean registers, for diagnostics
    pub fn kind_counts(&self) -> (usize, usize) {
        self.registers
            .iter()
            .fold((0, 0), |(n, b), r| match r.kind {
                RegisterKind::Numeric { .. } => (n + 1, b),
                RegisterKind::Boolean { .. } => (n, b + 1),
            })
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use std::io::Write;

    const LEGACY_MAP: &str = r#"
registers:
  - address: 40001
    name: Engine RPM
    scale: 1
  - address: 40002
    name: Engine Lube Oil Pressure
    scale: 0.1
  - address: 40003
    name: Hour Meter
  - address: 40004
    name: Low Oil Alarm
    bit: 0
  - address: 40004
    name: High Temp Alarm
    bit: 1
"#;

    #[test]
    fn test_from_yaml_normalizes_and_keeps_packed_flags() {
        let map = RegisterMap::from_yaml_str(LEGACY_MAP).unwrap();
        assert_eq!(map.legacy_base(), Some(40001));
        assert_eq!(map.len(), 5);
        assert_eq!(map.by_name("Engine RPM").unwrap().address, 0);
        assert_eq!(map.by_name("Low Oil Alarm").unwrap().address, 3);
        assert_eq!(map.by_name("High Temp Alarm").unwrap().bit(), Some(1));
        assert_eq!(map.kind_counts(), (3, 2));
    }

    #[test]
    fn test_duplicate_address_last_wins() {
        let yaml = "registers:\n  - {address: 5, name: first}\n  - {address: 5, name: second}\n";
        let map = RegisterMap::from_yaml_str(yaml).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.registers()[0].name, "second");
    }

    #[test]
    fn test_partition() {
        let map = RegisterMap::from_yaml_str(LEGACY_MAP).unwrap();
        let groups = map.partition();
        assert_eq!(groups.group_a, vec![0, 1, 3]);
        assert_eq!(groups.group_b, vec![2]);
        assert_eq!(groups.addresses(true), vec![0, 1, 3]);
        assert_eq!(groups.addresses(false), vec![0, 1, 3, 2]);
    }

    #[test]
    fn test_partition_counts_registers() {
        let yaml = "registers:\n  - {address: 0, name: Engine RPM}\n  - {address: 4, bit: 0, name: Low Oil Alarm}\n  - {address: 4, bit: 1, name: High Temp Alarm}\n  - {address: 4, bit: 2, name: Door Open, group: B}\n  - {address: 9, name: Hour Meter}\n";
        let groups = RegisterMap::from_yaml_str(yaml).unwrap().partition();
        assert_eq!(groups.group_a, vec![0, 4]);
        assert_eq!(groups.group_b, vec![9]);
        assert_eq!(groups.a_registers, 3);
        assert_eq!(groups.b_registers, 2);
    }

    #[test]
    fn test_throttled_without_group_a_polls_everything() {
        let yaml = "registers:\n  - {address: 2, name: Hour Meter}\n  - {address: 7, name: Run Hours}\n";
        let groups = RegisterMap::from_yaml_str(yaml).unwrap().partition();
        assert!(groups.group_a.is_empty());
        assert_eq!(groups.addresses(true), vec![2, 7]);
    }

    #[test]
    fn test_both_group_spellings_in_one_row() {
        let yaml = "registers:\n  - {address: 1, name: Hour Meter, group: B, pollGroup: A}\n  - {address: 2, name: Engine RPM}\n";
        let map = RegisterMap::from_yaml_str(yaml).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.partition().group_a, vec![1, 2]);
    }

    #[test]
    fn test_empty_documents() {
        assert!(RegisterMap::from_yaml_str("").unwrap().is_empty());
        assert!(RegisterMap::from_yaml_str("simulation: {}\n").unwrap().is_empty());
    }

    #[test]
    fn test_load_first_skips_missing_and_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.yaml");
        let present = dir.path().join("registers.yaml");
        let mut file = std::fs::File::create(&present).unwrap();
        file.write_all(LEGACY_MAP.as_bytes()).unwrap();

        let map = RegisterMap::load_first(&[missing.clone(), present]);
        assert_eq!(map.len(), 5);

        assert!(matches!(
            RegisterMap::load(&missing),
            Err(GcsError::ConfigurationAbsent(_))
        ));
        assert!(RegisterMap::load_first(&[missing]).is_empty());
    }
}
