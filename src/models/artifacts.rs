use crate::models::ModuleCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemType {
    /// LK backplanes with a PROFIBUS-DP master in slot 1 of every rack.
    #[default]
    #[serde(rename = "LK")]
    Lk,
    /// LE system built around an LE5118 CPU in slot 0 of rack 1.
    #[serde(rename = "LE_CPU")]
    LeCpu,
}

impl SystemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lk => "LK",
            Self::LeCpu => "LE_CPU",
        }
    }
}

impl fmt::Display for SystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a site's rack system as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub system_type: SystemType,
    pub rack_count: u16,
    pub slots_per_rack: u16,
    pub user_start_slot: u16,
    /// Configured modules, auto-placed ones included.
    pub module_count: usize,
    /// Channel totals keyed by category label (`AI`, `DI`, ...).
    #[serde(default)]
    pub channel_totals: BTreeMap<String, u32>,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            system_type: SystemType::Lk,
            rack_count: 1,
            slots_per_rack: 11,
            user_start_slot: 2,
            module_count: 0,
            channel_totals: BTreeMap::new(),
        }
    }
}

/// One addressable channel, or a single placeholder record for modules
/// without IO channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAddress {
    pub rack: u16,
    pub slot: u16,
    pub model: String,
    #[serde(rename = "type")]
    pub category: ModuleCategory,
    pub channel: u32,
    pub address: String,
    pub is_io_channel: bool,
}

/// Everything computed from a configuration on apply and handed to export
/// tooling alongside it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedArtifacts {
    pub system_info: SystemInfo,
    pub addresses: Vec<ChannelAddress>,
    pub io_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_address_uses_type_key() {
        let address = ChannelAddress {
            rack: 1,
            slot: 2,
            model: "LK411".to_string(),
            category: ModuleCategory::Ai,
            channel: 0,
            address: "1_2_AI_0".to_string(),
            is_io_channel: true,
        };

        let yaml = serde_yaml_ng::to_string(&address).unwrap();
        assert!(yaml.contains("type: AI"));
    }

    #[test]
    fn test_system_type_labels() {
        let yaml = serde_yaml_ng::to_string(&SystemType::LeCpu).unwrap();
        assert_eq!(yaml.trim(), "LE_CPU");
        assert_eq!(SystemType::default(), SystemType::Lk);
    }
}
