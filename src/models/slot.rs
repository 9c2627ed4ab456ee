use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Addressable placement position: one rack, one slot.
///
/// Ordering is rack ascending, then slot ascending. Every ordered walk over
/// a configuration (reconciliation, address generation, persistence) relies
/// on this.
///
/// Serialized as the string `"rack,slot"` so it can key YAML and JSON maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotPosition {
    pub rack: u16,
    pub slot: u16,
}

impl SlotPosition {
    pub const fn new(rack: u16, slot: u16) -> Self {
        Self { rack, slot }
    }
}

impl fmt::Display for SlotPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.rack, self.slot)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid slot position '{0}', expected \"rack,slot\"")]
pub struct SlotParseError(pub String);

impl FromStr for SlotPosition {
    type Err = SlotParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rack, slot) = s
            .split_once(',')
            .ok_or_else(|| SlotParseError(s.to_string()))?;

        let rack = rack
            .trim()
            .parse()
            .map_err(|_| SlotParseError(s.to_string()))?;
        let slot = slot
            .trim()
            .parse()
            .map_err(|_| SlotParseError(s.to_string()))?;

        Ok(Self { rack, slot })
    }
}

impl Serialize for SlotPosition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotPosition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_parse_slot_position() {
        assert_eq!("1,2".parse::<SlotPosition>().unwrap(), SlotPosition::new(1, 2));
        assert_eq!(" 3 , 11 ".parse::<SlotPosition>().unwrap(), SlotPosition::new(3, 11));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("12".parse::<SlotPosition>().is_err());
        assert!("a,b".parse::<SlotPosition>().is_err());
        assert!("1,-2".parse::<SlotPosition>().is_err());
    }

    #[test]
    fn test_ordering_is_rack_then_slot() {
        let mut slots = vec![
            SlotPosition::new(2, 1),
            SlotPosition::new(1, 10),
            SlotPosition::new(1, 2),
        ];
        slots.sort();

        assert_eq!(
            slots,
            vec![
                SlotPosition::new(1, 2),
                SlotPosition::new(1, 10),
                SlotPosition::new(2, 1),
            ]
        );
    }

    #[test]
    fn test_serializes_as_map_key() {
        let mut config = BTreeMap::new();
        config.insert(SlotPosition::new(1, 3), "LK411".to_string());

        let yaml = serde_yaml_ng::to_string(&config).unwrap();
        assert!(yaml.contains("1,3"));

        let back: BTreeMap<SlotPosition, String> = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(back, config);
    }
}
