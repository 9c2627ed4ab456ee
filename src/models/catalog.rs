use anyhow::{Context, Result};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;

/// Structural category of a module model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModuleCategory {
    #[serde(rename = "AI")]
    Ai,
    #[serde(rename = "AO")]
    Ao,
    #[serde(rename = "DI")]
    Di,
    #[serde(rename = "DO")]
    Do,
    #[serde(rename = "DI/DO")]
    DiDo,
    #[serde(rename = "AI/AO")]
    AiAo,
    #[serde(rename = "DP")]
    Dp,
    #[serde(rename = "COM")]
    Com,
    #[serde(rename = "CPU")]
    Cpu,
    #[serde(rename = "RACK")]
    Rack,
    #[serde(rename = "UNCLASSIFIED")]
    Unclassified,
}

impl ModuleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "AI",
            Self::Ao => "AO",
            Self::Di => "DI",
            Self::Do => "DO",
            Self::DiDo => "DI/DO",
            Self::AiAo => "AI/AO",
            Self::Dp => "DP",
            Self::Com => "COM",
            Self::Cpu => "CPU",
            Self::Rack => "RACK",
            Self::Unclassified => "UNCLASSIFIED",
        }
    }

    /// Parse a category label as written in device data or legacy files.
    ///
    /// Unknown labels map to [`ModuleCategory::Unclassified`].
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "AI" => Self::Ai,
            "AO" => Self::Ao,
            "DI" => Self::Di,
            "DO" => Self::Do,
            "DI/DO" => Self::DiDo,
            "AI/AO" => Self::AiAo,
            "DP" => Self::Dp,
            "COM" | "COMM" | "CP" => Self::Com,
            "CPU" => Self::Cpu,
            "RACK" => Self::Rack,
            _ => Self::Unclassified,
        }
    }

    /// Rack backplanes, CPUs and bus masters follow their own placement
    /// rules and never enter a general site pool.
    pub fn is_structurally_special(&self) -> bool {
        matches!(self, Self::Rack | Self::Cpu | Self::Dp)
    }

    /// Categories shown when browsing the generic module library.
    pub fn is_browsable(&self) -> bool {
        matches!(self, Self::Ai | Self::Ao | Self::Di | Self::Do | Self::Dp)
    }

    /// Communication modules never contribute IO channels.
    pub fn is_communication(&self) -> bool {
        matches!(self, Self::Dp | Self::Com)
    }

    /// Default channel count for a model whose category was inferred from
    /// its identifier rather than found in the catalog.
    fn default_channels(&self) -> u32 {
        match self {
            Self::Ai => 8,
            Self::Ao => 4,
            Self::Di | Self::Do | Self::DiDo => 16,
            Self::AiAo => 6,
            _ => 0,
        }
    }
}

impl fmt::Display for ModuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFlags {
    #[serde(default)]
    pub is_master: bool,
    #[serde(default)]
    pub is_safety: bool,
    /// Slot the model must occupy, if any.
    #[serde(default)]
    pub slot_required: Option<u16>,
}

/// A catalog entry identifying a hardware module type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleModel {
    pub id: String,
    pub category: ModuleCategory,
    #[serde(default)]
    pub channels: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub flags: ModelFlags,
    /// Channel split for mixed modules, e.g. DI 8 / DO 8.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_channels: Vec<(ModuleCategory, u32)>,
    /// Slot capacity when the model is a rack backplane.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rack_slots: Option<u16>,
}

impl ModuleModel {
    fn new(id: &str, category: ModuleCategory, channels: u32, description: &str) -> Self {
        Self {
            id: id.to_string(),
            category,
            channels,
            description: description.to_string(),
            flags: ModelFlags::default(),
            sub_channels: Vec::new(),
            rack_slots: None,
        }
    }

    fn with_sub_channels(mut self, split: &[(ModuleCategory, u32)]) -> Self {
        self.sub_channels = split.to_vec();
        self
    }

    /// An opaque model known only by its identifier.
    pub fn unclassified(id: &str) -> Self {
        Self::new(id, ModuleCategory::Unclassified, 0, "")
    }

    pub fn is_structurally_special(&self) -> bool {
        self.category.is_structurally_special()
    }
}

/// Model identifier prefixes used to infer the category of models that are
/// absent from the catalog. Checked in order; the first match wins.
const CATEGORY_PREFIXES: &[(ModuleCategory, &[&str])] = &[
    (ModuleCategory::Cpu, &["LE5118"]),
    (ModuleCategory::Ai, &["LK41", "LE5611", "LE531", "LE534"]),
    (ModuleCategory::Ao, &["LK51", "LE5621", "LE532"]),
    (ModuleCategory::AiAo, &["LE533"]),
    (ModuleCategory::Di, &["LK61", "LE5610", "LE521"]),
    (ModuleCategory::Do, &["LK71", "LE5620", "LE522"]),
    (ModuleCategory::DiDo, &["LE523"]),
    (ModuleCategory::Dp, &["LK81", "LK82", "PROFIBUS-DP"]),
    (
        ModuleCategory::Com,
        &["LK238", "LE5600", "LE5601", "LE540"],
    ),
    (ModuleCategory::Rack, &["LK117"]),
];

/// Models shown in library browsing even though their category is not
/// browsable.
const SPECIAL_BROWSE_MODELS: &[&str] = &["LK238"];

/// Model auto-placed as the bus master of every LK rack.
pub const DP_MASTER_MODEL: &str = "PROFIBUS-DP";

/// Model auto-placed as the CPU of an LE system.
pub const LE_CPU_MODEL: &str = "LE5118";

/// Static registry of module models.
///
/// Lookups are case-insensitive. The catalog is immutable once built and
/// is shared behind an `Arc` by the session.
#[derive(Debug, Clone)]
pub struct Catalog {
    models: Vec<ModuleModel>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn from_models(models: Vec<ModuleModel>) -> Self {
        let index = models
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.to_ascii_uppercase(), i))
            .collect();
        Self { models, index }
    }

    /// Load a catalog from a YAML list of models.
    pub fn load<P: AsRef<Utf8Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read module catalog: {}", path))?;
        let models: Vec<ModuleModel> = serde_yaml_ng::from_str(&contents)
            .with_context(|| format!("Failed to parse module catalog: {}", path))?;

        tracing::info!("Loaded {} module models from {}", models.len(), path);
        Ok(Self::from_models(models))
    }

    /// The built-in Hollysys LK and LE series catalog.
    pub fn builtin() -> Self {
        use ModuleCategory::*;

        let mut dp = ModuleModel::new(DP_MASTER_MODEL, Dp, 0, "PROFIBUS-DP interface module");
        dp.flags.is_master = true;
        dp.flags.slot_required = Some(1);

        let mut backplane = ModuleModel::new("LK117", Rack, 0, "11-slot extension backplane");
        backplane.rack_slots = Some(11);

        let models = vec![
            // LK series
            ModuleModel::new("LK410", Ai, 8, "8-channel voltage analog input"),
            ModuleModel::new("LK411", Ai, 8, "8-channel current analog input"),
            ModuleModel::new("LK412", Ai, 6, "6-channel isolated analog input"),
            ModuleModel::new("LK510", Ao, 4, "4-channel isolated voltage analog output"),
            ModuleModel::new("LK511", Ao, 4, "4-channel isolated current analog output"),
            ModuleModel::new("LK512", Ao, 8, "8-channel voltage/current analog output"),
            ModuleModel::new("LK610", Di, 16, "16-channel 24VDC digital input"),
            ModuleModel::new("LK616", Di, 32, "32-channel 24VDC digital input"),
            ModuleModel::new("LK710", Do, 16, "16-channel 10-30VDC sourcing digital output"),
            ModuleModel::new("LK716", Do, 32, "32-channel 24VDC transistor digital output"),
            ModuleModel::new("LK720", Do, 8, "8-channel normally-open relay output"),
            dp,
            ModuleModel::new("LK238", Com, 0, "Communication module"),
            backplane,
            // LE series
            ModuleModel::new(LE_CPU_MODEL, Cpu, 40, "LE CPU, DC24V, 40 onboard IO")
                .with_sub_channels(&[(Di, 24), (Do, 16)]),
            ModuleModel::new("LE5600", Com, 0, "RS232 extension board"),
            ModuleModel::new("LE5601", Com, 0, "RS485 extension board"),
            ModuleModel::new("LE5610", Di, 4, "4-channel digital input board"),
            ModuleModel::new("LE5620", Do, 4, "4-channel digital output board"),
            ModuleModel::new("LE5611", Ai, 2, "2-channel analog input board"),
            ModuleModel::new("LE5621", Ao, 1, "1-channel analog output board"),
            ModuleModel::new("LE5210", Di, 8, "8-channel digital input"),
            ModuleModel::new("LE5211", Di, 16, "16-channel digital input"),
            ModuleModel::new("LE5212", Di, 32, "32-channel digital input"),
            ModuleModel::new("LE5220", Do, 8, "8-channel digital output"),
            ModuleModel::new("LE5221", Do, 8, "8-channel digital output"),
            ModuleModel::new("LE5223", Do, 16, "16-channel digital output"),
            ModuleModel::new("LE5224", Do, 32, "32-channel digital output"),
            ModuleModel::new("LE5230", DiDo, 16, "8 DI / 8 DO mixed module")
                .with_sub_channels(&[(Di, 8), (Do, 8)]),
            ModuleModel::new("LE5231", DiDo, 16, "8 DI / 8 DO mixed module")
                .with_sub_channels(&[(Di, 8), (Do, 8)]),
            ModuleModel::new("LE5310", Ai, 4, "4-channel analog input"),
            ModuleModel::new("LE5311", Ai, 8, "8-channel analog input"),
            ModuleModel::new("LE5340", Ai, 4, "4-channel thermocouple input"),
            ModuleModel::new("LE5341", Ai, 4, "4-channel RTD input"),
            ModuleModel::new("LE5341T", Ai, 4, "4-channel RTD input (T)"),
            ModuleModel::new("LE5342", Ai, 8, "8-channel thermistor input"),
            ModuleModel::new("LE5320", Ao, 2, "2-channel analog output"),
            ModuleModel::new("LE5321", Ao, 4, "4-channel analog output"),
            ModuleModel::new("LE5330", AiAo, 6, "4 AI / 2 AO mixed module")
                .with_sub_channels(&[(Ai, 4), (Ao, 2)]),
            ModuleModel::new("LE5400", Com, 0, "Serial extension module"),
            ModuleModel::new("LE5401", Com, 0, "PROFIBUS-DP slave module"),
            ModuleModel::new("LE5403", Com, 0, "Ethernet module"),
            ModuleModel::new("LE5404", Com, 0, "GPRS module"),
        ];

        Self::from_models(models)
    }

    /// Exact (case-insensitive) catalog lookup.
    pub fn lookup(&self, model: &str) -> Option<&ModuleModel> {
        self.index
            .get(&model.trim().to_ascii_uppercase())
            .map(|&i| &self.models[i])
    }

    pub fn contains(&self, model: &str) -> bool {
        self.lookup(model).is_some()
    }

    /// Resolve a model identifier to a model description.
    ///
    /// Falls back from exact lookup to prefix inference, and from there to
    /// an opaque unclassified model carrying only the identifier. Uncatalogued
    /// identifiers come back uppercased.
    pub fn classify(&self, model: &str) -> ModuleModel {
        if let Some(known) = self.lookup(model) {
            return known.clone();
        }

        let id = model.trim().to_ascii_uppercase();

        for (category, prefixes) in CATEGORY_PREFIXES {
            if prefixes.iter().any(|p| id.starts_with(p)) {
                let mut inferred = ModuleModel::new(&id, *category, category.default_channels(), "");
                if *category == ModuleCategory::Dp {
                    inferred.flags.is_master = true;
                    inferred.flags.slot_required = Some(1);
                }
                tracing::debug!("Inferred category {} for uncatalogued model {}", category, id);
                return inferred;
            }
        }

        ModuleModel::unclassified(&id)
    }

    pub fn is_structurally_special(&self, model: &str) -> bool {
        self.classify(model).is_structurally_special()
    }

    /// Whether the model belongs to the curated set used for generic
    /// library browsing. Never applied to site-derived pools unless the
    /// filter policy asks for it.
    pub fn is_in_allowed_browse_set(&self, model: &str) -> bool {
        let upper = model.trim().to_ascii_uppercase();
        if SPECIAL_BROWSE_MODELS.iter().any(|m| *m == upper) {
            return true;
        }
        self.classify(model).category.is_browsable()
    }

    /// Catalog models in the browse set, optionally narrowed to a category.
    pub fn browse(&self, category: Option<ModuleCategory>) -> Vec<&ModuleModel> {
        self.models
            .iter()
            .filter(|m| self.is_in_allowed_browse_set(&m.id))
            .filter(|m| category.is_none_or(|c| m.category == c))
            .collect()
    }

    pub fn models(&self) -> &[ModuleModel] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let catalog = Catalog::builtin();
        let model = catalog.lookup("lk411").unwrap();
        assert_eq!(model.id, "LK411");
        assert_eq!(model.category, ModuleCategory::Ai);
        assert_eq!(model.channels, 8);
    }

    #[test]
    fn test_structurally_special_categories() {
        let catalog = Catalog::builtin();
        assert!(catalog.is_structurally_special("LK117"));
        assert!(catalog.is_structurally_special("PROFIBUS-DP"));
        assert!(catalog.is_structurally_special("LE5118"));
        assert!(!catalog.is_structurally_special("LK411"));
        assert!(!catalog.is_structurally_special("LK238"));
        assert!(!catalog.is_structurally_special("SOMETHING-ELSE"));
    }

    #[test]
    fn test_classify_infers_from_prefix() {
        let catalog = Catalog::builtin();

        let inferred = catalog.classify("LK415");
        assert_eq!(inferred.id, "LK415");
        assert_eq!(inferred.category, ModuleCategory::Ai);
        assert_eq!(inferred.channels, 8);

        let dp = catalog.classify("LK810");
        assert_eq!(dp.category, ModuleCategory::Dp);
        assert!(dp.flags.is_master);
        assert_eq!(dp.flags.slot_required, Some(1));
    }

    #[test]
    fn test_classify_unknown_is_opaque() {
        let catalog = Catalog::builtin();
        let model = catalog.classify("  xyz-9000 ");
        assert_eq!(model.id, "XYZ-9000");
        assert_eq!(model.category, ModuleCategory::Unclassified);
        assert_eq!(model.channels, 0);
    }

    #[test]
    fn test_allowed_browse_set() {
        let catalog = Catalog::builtin();
        assert!(catalog.is_in_allowed_browse_set("LK610"));
        assert!(catalog.is_in_allowed_browse_set("LK238"));
        assert!(!catalog.is_in_allowed_browse_set("LE5600"));
        assert!(!catalog.is_in_allowed_browse_set("LE5230"));
        assert!(!catalog.is_in_allowed_browse_set("XYZ-9000"));
    }

    #[test]
    fn test_browse_by_category() {
        let catalog = Catalog::builtin();
        let outputs = catalog.browse(Some(ModuleCategory::Ao));
        assert!(!outputs.is_empty());
        assert!(outputs.iter().all(|m| m.category == ModuleCategory::Ao));

        let all = catalog.browse(None);
        assert!(all.iter().any(|m| m.id == "LK238"));
        assert!(!all.iter().any(|m| m.id == "LK117"));
    }

    #[test]
    fn test_category_labels_round_trip() {
        for category in [
            ModuleCategory::Ai,
            ModuleCategory::DiDo,
            ModuleCategory::AiAo,
            ModuleCategory::Dp,
            ModuleCategory::Rack,
        ] {
            assert_eq!(ModuleCategory::from_label(category.as_str()), category);
        }
        assert_eq!(ModuleCategory::from_label("comm"), ModuleCategory::Com);
        assert_eq!(ModuleCategory::from_label("???"), ModuleCategory::Unclassified);
    }

    #[test]
    fn test_load_catalog_from_yaml() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = camino::Utf8PathBuf::try_from(temp_dir.path().join("catalog.yaml")).unwrap();
        fs::write(
            &path,
            r#"
- id: SAFE-DI
  category: DI
  channels: 16
  flags:
    is_safety: true
- id: RACK-X
  category: RACK
  rack_slots: 8
"#,
        )
        .unwrap();

        let catalog = Catalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.lookup("safe-di").unwrap().flags.is_safety);
        assert_eq!(catalog.lookup("RACK-X").unwrap().rack_slots, Some(8));
    }
}
