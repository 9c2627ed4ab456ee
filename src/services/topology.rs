use crate::models::{
    Catalog, DP_MASTER_MODEL, LE_CPU_MODEL, ModuleCategory, SiteInventory, SlotPosition,
    SystemType,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SLOTS_PER_RACK: u16 = 11;

/// Addressable (rack, slot) space of one site.
///
/// Racks are numbered from 1, slots from 1 to `slots_per_rack`. An LK system
/// reserves slot 1 of every rack for the DP master; an LE system reserves
/// slot 0 of rack 1 for the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RackTopology {
    pub system_type: SystemType,
    pub rack_count: u16,
    pub slots_per_rack: u16,
}

impl Default for RackTopology {
    fn default() -> Self {
        Self::new(SystemType::Lk, 1)
    }
}

impl RackTopology {
    pub fn new(system_type: SystemType, rack_count: u16) -> Self {
        Self {
            system_type,
            rack_count: rack_count.max(1),
            slots_per_rack: DEFAULT_SLOTS_PER_RACK,
        }
    }

    /// Derive topology from the structural models in an inventory.
    pub fn from_inventory(inventory: &SiteInventory, catalog: &Catalog) -> Self {
        let mut racks: u32 = 0;
        let mut slots_per_rack = DEFAULT_SLOTS_PER_RACK;
        let mut has_cpu = false;

        for (model_id, &quantity) in inventory {
            if quantity == 0 {
                continue;
            }
            let model = catalog.classify(model_id);
            match model.category {
                ModuleCategory::Rack => {
                    racks = racks.saturating_add(quantity);
                    if let Some(slots) = model.rack_slots {
                        slots_per_rack = slots;
                    }
                }
                ModuleCategory::Cpu => has_cpu = true,
                _ => {}
            }
        }

        let system_type = if has_cpu {
            SystemType::LeCpu
        } else {
            SystemType::Lk
        };
        let rack_count = u16::try_from(racks).unwrap_or(u16::MAX).max(1);

        tracing::debug!(
            "Topology: {} system, {} rack(s) of {} slots",
            system_type,
            rack_count,
            slots_per_rack
        );

        Self {
            system_type,
            rack_count,
            slots_per_rack,
        }
    }

    /// First slot of each rack available to user assignment.
    pub fn user_start_slot(&self) -> u16 {
        match self.system_type {
            SystemType::Lk => 2,
            SystemType::LeCpu => 1,
        }
    }

    /// Whether the position exists in this topology, reserved or not.
    pub fn contains(&self, position: SlotPosition) -> bool {
        if self.system_type == SystemType::LeCpu && position == SlotPosition::new(1, 0) {
            return true;
        }
        (1..=self.rack_count).contains(&position.rack)
            && (1..=self.slots_per_rack).contains(&position.slot)
    }

    pub fn is_reserved(&self, position: SlotPosition) -> bool {
        match self.system_type {
            SystemType::Lk => self.contains(position) && position.slot == 1,
            SystemType::LeCpu => position == SlotPosition::new(1, 0),
        }
    }

    /// Positions open to user assignment, rack then slot ascending.
    pub fn user_slots(&self) -> impl Iterator<Item = SlotPosition> + '_ {
        let start = self.user_start_slot();
        (1..=self.rack_count).flat_map(move |rack| {
            (start..=self.slots_per_rack).map(move |slot| SlotPosition::new(rack, slot))
        })
    }

    pub fn user_capacity(&self) -> usize {
        let per_rack = (self.slots_per_rack + 1).saturating_sub(self.user_start_slot());
        usize::from(per_rack) * usize::from(self.rack_count)
    }

    /// Reserved positions and the model placed on each.
    pub fn auto_placements(&self) -> Vec<(SlotPosition, &'static str)> {
        match self.system_type {
            SystemType::Lk => (1..=self.rack_count)
                .map(|rack| (SlotPosition::new(rack, 1), DP_MASTER_MODEL))
                .collect(),
            SystemType::LeCpu => vec![(SlotPosition::new(1, 0), LE_CPU_MODEL)],
        }
    }
}
