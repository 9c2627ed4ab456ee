use crate::models::{
    Catalog, ChannelAddress, DerivedArtifacts, ModelConfiguration, ModuleCategory, SlotPosition,
    SystemInfo,
};
use crate::services::topology::RackTopology;
use std::collections::BTreeMap;

fn channel_address(slot: SlotPosition, category: ModuleCategory, channel: u32) -> String {
    format!("{}_{}_{}_{}", slot.rack, slot.slot, category.as_str(), channel)
}

/// Expand a configuration into per-channel address records.
///
/// Mixed modules emit each sub-range under its own category with channel
/// numbers restarting at 0. Communication modules and modules without
/// channels emit a single non-IO record.
pub fn generate_channel_addresses(
    config: &ModelConfiguration,
    catalog: &Catalog,
) -> Vec<ChannelAddress> {
    let mut addresses = Vec::new();

    for (slot, model_id) in config {
        let model = catalog.classify(model_id);

        if model.category.is_communication() || model.channels == 0 {
            addresses.push(ChannelAddress {
                rack: slot.rack,
                slot: slot.slot,
                model: model.id.clone(),
                category: model.category,
                channel: 0,
                address: channel_address(*slot, model.category, 0),
                is_io_channel: false,
            });
            continue;
        }

        let ranges = if model.sub_channels.is_empty() {
            vec![(model.category, model.channels)]
        } else {
            model.sub_channels.clone()
        };

        for (category, count) in ranges {
            for channel in 0..count {
                addresses.push(ChannelAddress {
                    rack: slot.rack,
                    slot: slot.slot,
                    model: model.id.clone(),
                    category,
                    channel,
                    address: channel_address(*slot, category, channel),
                    is_io_channel: true,
                });
            }
        }
    }

    addresses
}

/// Compute system info, channel addresses and IO count for an applied
/// configuration.
pub fn derive_artifacts(
    config: &ModelConfiguration,
    catalog: &Catalog,
    topology: &RackTopology,
) -> DerivedArtifacts {
    let addresses = generate_channel_addresses(config, catalog);

    let mut channel_totals: BTreeMap<String, u32> = BTreeMap::new();
    for address in addresses.iter().filter(|a| a.is_io_channel) {
        *channel_totals
            .entry(address.category.as_str().to_string())
            .or_insert(0) += 1;
    }
    let io_count = addresses.iter().filter(|a| a.is_io_channel).count();

    let system_info = SystemInfo {
        system_type: topology.system_type,
        rack_count: topology.rack_count,
        slots_per_rack: topology.slots_per_rack,
        user_start_slot: topology.user_start_slot(),
        module_count: config.len(),
        channel_totals,
    };

    tracing::debug!(
        "Derived {} address record(s), {} IO channel(s) over {} module(s)",
        addresses.len(),
        io_count,
        system_info.module_count
    );

    DerivedArtifacts {
        system_info,
        addresses,
        io_count,
    }
}
