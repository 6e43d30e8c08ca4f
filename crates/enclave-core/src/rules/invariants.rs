//! Partition invariant checks
//!
//! Each `find_*` function reports every violation it sees, in deterministic
//! order, so callers can either stop at the first one or collect them all.

use std::collections::BTreeMap;

use crate::model::{PartitionConnectionId, PartitionId, ServiceId, ServiceIdSet};

/// Services listed in more than one partition
///
/// Returns `(service_id, first_partition, second_partition)`; a service in
/// three partitions is reported twice.
pub fn find_overlapping_services(
    partitions: &BTreeMap<PartitionId, ServiceIdSet>,
) -> Vec<(ServiceId, PartitionId, PartitionId)> {
    let mut seen: BTreeMap<&ServiceId, &PartitionId> = BTreeMap::new();
    let mut overlaps = Vec::new();

    for (partition_id, members) in partitions {
        for service_id in members {
            match seen.get(service_id) {
                Some(first) => overlaps.push((
                    service_id.clone(),
                    (*first).clone(),
                    partition_id.clone(),
                )),
                None => {
                    seen.insert(service_id, partition_id);
                }
            }
        }
    }

    overlaps
}

/// Partition members that are not among the `known` services
///
/// Returns `(service_id, partition_id)` pairs.
pub fn find_unknown_members(
    partitions: &BTreeMap<PartitionId, ServiceIdSet>,
    known: &ServiceIdSet,
) -> Vec<(ServiceId, PartitionId)> {
    partitions
        .iter()
        .flat_map(|(partition_id, members)| {
            members
                .iter()
                .filter(|id| !known.contains(id))
                .map(move |id| (id.clone(), partition_id.clone()))
        })
        .collect()
}

/// Partitions named by a connection but not defined
///
/// The default partition always counts as defined. Each unknown partition
/// is reported once.
pub fn find_unknown_connection_partitions<'a>(
    connections: impl IntoIterator<Item = &'a PartitionConnectionId>,
    partitions: &BTreeMap<PartitionId, ServiceIdSet>,
) -> Vec<PartitionId> {
    let mut unknown: Vec<PartitionId> = Vec::new();
    for connection_id in connections {
        let (a, b) = connection_id.partitions();
        for partition_id in [a, b] {
            let defined = partition_id.is_default() || partitions.contains_key(partition_id);
            if !defined && !unknown.contains(partition_id) {
                unknown.push(partition_id.clone());
            }
        }
    }
    unknown
}

/// Registered services that appear in no partition
pub fn find_unplaced_services(
    partitions: &BTreeMap<PartitionId, ServiceIdSet>,
    registered: &ServiceIdSet,
) -> Vec<ServiceId> {
    let placed = partitions
        .values()
        .fold(ServiceIdSet::new(), |acc, members| acc.union(members));
    registered.difference(&placed).into_iter().collect()
}
