use std::collections::BTreeMap;

use crate::errors::{NetworkError, Result};
use crate::model::{Connection, PartitionConnectionId, PartitionId, ServiceIdSet};
use crate::ops::PartitionTopology;

use super::invariants;

/// Validate a requested repartition against the registered services
///
/// Checks, in order: no service in two partitions, every member is
/// registered, every connection names a defined partition.
///
/// # Errors
///
/// Returns the first violation found. The engine's validator calls the
/// individual invariant functions to report all of them.
pub fn validate_repartition(
    partitions: &BTreeMap<PartitionId, ServiceIdSet>,
    connections: &BTreeMap<PartitionConnectionId, Connection>,
    registered: &ServiceIdSet,
) -> Result<()> {
    if let Some((service_id, first, second)) =
        invariants::find_overlapping_services(partitions).into_iter().next()
    {
        return Err(NetworkError::PartitionOverlap {
            service_id: service_id.to_string(),
            first: first.to_string(),
            second: second.to_string(),
        });
    }

    if let Some((service_id, partition_id)) =
        invariants::find_unknown_members(partitions, registered)
            .into_iter()
            .next()
    {
        return Err(NetworkError::UnknownServiceInPartition {
            service_id: service_id.to_string(),
            partition_id: partition_id.to_string(),
        });
    }

    if let Some(partition_id) =
        invariants::find_unknown_connection_partitions(connections.keys(), partitions)
            .into_iter()
            .next()
    {
        return Err(NetworkError::UnknownPartition {
            partition_id: partition_id.to_string(),
        });
    }

    Ok(())
}

/// Check that a topology places every registered service exactly once
///
/// # Errors
///
/// Returns `PartitionOverlap` or `UnknownServiceInPartition` for a
/// misplaced member, or `UnknownService` for a registered service that is
/// in no partition.
pub fn validate_topology(topology: &PartitionTopology, registered: &ServiceIdSet) -> Result<()> {
    let partitions = topology.partitions();
    validate_repartition(partitions, topology.connections(), registered)?;

    if let Some(service_id) = invariants::find_unplaced_services(partitions, registered)
        .into_iter()
        .next()
    {
        return Err(NetworkError::UnknownService {
            service_id: service_id.to_string(),
        });
    }

    Ok(())
}
