use std::collections::BTreeMap;

use crate::errors::{NetworkError, Result};
use crate::model::{Connection, PartitionConnectionId, PartitionId, ServiceId, ServiceIdSet};
use crate::rules::validation;

/// Partition layout of one enclave
///
/// The default partition always exists. Every service tracked here is a
/// member of exactly one partition.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionTopology {
    partitions: BTreeMap<PartitionId, ServiceIdSet>,
    service_partitions: BTreeMap<ServiceId, PartitionId>,
    connections: BTreeMap<PartitionConnectionId, Connection>,
    default_connection: Connection,
}

impl PartitionTopology {
    pub fn new(default_connection: Connection) -> Self {
        let mut partitions = BTreeMap::new();
        partitions.insert(PartitionId::default_partition(), ServiceIdSet::new());
        Self {
            partitions,
            service_partitions: BTreeMap::new(),
            connections: BTreeMap::new(),
            default_connection,
        }
    }

    pub fn partitions(&self) -> &BTreeMap<PartitionId, ServiceIdSet> {
        &self.partitions
    }

    pub fn connections(&self) -> &BTreeMap<PartitionConnectionId, Connection> {
        &self.connections
    }

    pub fn default_connection(&self) -> Connection {
        self.default_connection
    }

    pub fn partition_of(&self, service_id: &ServiceId) -> Option<&PartitionId> {
        self.service_partitions.get(service_id)
    }

    pub fn services(&self) -> ServiceIdSet {
        self.service_partitions.keys().cloned().collect()
    }

    /// Place a new service into an existing partition
    ///
    /// # Errors
    ///
    /// `DuplicateServiceId` if the service is already placed,
    /// `UnknownPartition` if the partition does not exist.
    pub fn add_service(&mut self, service_id: ServiceId, partition_id: PartitionId) -> Result<()> {
        if self.service_partitions.contains_key(&service_id) {
            return Err(NetworkError::DuplicateServiceId {
                service_id: service_id.to_string(),
            });
        }
        let members =
            self.partitions
                .get_mut(&partition_id)
                .ok_or_else(|| NetworkError::UnknownPartition {
                    partition_id: partition_id.to_string(),
                })?;
        members.insert(service_id.clone());
        self.service_partitions.insert(service_id, partition_id);
        Ok(())
    }

    /// Drop a service from its partition; the partition itself stays
    ///
    /// # Errors
    ///
    /// `UnknownService` if the service is not placed.
    pub fn remove_service(&mut self, service_id: &ServiceId) -> Result<PartitionId> {
        let partition_id = self.service_partitions.remove(service_id).ok_or_else(|| {
            NetworkError::UnknownService {
                service_id: service_id.to_string(),
            }
        })?;
        if let Some(members) = self.partitions.get_mut(&partition_id) {
            members.remove(service_id);
        }
        Ok(partition_id)
    }

    /// Replace the whole layout
    ///
    /// Tracked services absent from `partitions` land in the default
    /// partition. Nothing changes unless the whole request is valid.
    ///
    /// # Errors
    ///
    /// `PartitionOverlap`, `UnknownServiceInPartition` or `UnknownPartition`
    /// as reported by [`validation::validate_repartition`].
    pub fn repartition(
        &mut self,
        partitions: BTreeMap<PartitionId, ServiceIdSet>,
        connections: BTreeMap<PartitionConnectionId, Connection>,
        default_connection: Connection,
    ) -> Result<()> {
        let registered = self.services();
        validation::validate_repartition(&partitions, &connections, &registered)?;

        let mut new_partitions = partitions;
        let placed = new_partitions
            .values()
            .fold(ServiceIdSet::new(), |acc, members| acc.union(members));
        let unplaced = registered.difference(&placed);
        new_partitions
            .entry(PartitionId::default_partition())
            .or_default()
            .extend_from(&unplaced);

        let service_partitions = new_partitions
            .iter()
            .flat_map(|(pid, members)| members.iter().map(move |sid| (sid.clone(), pid.clone())))
            .collect();

        self.partitions = new_partitions;
        self.service_partitions = service_partitions;
        self.connections = connections;
        self.default_connection = default_connection;
        Ok(())
    }

    /// Traffic rule between two services
    ///
    /// # Errors
    ///
    /// `UnknownService` if either service is not placed.
    pub fn connection_between(&self, a: &ServiceId, b: &ServiceId) -> Result<Connection> {
        let partition_a = self.require_partition(a)?;
        let partition_b = self.require_partition(b)?;
        if partition_a == partition_b {
            return Ok(Connection::unblocked());
        }
        Ok(self.partition_connection(partition_a, partition_b))
    }

    /// Packet loss from each service toward every service in another partition
    pub fn packet_loss_by_service(&self) -> BTreeMap<ServiceId, BTreeMap<ServiceId, f32>> {
        self.service_partitions
            .iter()
            .map(|(from, from_partition)| {
                let targets = self
                    .service_partitions
                    .iter()
                    .filter(|(_, to_partition)| *to_partition != from_partition)
                    .map(|(to, to_partition)| {
                        let loss = self
                            .partition_connection(from_partition, to_partition)
                            .packet_loss_percentage();
                        (to.clone(), loss)
                    })
                    .collect();
                (from.clone(), targets)
            })
            .collect()
    }

    fn partition_connection(&self, a: &PartitionId, b: &PartitionId) -> Connection {
        self.connections
            .get(&PartitionConnectionId::new(a.clone(), b.clone()))
            .copied()
            .unwrap_or(self.default_connection)
    }

    fn require_partition(&self, service_id: &ServiceId) -> Result<&PartitionId> {
        self.service_partitions
            .get(service_id)
            .ok_or_else(|| NetworkError::UnknownService {
                service_id: service_id.to_string(),
            })
    }
}

impl Default for PartitionTopology {
    fn default() -> Self {
        Self::new(Connection::unblocked())
    }
}
