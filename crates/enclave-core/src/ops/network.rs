use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard};

use enclave_core_types::schema::{FIELD_PARTITION_ID, FIELD_SERVICE_ID};

use crate::errors::{NetworkError, Result};
use crate::model::{
    Connection, ContainerHandle, PartitionConnectionId, PartitionId, PortSpec, ServiceId,
    ServiceIdSet, ServiceRecord, ServiceState,
};

use super::ip_tracker::{FreeIpAddrTracker, Subnet};
use super::topology::PartitionTopology;

/// Construction parameters of a service network
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSettings {
    pub subnet: Subnet,
    /// Addresses never handed out (typically the gateway)
    pub reserved_ips: Vec<Ipv4Addr>,
    pub partitioning_enabled: bool,
    pub default_connection: Connection,
}

/// In-memory state of one enclave's service network
///
/// Cloning the state is how checkpoints are taken; see
/// [`ServiceNetwork::snapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkState {
    ip_tracker: FreeIpAddrTracker,
    services: BTreeMap<ServiceId, ServiceRecord>,
    topology: PartitionTopology,
    files_artifacts: BTreeSet<String>,
    partitioning_enabled: bool,
}

impl NetworkState {
    pub fn new(settings: NetworkSettings) -> Self {
        Self {
            ip_tracker: FreeIpAddrTracker::with_reserved(settings.subnet, settings.reserved_ips),
            services: BTreeMap::new(),
            topology: PartitionTopology::new(settings.default_connection),
            files_artifacts: BTreeSet::new(),
            partitioning_enabled: settings.partitioning_enabled,
        }
    }

    // ===== IP allocation =====

    /// # Errors
    ///
    /// `AddressSpaceExhausted` when the subnet has no free address.
    pub fn allocate_ip(&mut self) -> Result<Ipv4Addr> {
        self.ip_tracker.allocate()
    }

    pub fn release_ip(&mut self, addr: Ipv4Addr) {
        self.ip_tracker.release(addr);
    }

    pub fn subnet(&self) -> Subnet {
        self.ip_tracker.subnet()
    }

    // ===== Service lifecycle =====

    /// Register a service and hand it an IP
    ///
    /// Without a partition the service joins the default partition. The IP
    /// is released again if placement fails.
    ///
    /// # Errors
    ///
    /// `InvalidServiceId`, `DuplicateServiceId`, `PartitioningDisabled`,
    /// `AddressSpaceExhausted` or `UnknownPartition`.
    pub fn register_service(
        &mut self,
        service_id: ServiceId,
        partition_id: Option<PartitionId>,
    ) -> Result<Ipv4Addr> {
        if service_id.is_blank() {
            return Err(NetworkError::InvalidServiceId {
                service_id: service_id.to_string(),
            });
        }
        if self.services.contains_key(&service_id) {
            return Err(NetworkError::DuplicateServiceId {
                service_id: service_id.to_string(),
            });
        }
        let partition_id = partition_id.unwrap_or_else(PartitionId::default_partition);
        if !partition_id.is_default() && !self.partitioning_enabled {
            return Err(NetworkError::PartitioningDisabled);
        }

        let ip = self.ip_tracker.allocate()?;
        if let Err(err) = self
            .topology
            .add_service(service_id.clone(), partition_id.clone())
        {
            self.ip_tracker.release(ip);
            return Err(err);
        }

        tracing::debug!(
            { FIELD_SERVICE_ID } = %service_id,
            { FIELD_PARTITION_ID } = %partition_id,
            ip = %ip,
            "service registered"
        );
        self.services
            .insert(service_id.clone(), ServiceRecord::registered(service_id, ip));
        Ok(ip)
    }

    /// Record that a container now runs for a registered service
    ///
    /// `handle` is `None` when no backend was involved (dry run).
    ///
    /// # Errors
    ///
    /// `UnknownService` or `ServiceAlreadyStarted`.
    pub fn mark_started(
        &mut self,
        service_id: &ServiceId,
        handle: Option<ContainerHandle>,
        ports: BTreeMap<String, PortSpec>,
    ) -> Result<()> {
        let record = self.record_mut(service_id)?;
        if record.state == ServiceState::Started {
            return Err(NetworkError::ServiceAlreadyStarted {
                service_id: service_id.to_string(),
            });
        }
        record.state = ServiceState::Started;
        record.handle = handle;
        record.ports = ports;
        Ok(())
    }

    /// Record the backend handle of a started service
    ///
    /// # Errors
    ///
    /// `UnknownService` or `ServiceNotStarted`.
    pub fn attach_container(
        &mut self,
        service_id: &ServiceId,
        handle: ContainerHandle,
    ) -> Result<()> {
        let record = self.record_mut(service_id)?;
        if record.state != ServiceState::Started {
            return Err(NetworkError::ServiceNotStarted {
                service_id: service_id.to_string(),
            });
        }
        record.handle = Some(handle);
        Ok(())
    }

    /// Remove a service, free its IP and drop it from its partition
    ///
    /// The returned record is marked `Removed`; the id may be registered
    /// again afterwards.
    ///
    /// # Errors
    ///
    /// `UnknownService` if no such service is registered.
    pub fn remove_service(&mut self, service_id: &ServiceId) -> Result<ServiceRecord> {
        let mut record =
            self.services
                .remove(service_id)
                .ok_or_else(|| NetworkError::UnknownService {
                    service_id: service_id.to_string(),
                })?;
        self.topology.remove_service(service_id)?;
        self.ip_tracker.release(record.ip);
        record.state = ServiceState::Removed;
        tracing::debug!({ FIELD_SERVICE_ID } = %service_id, "service removed");
        Ok(record)
    }

    // ===== Partitioning =====

    /// Replace the partition layout atomically
    ///
    /// # Errors
    ///
    /// `PartitioningDisabled`, `PartitionOverlap`,
    /// `UnknownServiceInPartition` or `UnknownPartition`; state is unchanged.
    pub fn repartition(
        &mut self,
        partitions: BTreeMap<PartitionId, ServiceIdSet>,
        connections: BTreeMap<PartitionConnectionId, Connection>,
        default_connection: Connection,
    ) -> Result<()> {
        if !self.partitioning_enabled {
            return Err(NetworkError::PartitioningDisabled);
        }
        self.topology
            .repartition(partitions, connections, default_connection)
    }

    /// # Errors
    ///
    /// `UnknownService` if either service is not registered.
    pub fn connection_between(&self, a: &ServiceId, b: &ServiceId) -> Result<Connection> {
        self.topology.connection_between(a, b)
    }

    pub fn packet_loss_by_service(&self) -> BTreeMap<ServiceId, BTreeMap<ServiceId, f32>> {
        self.topology.packet_loss_by_service()
    }

    pub fn partitioning_enabled(&self) -> bool {
        self.partitioning_enabled
    }

    // ===== Files artifacts =====

    /// # Errors
    ///
    /// `DuplicateArtifact` if the name is taken.
    pub fn add_files_artifact(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if !self.files_artifacts.insert(name.clone()) {
            return Err(NetworkError::DuplicateArtifact { name });
        }
        Ok(())
    }

    /// # Errors
    ///
    /// `UnknownArtifact` for the first name that is not stored.
    pub fn require_files_artifacts<'a>(
        &self,
        names: impl IntoIterator<Item = &'a String>,
    ) -> Result<()> {
        match names.into_iter().find(|name| !self.has_files_artifact(name)) {
            Some(name) => Err(NetworkError::UnknownArtifact { name: name.clone() }),
            None => Ok(()),
        }
    }

    pub fn has_files_artifact(&self, name: &str) -> bool {
        self.files_artifacts.contains(name)
    }

    pub fn files_artifacts(&self) -> &BTreeSet<String> {
        &self.files_artifacts
    }

    // ===== Read accessors =====

    pub fn service(&self, service_id: &ServiceId) -> Option<&ServiceRecord> {
        self.services.get(service_id)
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceRecord> {
        self.services.values()
    }

    pub fn service_ids(&self) -> ServiceIdSet {
        self.services.keys().cloned().collect()
    }

    pub fn partition_of(&self, service_id: &ServiceId) -> Option<&PartitionId> {
        self.topology.partition_of(service_id)
    }

    pub fn partitions(&self) -> &BTreeMap<PartitionId, ServiceIdSet> {
        self.topology.partitions()
    }

    pub fn topology(&self) -> &PartitionTopology {
        &self.topology
    }

    fn record_mut(&mut self, service_id: &ServiceId) -> Result<&mut ServiceRecord> {
        self.services
            .get_mut(service_id)
            .ok_or_else(|| NetworkError::UnknownService {
                service_id: service_id.to_string(),
            })
    }
}

/// Shared handle to an enclave's network state
///
/// All access goes through one mutex. Guards are never held across an
/// await point; callers lock, mutate and release.
#[derive(Debug)]
pub struct ServiceNetwork {
    state: Mutex<NetworkState>,
}

impl ServiceNetwork {
    pub fn new(settings: NetworkSettings) -> Self {
        Self {
            state: Mutex::new(NetworkState::new(settings)),
        }
    }

    /// Run `f` with exclusive access to the state
    ///
    /// # Errors
    ///
    /// `Internal` if the lock is poisoned.
    pub fn with_state<T>(&self, f: impl FnOnce(&mut NetworkState) -> T) -> Result<T> {
        let mut guard = self.lock()?;
        Ok(f(&mut guard))
    }

    /// Copy of the current state
    ///
    /// # Errors
    ///
    /// `Internal` if the lock is poisoned.
    pub fn snapshot(&self) -> Result<NetworkState> {
        Ok(self.lock()?.clone())
    }

    /// Put back a state taken with [`snapshot`](Self::snapshot)
    ///
    /// # Errors
    ///
    /// `Internal` if the lock is poisoned.
    pub fn restore(&self, snapshot: NetworkState) -> Result<()> {
        *self.lock()? = snapshot;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, NetworkState>> {
        self.state.lock().map_err(|_| NetworkError::Internal {
            message: "network state lock poisoned".to_string(),
        })
    }
}
