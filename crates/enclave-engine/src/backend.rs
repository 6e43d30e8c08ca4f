//! Container backend boundary
//!
//! The engine never talks to a container runtime directly. Everything that
//! touches containers goes through [`Backend`]; the validator only needs the
//! narrower [`ImageProbe`], which every backend provides.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use enclave_core::model::{ContainerHandle, PortSpec};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Image not available: {image}")]
    ImageNotFound { image: String },

    #[error("Container not found: {handle}")]
    ContainerNotFound { handle: String },

    #[error("Exec failed in {handle}: {message}")]
    ExecFailed { handle: String, message: String },

    #[error("Timed out: {message}")]
    Timeout { message: String },

    #[error("Backend error: {message}")]
    Runtime { message: String },
}

/// Everything needed to create one container
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContainerSpec {
    /// Service id or task name
    pub name: String,
    pub image: String,
    pub ip: Option<Ipv4Addr>,
    pub ports: BTreeMap<String, PortSpec>,
    pub entrypoint: Vec<String>,
    pub cmd: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Mount path to files artifact name
    pub files: BTreeMap<String, String>,
    pub data_dir_mount: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub exit_code: i32,
    pub output: String,
}

/// Polling parameters for an HTTP readiness check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpWaitSpec {
    pub port: u16,
    pub path: String,
    pub initial_delay_ms: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub body_text: Option<String>,
}

/// A container port published on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPortBinding {
    pub host_ip: Ipv4Addr,
    pub host_port: u16,
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Make sure the image is present locally
    async fn pull_image(&self, image: &str) -> Result<(), BackendError>;

    /// Read-only availability check used during validation
    ///
    /// Defaults to a pull; backends with a registry lookup should override.
    async fn inspect_image(&self, image: &str) -> Result<(), BackendError> {
        self.pull_image(image).await
    }

    async fn create_and_start_container(
        &self,
        spec: &ContainerSpec,
    ) -> Result<ContainerHandle, BackendError>;

    async fn stop_container(&self, handle: &ContainerHandle) -> Result<(), BackendError>;

    async fn exec_in_container(
        &self,
        handle: &ContainerHandle,
        command: &[String],
    ) -> Result<ExecResult, BackendError>;

    async fn bind_host_port(
        &self,
        handle: &ContainerHandle,
        port: &PortSpec,
    ) -> Result<HostPortBinding, BackendError>;

    /// Copy `src_path` out of the container into the named files artifact
    async fn copy_files_from_container(
        &self,
        handle: &ContainerHandle,
        src_path: &str,
        artifact_name: &str,
    ) -> Result<(), BackendError>;

    /// Poll until the endpoint answers; the backend owns the retry timers
    async fn wait_for_http_endpoint(
        &self,
        ip: Ipv4Addr,
        spec: &HttpWaitSpec,
    ) -> Result<(), BackendError>;

    /// Replace the packet-loss rules of one container, keyed by peer IP
    async fn update_traffic_control(
        &self,
        handle: &ContainerHandle,
        packet_loss: &BTreeMap<Ipv4Addr, f32>,
    ) -> Result<(), BackendError>;
}

/// Read-only image availability check
#[async_trait]
pub trait ImageProbe: Send + Sync {
    async fn check_image(&self, image: &str) -> Result<(), BackendError>;
}

#[async_trait]
impl<B: Backend + ?Sized> ImageProbe for B {
    async fn check_image(&self, image: &str) -> Result<(), BackendError> {
        self.inspect_image(image).await
    }
}
