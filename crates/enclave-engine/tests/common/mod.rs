use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use enclave_core::model::{ContainerHandle, PortSpec};
use enclave_engine::{
    Backend, BackendError, ContainerSpec, Enclave, EngineConfig, ExecResult, HostPortBinding,
    HttpWaitSpec, InMemoryModuleProvider,
};

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub enum Call {
    /// Validation probe; not an effect
    InspectImage(String),
    PullImage(String),
    CreateAndStart {
        name: String,
        image: String,
        ip: Option<Ipv4Addr>,
        env: BTreeMap<String, String>,
    },
    Stop(String),
    Exec {
        handle: String,
        command: Vec<String>,
    },
    BindHostPort {
        handle: String,
        port: u16,
    },
    CopyFiles {
        handle: String,
        src_path: String,
        artifact_name: String,
    },
    WaitHttp {
        ip: Ipv4Addr,
        port: u16,
    },
    TrafficControl {
        handle: String,
        packet_loss: BTreeMap<Ipv4Addr, f32>,
    },
}

/// Backend that records every call and succeeds unless told otherwise
///
/// Container handles are `ctr-<name>`.
#[derive(Default)]
pub struct MockBackend {
    calls: Mutex<Vec<Call>>,
    missing_images: BTreeSet<String>,
    broken_images: BTreeSet<String>,
    create_delay_ms: u64,
    exec_exit_code: i32,
    unreachable_ports: BTreeSet<u16>,
    fail_bind: bool,
    fail_copy: bool,
    fail_stop: bool,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_missing_image(mut self, image: &str) -> Self {
        self.missing_images.insert(image.to_string());
        self
    }

    /// Probes succeed but pulls fail, so the failure surfaces during execution
    pub fn with_broken_image(mut self, image: &str) -> Self {
        self.broken_images.insert(image.to_string());
        self
    }

    /// Container creation sleeps before returning
    pub fn with_create_delay_ms(mut self, delay_ms: u64) -> Self {
        self.create_delay_ms = delay_ms;
        self
    }

    /// Every exec returns this exit code
    pub fn with_exec_exit_code(mut self, code: i32) -> Self {
        self.exec_exit_code = code;
        self
    }

    /// HTTP waits on this port time out
    pub fn with_unreachable_port(mut self, port: u16) -> Self {
        self.unreachable_ports.insert(port);
        self
    }

    /// Every host port binding fails
    pub fn with_failing_bind(mut self) -> Self {
        self.fail_bind = true;
        self
    }

    /// Every copy out of a container fails
    pub fn with_failing_copy(mut self) -> Self {
        self.fail_copy = true;
        self
    }

    /// Stops are recorded but report an error
    pub fn with_failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls with an effect on containers, i.e. everything but image probes
    pub fn effect_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::InspectImage(_)))
            .collect()
    }

    /// Names of all containers created, in order
    pub fn created(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CreateAndStart { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Containers created and not stopped since, in creation order
    pub fn running(&self) -> Vec<String> {
        let mut running: Vec<String> = Vec::new();
        for call in self.calls() {
            match call {
                Call::CreateAndStart { name, .. } => running.push(format!("ctr-{}", name)),
                Call::Stop(handle) => running.retain(|h| *h != handle),
                _ => {}
            }
        }
        running
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn image_result(&self, image: &str) -> Result<(), BackendError> {
        if self.missing_images.contains(image) {
            return Err(BackendError::ImageNotFound {
                image: image.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn inspect_image(&self, image: &str) -> Result<(), BackendError> {
        self.record(Call::InspectImage(image.to_string()));
        self.image_result(image)
    }

    async fn pull_image(&self, image: &str) -> Result<(), BackendError> {
        self.record(Call::PullImage(image.to_string()));
        if self.broken_images.contains(image) {
            return Err(BackendError::Runtime {
                message: format!("registry refused {}", image),
            });
        }
        self.image_result(image)
    }

    async fn create_and_start_container(
        &self,
        spec: &ContainerSpec,
    ) -> Result<ContainerHandle, BackendError> {
        self.record(Call::CreateAndStart {
            name: spec.name.clone(),
            image: spec.image.clone(),
            ip: spec.ip,
            env: spec.env.clone(),
        });
        if self.create_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.create_delay_ms)).await;
        }
        self.image_result(&spec.image)?;
        Ok(ContainerHandle::new(format!("ctr-{}", spec.name)))
    }

    async fn stop_container(&self, handle: &ContainerHandle) -> Result<(), BackendError> {
        self.record(Call::Stop(handle.as_str().to_string()));
        if self.fail_stop {
            return Err(BackendError::Runtime {
                message: format!("{} did not stop", handle),
            });
        }
        Ok(())
    }

    async fn exec_in_container(
        &self,
        handle: &ContainerHandle,
        command: &[String],
    ) -> Result<ExecResult, BackendError> {
        self.record(Call::Exec {
            handle: handle.as_str().to_string(),
            command: command.to_vec(),
        });
        Ok(ExecResult {
            exit_code: self.exec_exit_code,
            output: "ok".to_string(),
        })
    }

    async fn bind_host_port(
        &self,
        handle: &ContainerHandle,
        port: &PortSpec,
    ) -> Result<HostPortBinding, BackendError> {
        self.record(Call::BindHostPort {
            handle: handle.as_str().to_string(),
            port: port.number,
        });
        if self.fail_bind {
            return Err(BackendError::Runtime {
                message: "no host port".to_string(),
            });
        }
        Ok(HostPortBinding {
            host_ip: Ipv4Addr::LOCALHOST,
            host_port: 30000 + port.number % 1000,
        })
    }

    async fn copy_files_from_container(
        &self,
        handle: &ContainerHandle,
        src_path: &str,
        artifact_name: &str,
    ) -> Result<(), BackendError> {
        self.record(Call::CopyFiles {
            handle: handle.as_str().to_string(),
            src_path: src_path.to_string(),
            artifact_name: artifact_name.to_string(),
        });
        if self.fail_copy {
            return Err(BackendError::Runtime {
                message: "copy failed".to_string(),
            });
        }
        Ok(())
    }

    async fn wait_for_http_endpoint(
        &self,
        ip: Ipv4Addr,
        spec: &HttpWaitSpec,
    ) -> Result<(), BackendError> {
        self.record(Call::WaitHttp {
            ip,
            port: spec.port,
        });
        if self.unreachable_ports.contains(&spec.port) {
            return Err(BackendError::Timeout {
                message: format!("{}:{}{} did not answer", ip, spec.port, spec.path),
            });
        }
        Ok(())
    }

    async fn update_traffic_control(
        &self,
        handle: &ContainerHandle,
        packet_loss: &BTreeMap<Ipv4Addr, f32>,
    ) -> Result<(), BackendError> {
        self.record(Call::TrafficControl {
            handle: handle.as_str().to_string(),
            packet_loss: packet_loss.clone(),
        });
        Ok(())
    }
}

/// Config for a /24 test subnet with the gateway reserved
#[allow(dead_code)]
pub fn test_config() -> EngineConfig {
    EngineConfig::from_toml_str(
        r#"
subnet = "10.20.0.0/24"
reserved_ips = ["10.20.0.1"]
"#,
    )
    .unwrap()
}

#[allow(dead_code)]
pub fn enclave_with(backend: Arc<MockBackend>) -> Enclave {
    enclave_with_modules(backend, InMemoryModuleProvider::new())
}

#[allow(dead_code)]
pub fn enclave_with_modules(backend: Arc<MockBackend>, modules: InMemoryModuleProvider) -> Enclave {
    Enclave::new(test_config(), backend, Arc::new(modules)).unwrap()
}
