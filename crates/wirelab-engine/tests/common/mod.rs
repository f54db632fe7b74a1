//! In-memory runtime fake for engine tests.
//!
//! Records every operation in a shared, ordered event log so tests can
//! assert scheduling order without a container daemon or root
//! privileges.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use wirelab_core::{MgmtNet, NodeConfig};
use wirelab_runtime::{
    ContainerRecord, ContainerRuntime, ContainerStatus, ExecOutput, ListFilter, MgmtIps,
    RuntimeError,
};

/// Shared ordered log of runtime and wire events.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn new_event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn log_event(log: &EventLog, event: impl Into<String>) {
    log.lock().unwrap().push(event.into());
}

/// Position of the first matching event in the log.
pub fn event_index(log: &EventLog, event: &str) -> Option<usize> {
    log.lock().unwrap().iter().position(|e| e == event)
}

#[derive(Clone)]
struct MockContainer {
    id: String,
    long_name: String,
    labels: HashMap<String, String>,
    ipv4: String,
}

/// An in-memory [`ContainerRuntime`].
pub struct MockRuntime {
    events: EventLog,
    containers: Mutex<HashMap<String, MockContainer>>,
    /// Status answers for `get_status`, keyed by container name.
    pub statuses: Mutex<HashMap<String, ContainerStatus>>,
    /// Health answers for `get_health`, keyed by container name.
    pub health: Mutex<HashMap<String, bool>>,
    created_total: AtomicU8,
    removed_total: AtomicU8,
    ip_counter: AtomicU8,
}

impl MockRuntime {
    pub fn new(events: EventLog) -> Arc<Self> {
        Arc::new(Self {
            events,
            containers: Mutex::new(HashMap::new()),
            statuses: Mutex::new(HashMap::new()),
            health: Mutex::new(HashMap::new()),
            created_total: AtomicU8::new(0),
            removed_total: AtomicU8::new(0),
            ip_counter: AtomicU8::new(10),
        })
    }

    pub fn created_count(&self) -> u8 {
        self.created_total.load(Ordering::SeqCst)
    }

    pub fn removed_count(&self) -> u8 {
        self.removed_total.load(Ordering::SeqCst)
    }

    fn record(&self, container: &MockContainer) -> ContainerRecord {
        ContainerRecord {
            names: vec![container.long_name.clone()],
            id: container.id.clone(),
            short_id: container.id.clone(),
            image: "mock:latest".to_string(),
            state: "running".to_string(),
            status: "Up".to_string(),
            labels: container.labels.clone(),
            network_settings: MgmtIps {
                ipv4_addr: Some(container.ipv4.clone()),
                ipv4_prefix_len: Some(24),
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create_network(&self, mgmt: &MgmtNet) -> Result<MgmtNet, RuntimeError> {
        log_event(&self.events, "network-created");
        let mut mgmt = mgmt.clone();
        mgmt.bridge = Some("br-mock".to_string());
        mgmt.ipv4_gw = Some("172.20.20.1".to_string());
        Ok(mgmt)
    }

    async fn delete_network(&self, _mgmt: &MgmtNet) -> Result<(), RuntimeError> {
        log_event(&self.events, "network-removed");
        Ok(())
    }

    async fn pull_image_if_required(&self, image: &str) -> Result<(), RuntimeError> {
        log_event(&self.events, format!("pull:{}", image));
        Ok(())
    }

    async fn create_container(&self, node: &NodeConfig) -> Result<String, RuntimeError> {
        let id = format!("c-{}", node.short_name);
        let ipv4 = match node.static_ipv4().map_err(|e| {
            RuntimeError::container_create_failed(&node.long_name, e.to_string())
        })? {
            Some(ip) => ip,
            None => format!(
                "172.20.20.{}",
                self.ip_counter.fetch_add(1, Ordering::SeqCst)
            ),
        };
        self.containers.lock().unwrap().insert(
            id.clone(),
            MockContainer {
                id: id.clone(),
                long_name: node.long_name.clone(),
                labels: node.labels.clone(),
                ipv4,
            },
        );
        self.created_total.fetch_add(1, Ordering::SeqCst);
        log_event(&self.events, format!("create:{}", node.short_name));
        Ok(id)
    }

    async fn start_container(
        &self,
        container_id: &str,
        long_name: &str,
    ) -> Result<String, RuntimeError> {
        log_event(&self.events, format!("start:{}", long_name));
        let _ = container_id;
        Ok("/proc/self/ns/net".to_string())
    }

    async fn stop_container(
        &self,
        container_id: &str,
        _timeout: Option<Duration>,
    ) -> Result<(), RuntimeError> {
        log_event(&self.events, format!("stop:{}", container_id));
        Ok(())
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        let mut containers = self.containers.lock().unwrap();
        if containers.remove(container_id).is_some() {
            self.removed_total.fetch_add(1, Ordering::SeqCst);
            log_event(&self.events, format!("remove:{}", container_id));
        }
        Ok(())
    }

    async fn list_containers(
        &self,
        filters: &[ListFilter],
    ) -> Result<Vec<ContainerRecord>, RuntimeError> {
        let containers = self.containers.lock().unwrap();
        let matches = |c: &MockContainer| {
            filters.iter().all(|f| match f {
                ListFilter::Label { key, value } => match value {
                    Some(v) => c.labels.get(key) == Some(v),
                    None => c.labels.contains_key(key),
                },
                ListFilter::Name(name) => c.long_name == *name,
                ListFilter::Status(_) => true,
            })
        };
        Ok(containers
            .values()
            .filter(|c| matches(c))
            .map(|c| self.record(c))
            .collect())
    }

    async fn get_ns_path(&self, _container_id: &str) -> Result<String, RuntimeError> {
        Ok("/proc/self/ns/net".to_string())
    }

    async fn exec(&self, container_id: &str, cmd: &[String]) -> Result<ExecOutput, RuntimeError> {
        log_event(&self.events, format!("exec:{}:{}", container_id, cmd.join(" ")));
        Ok(ExecOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
        })
    }

    async fn exec_detached(&self, _container_id: &str, _cmd: &[String]) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn get_status(&self, name: &str) -> ContainerStatus {
        if let Some(status) = self.statuses.lock().unwrap().get(name) {
            return *status;
        }
        let containers = self.containers.lock().unwrap();
        if containers.values().any(|c| c.long_name == name) {
            ContainerStatus::Running
        } else {
            ContainerStatus::NotFound
        }
    }

    async fn get_health(&self, name: &str) -> Result<bool, RuntimeError> {
        match self.health.lock().unwrap().get(name) {
            Some(healthy) => Ok(*healthy),
            None => Err(RuntimeError::unavailable(format!(
                "container {} has no health probe",
                name
            ))),
        }
    }

    async fn get_hosts_path(&self, _container_id: &str) -> Result<String, RuntimeError> {
        Ok("/dev/null".to_string())
    }
}
