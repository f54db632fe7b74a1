//! Docker implementation of the runtime adapter.
//!
//! Talks to the Docker daemon over its local unix socket via the Engine
//! API. The podman adapter reuses this implementation against podman's
//! compatibility socket.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions};
use bollard::secret::HealthStatusEnum;
use bollard::service::{
    EndpointIpamConfig, EndpointSettings, HostConfig, Ipam, IpamConfig, PortBinding,
    ResourcesUlimits, RestartPolicy, RestartPolicyNameEnum,
};
use bollard::Docker;
use futures::StreamExt;
use nix::sys::resource::{getrlimit, Resource};
use tracing::{debug, info, warn};
use wirelab_core::{MgmtNet, NetworkMode, NodeConfig};

use crate::error::{Result, RuntimeError};
use crate::hostcfg;
use crate::traits::{
    ContainerRecord, ContainerRuntime, ContainerStatus, ExecOutput, ListFilter, MgmtIps,
};

/// Hard ceiling for the `nofile` ulimit handed to containers.
const NOFILE_CEILING: u64 = 1_048_576;

/// MTU assumed when the runtime's default network does not advertise one.
const FALLBACK_MTU: u32 = 1500;

/// Name of the runtime's own default network, never owned by a lab.
const DEFAULT_NETWORK: &str = "bridge";

/// Adapter configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Per-call deadline for runtime operations.
    pub timeout: Duration,

    /// Management network name, used to pick the right addresses out of
    /// container listings.
    pub mgmt_network: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            mgmt_network: wirelab_core::topology::MgmtNet::default().network,
        }
    }
}

/// Docker runtime adapter.
pub struct DockerRuntime {
    client: Docker,
    config: RuntimeConfig,
}

impl DockerRuntime {
    /// Connects to the local Docker daemon and verifies the connection.
    pub async fn new(config: RuntimeConfig) -> Result<Self> {
        let client = Docker::connect_with_local_defaults()?;
        client.ping().await?;
        info!("connected to Docker daemon");
        Ok(Self { client, config })
    }

    /// Wraps an existing client; used by the podman adapter.
    pub(crate) fn with_client(client: Docker, config: RuntimeConfig) -> Self {
        Self { client, config }
    }

    async fn deadline<T, F>(&self, condition: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, bollard::errors::Error>>,
    {
        match tokio::time::timeout(self.config.timeout, fut).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(RuntimeError::timeout(condition.to_string())),
        }
    }

    /// Discovers the MTU of the runtime's default network.
    async fn default_network_mtu(&self) -> u32 {
        let inspect = self
            .client
            .inspect_network(DEFAULT_NETWORK, None::<InspectNetworkOptions<String>>)
            .await;
        match inspect {
            Ok(net) => net
                .options
                .as_ref()
                .and_then(|o| o.get("com.docker.network.driver.mtu"))
                .and_then(|mtu| mtu.parse().ok())
                .unwrap_or(FALLBACK_MTU),
            Err(_) => {
                debug!("could not inspect default network for MTU discovery");
                FALLBACK_MTU
            }
        }
    }

    /// Derives the Linux bridge name backing a network.
    fn bridge_name(network: &str, id: &str, options: Option<&HashMap<String, String>>) -> String {
        if network == DEFAULT_NETWORK {
            return "docker0".to_string();
        }
        if let Some(name) = options.and_then(|o| o.get("com.docker.network.bridge.name")) {
            if !name.is_empty() {
                return name.clone();
            }
        }
        format!("br-{}", &id[..id.len().min(12)])
    }

    /// Reads the management bridge's first addresses into the gateway
    /// fields so template rendering can reference them.
    async fn populate_gateways(&self, mgmt: &mut MgmtNet) {
        let Some(bridge) = mgmt.bridge.clone() else {
            return;
        };
        let handle = match wirelab_netlink::ns_handle(None) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(error = %err, "could not open netlink handle for gateway discovery");
                return;
            }
        };
        match wirelab_netlink::addr::first_link_ips(&handle, &bridge).await {
            Ok((v4, v6)) => {
                if mgmt.ipv4_gw.is_none() {
                    mgmt.ipv4_gw = v4.map(|a| a.to_string());
                }
                if mgmt.ipv6_gw.is_none() {
                    mgmt.ipv6_gw = v6.map(|a| a.to_string());
                }
            }
            Err(err) => {
                debug!(bridge = %bridge, error = %err, "no addresses found on management bridge");
            }
        }
    }

    fn build_ipam(mgmt: &MgmtNet) -> (Ipam, bool) {
        let mut ipam_config = Vec::new();
        let mut enable_ipv6 = false;

        if let Some(subnet) = &mgmt.ipv4_subnet {
            ipam_config.push(IpamConfig {
                subnet: Some(subnet.clone()),
                gateway: mgmt.ipv4_gw.clone(),
                ..Default::default()
            });
        }
        if let Some(subnet) = &mgmt.ipv6_subnet {
            ipam_config.push(IpamConfig {
                subnet: Some(subnet.clone()),
                gateway: mgmt.ipv6_gw.clone(),
                ..Default::default()
            });
            enable_ipv6 = true;
        }

        (
            Ipam {
                driver: Some("default".to_string()),
                config: Some(ipam_config),
                ..Default::default()
            },
            enable_ipv6,
        )
    }

    fn nofile_ulimit() -> ResourcesUlimits {
        let hard = match getrlimit(Resource::RLIMIT_NOFILE) {
            Ok((_, hard)) => hard.min(NOFILE_CEILING),
            Err(err) => {
                warn!(error = %err, "unable to read RLIMIT_NOFILE, using ceiling");
                NOFILE_CEILING
            }
        };
        ResourcesUlimits {
            name: Some("nofile".to_string()),
            soft: Some(hard as i64),
            hard: Some(hard as i64),
        }
    }

    fn build_container_config(&self, node: &NodeConfig) -> Result<Config<String>> {
        let image = node.image.clone().ok_or_else(|| {
            RuntimeError::container_create_failed(&node.long_name, "node has no image")
        })?;

        let env: Vec<String> = node.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

        let (exposed_ports, port_bindings) = parse_ports(&node.ports)?;

        let mut host_config = HostConfig {
            binds: if node.binds.is_empty() {
                None
            } else {
                Some(node.binds.clone())
            },
            port_bindings: if port_bindings.is_empty() {
                None
            } else {
                Some(port_bindings)
            },
            sysctls: if node.sysctls.is_empty() {
                None
            } else {
                Some(node.sysctls.clone())
            },
            privileged: Some(true),
            extra_hosts: if node.extra_hosts.is_empty() {
                None
            } else {
                Some(node.extra_hosts.clone())
            },
            ulimits: Some(vec![Self::nofile_ulimit()]),
            memory: node
                .memory
                .as_deref()
                .map(parse_memory_bytes)
                .transpose()?
                .map(|b| b as i64),
            cpuset_cpus: node.cpu_set.clone(),
            ..Default::default()
        };

        if let Some(cpu) = node.cpu {
            host_config.cpu_quota = Some((cpu * 100_000.0) as i64);
            host_config.cpu_period = Some(100_000);
        }

        // plain containers benefit from automatic restart on failure
        if node.kind == "linux" {
            host_config.restart_policy = Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::ON_FAILURE),
                maximum_retry_count: None,
            });
        }

        let mut networking_config = None;
        match &node.network_mode {
            NetworkMode::Bridge => {
                host_config.network_mode = Some(self.config.mgmt_network.clone());
                let ipam_config = EndpointIpamConfig {
                    ipv4_address: node
                        .static_ipv4()
                        .map_err(|e| RuntimeError::container_create_failed(&node.long_name, e.to_string()))?,
                    ipv6_address: node
                        .static_ipv6()
                        .map_err(|e| RuntimeError::container_create_failed(&node.long_name, e.to_string()))?,
                    ..Default::default()
                };
                if ipam_config.ipv4_address.is_some() || ipam_config.ipv6_address.is_some() {
                    let endpoints: HashMap<String, EndpointSettings> = [(
                        self.config.mgmt_network.clone(),
                        EndpointSettings {
                            ipam_config: Some(ipam_config),
                            ..Default::default()
                        },
                    )]
                    .into_iter()
                    .collect();
                    networking_config =
                        Some(bollard::container::NetworkingConfig { endpoints_config: endpoints });
                }
            }
            NetworkMode::Host => {
                host_config.network_mode = Some("host".to_string());
            }
            NetworkMode::Container(target) => {
                host_config.network_mode = Some(format!("container:{}", target));
            }
        }

        Ok(Config {
            image: Some(image),
            entrypoint: node
                .entrypoint
                .as_deref()
                .map(|e| e.split_whitespace().map(str::to_string).collect()),
            cmd: node
                .cmd
                .as_deref()
                .map(|c| c.split_whitespace().map(str::to_string).collect()),
            env: Some(env),
            hostname: Some(node.short_name.clone()),
            user: node.user.clone(),
            labels: Some(node.labels.clone()),
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            mac_address: if matches!(node.network_mode, NetworkMode::Bridge) {
                node.mac_address.clone()
            } else {
                None
            },
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(true),
            host_config: Some(host_config),
            networking_config,
            ..Default::default()
        })
    }

    fn record_from_summary(&self, summary: bollard::service::ContainerSummary) -> ContainerRecord {
        let id = summary.id.unwrap_or_default();
        let mut record = ContainerRecord {
            short_id: id.chars().take(12).collect(),
            id,
            names: summary
                .names
                .unwrap_or_default()
                .into_iter()
                .map(|n| n.trim_start_matches('/').to_string())
                .collect(),
            image: summary.image.unwrap_or_default(),
            state: summary.state.unwrap_or_default(),
            status: summary.status.unwrap_or_default(),
            labels: summary.labels.unwrap_or_default(),
            network_settings: MgmtIps::default(),
        };

        if let Some(networks) = summary.network_settings.and_then(|s| s.networks) {
            // prefer the management network; fall back to a sole attachment
            let endpoint = networks
                .get(&self.config.mgmt_network)
                .or_else(|| (networks.len() == 1).then(|| networks.values().next()).flatten());
            if let Some(ep) = endpoint {
                record.network_settings = MgmtIps {
                    ipv4_addr: ep.ip_address.clone().filter(|s| !s.is_empty()),
                    ipv4_prefix_len: ep.ip_prefix_len.map(|l| l as u8),
                    ipv6_addr: ep.global_ipv6_address.clone().filter(|s| !s.is_empty()),
                    ipv6_prefix_len: ep.global_ipv6_prefix_len.map(|l| l as u8),
                    ipv4_gw: ep.gateway.clone().filter(|s| !s.is_empty()),
                };
            }
        }
        record
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    async fn create_network(&self, mgmt: &MgmtNet) -> Result<MgmtNet> {
        let mut mgmt = mgmt.clone();

        match self
            .client
            .inspect_network(&mgmt.network, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(existing) => {
                let id = existing.id.unwrap_or_default();
                info!(network = %mgmt.network, "reusing existing management network");
                if mgmt.bridge.is_none() {
                    mgmt.bridge = Some(Self::bridge_name(
                        &mgmt.network,
                        &id,
                        existing.options.as_ref(),
                    ));
                }
            }
            Err(err) if is_api_not_found(&err) => {
                if mgmt.mtu.is_none() {
                    mgmt.mtu = Some(self.default_network_mtu().await);
                }

                // existing bridge addresses become the gateways
                self.populate_gateways(&mut mgmt).await;

                let (ipam, enable_ipv6) = Self::build_ipam(&mgmt);
                let mut options: HashMap<String, String> = HashMap::new();
                if let Some(mtu) = mgmt.mtu {
                    options.insert("com.docker.network.driver.mtu".to_string(), mtu.to_string());
                }
                if let Some(bridge) = &mgmt.bridge {
                    options.insert("com.docker.network.bridge.name".to_string(), bridge.clone());
                }

                let labels: HashMap<String, String> =
                    [(wirelab_core::labels::LAB_LABEL.to_string(), String::new())]
                        .into_iter()
                        .collect();

                info!(
                    network = %mgmt.network,
                    ipv4 = mgmt.ipv4_subnet.as_deref().unwrap_or("-"),
                    ipv6 = mgmt.ipv6_subnet.as_deref().unwrap_or("-"),
                    "creating management network"
                );

                let response = self
                    .deadline(
                        "network create",
                        self.client.create_network(CreateNetworkOptions {
                            name: mgmt.network.clone(),
                            driver: "bridge".to_string(),
                            enable_ipv6,
                            ipam,
                            labels,
                            options,
                            ..Default::default()
                        }),
                    )
                    .await
                    .map_err(|e| RuntimeError::network_create_failed(&mgmt.network, e.to_string()))?;

                let network_id = match &response.id {
                    Some(id) if id.len() >= 12 => id,
                    _ => {
                        return Err(RuntimeError::network_create_failed(
                            &mgmt.network,
                            "no network ID returned",
                        ));
                    }
                };
                if mgmt.bridge.is_none() {
                    mgmt.bridge = Some(format!("br-{}", &network_id[..12]));
                }
            }
            Err(err) => return Err(err.into()),
        }

        self.populate_gateways(&mut mgmt).await;

        if let Some(bridge) = &mgmt.bridge {
            // best effort: each action logs its own warning on failure
            hostcfg::tune_bridge(bridge);
        }

        Ok(mgmt)
    }

    async fn delete_network(&self, mgmt: &MgmtNet) -> Result<()> {
        if mgmt.network == DEFAULT_NETWORK {
            debug!("skipping deletion of the default network");
            return Ok(());
        }

        let inspect = match self
            .client
            .inspect_network(&mgmt.network, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(net) => net,
            Err(err) if is_api_not_found(&err) => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let lab_owned = inspect
            .labels
            .as_ref()
            .map(|l| l.contains_key(wirelab_core::labels::LAB_LABEL))
            .unwrap_or(false);
        if !lab_owned {
            debug!(network = %mgmt.network, "network not lab-owned, keeping it");
            return Ok(());
        }

        let endpoints = inspect.containers.map(|c| c.len()).unwrap_or(0);
        if endpoints > 0 {
            debug!(
                network = %mgmt.network,
                endpoints,
                "network still has endpoints, deletion skipped"
            );
            return Ok(());
        }

        self.deadline("network remove", self.client.remove_network(&mgmt.network))
            .await?;
        info!(network = %mgmt.network, "removed management network");

        if let Some(bridge) = &mgmt.bridge {
            hostcfg::remove_forward_rules(bridge);
        }
        Ok(())
    }

    async fn pull_image_if_required(&self, image: &str) -> Result<()> {
        let filters: HashMap<String, Vec<String>> =
            [("reference".to_string(), vec![image.to_string()])]
                .into_iter()
                .collect();
        let present = self
            .client
            .list_images(Some(ListImagesOptions {
                all: false,
                filters,
                ..Default::default()
            }))
            .await?;
        if !present.is_empty() {
            debug!(image = %image, "image present, skipping pull");
            return Ok(());
        }

        info!(image = %image, "pulling image");
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        let mut stream = self.client.create_image(Some(options), None, None);
        while let Some(item) = stream.next().await {
            match item {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!(status = %status, "pull progress");
                    }
                }
                Err(err) => {
                    return Err(RuntimeError::image_pull_failed(image, err.to_string()));
                }
            }
        }
        info!(image = %image, "image pulled");
        Ok(())
    }

    async fn create_container(&self, node: &NodeConfig) -> Result<String> {
        info!(node = %node.short_name, "creating container");
        let config = self.build_container_config(node)?;

        let options = CreateContainerOptions {
            name: node.long_name.clone(),
            platform: None,
        };

        let response = self
            .deadline(
                "container create",
                self.client.create_container(Some(options), config),
            )
            .await
            .map_err(|e| RuntimeError::container_create_failed(&node.long_name, e.to_string()))?;

        debug!(node = %node.short_name, id = %response.id, "container created");
        Ok(response.id)
    }

    async fn start_container(&self, container_id: &str, long_name: &str) -> Result<String> {
        debug!(container = %long_name, "starting container");
        self.deadline(
            "container start",
            self.client
                .start_container(container_id, None::<StartContainerOptions<String>>),
        )
        .await
        .map_err(|e| RuntimeError::container_start_failed(container_id, e.to_string()))?;

        let ns_path = self.get_ns_path(container_id).await?;
        wirelab_netlink::symlink_netns(&ns_path, long_name).map_err(|e| {
            RuntimeError::container_start_failed(
                container_id,
                format!("failed to link netns: {}", e),
            )
        })?;

        info!(container = %long_name, "container started");
        Ok(ns_path)
    }

    async fn stop_container(&self, container_id: &str, timeout: Option<Duration>) -> Result<()> {
        let options = StopContainerOptions {
            t: timeout.map(|d| d.as_secs() as i64).unwrap_or(10),
        };
        match self.client.stop_container(container_id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(err) if is_api_not_found(&err) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn remove_container(&self, container_id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        match self
            .client
            .remove_container(container_id, Some(options))
            .await
        {
            Ok(()) => {
                info!(container = %container_id, "container removed");
                Ok(())
            }
            Err(err) if is_api_not_found(&err) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_containers(&self, filters: &[ListFilter]) -> Result<Vec<ContainerRecord>> {
        let options = ListContainersOptions {
            all: true,
            filters: ListFilter::to_filter_map(filters),
            ..Default::default()
        };
        let summaries = self.client.list_containers(Some(options)).await?;
        Ok(summaries
            .into_iter()
            .map(|s| self.record_from_summary(s))
            .collect())
    }

    async fn get_ns_path(&self, container_id: &str) -> Result<String> {
        let inspect = self.client.inspect_container(container_id, None).await?;
        let pid = inspect
            .state
            .as_ref()
            .and_then(|s| s.pid)
            .filter(|pid| *pid > 0)
            .ok_or_else(|| {
                RuntimeError::not_found(format!("no PID for container {}", container_id))
            })?;
        Ok(format!("/proc/{}/ns/net", pid))
    }

    async fn exec(&self, container_id: &str, cmd: &[String]) -> Result<ExecOutput> {
        let exec = self
            .client
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(cmd.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    user: Some("root".to_string()),
                    ..Default::default()
                },
            )
            .await?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } =
            self.client.start_exec(&exec.id, None).await?
        {
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(_) => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }

        let inspect = self.client.inspect_exec(&exec.id).await?;
        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code: inspect.exit_code.unwrap_or(-1),
        })
    }

    async fn exec_detached(&self, container_id: &str, cmd: &[String]) -> Result<()> {
        let exec = self
            .client
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(cmd.to_vec()),
                    attach_stdout: Some(false),
                    attach_stderr: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        self.client
            .start_exec(
                &exec.id,
                Some(StartExecOptions {
                    detach: true,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }

    async fn get_status(&self, name: &str) -> ContainerStatus {
        let records = match self.list_containers(&[ListFilter::name(name)]).await {
            Ok(records) => records,
            Err(_) => return ContainerStatus::NotFound,
        };
        match records.first() {
            None => ContainerStatus::NotFound,
            Some(record) if record.is_running() => ContainerStatus::Running,
            Some(_) => ContainerStatus::Stopped,
        }
    }

    async fn get_health(&self, name: &str) -> Result<bool> {
        let inspect = match self.client.inspect_container(name, None).await {
            Ok(inspect) => inspect,
            Err(err) if is_api_not_found(&err) => {
                return Err(RuntimeError::not_found(name.to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        let health = inspect
            .state
            .and_then(|s| s.health)
            .and_then(|h| h.status)
            .ok_or_else(|| {
                RuntimeError::unavailable(format!("container {} has no health probe", name))
            })?;
        match health {
            HealthStatusEnum::HEALTHY => Ok(true),
            HealthStatusEnum::NONE => Err(RuntimeError::unavailable(format!(
                "container {} has no health probe",
                name
            ))),
            _ => Ok(false),
        }
    }

    async fn get_hosts_path(&self, container_id: &str) -> Result<String> {
        let inspect = self.client.inspect_container(container_id, None).await?;
        inspect
            .hosts_path
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                RuntimeError::not_found(format!("no hosts path for container {}", container_id))
            })
    }
}

fn is_api_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Parses a memory limit such as `512m` or `2g` into bytes.
fn parse_memory_bytes(s: &str) -> Result<u64> {
    let s = s.trim().to_lowercase();
    let (digits, multiplier) = match s.chars().last() {
        Some('k') => (&s[..s.len() - 1], 1024u64),
        Some('m') => (&s[..s.len() - 1], 1024 * 1024),
        Some('g') => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s.as_str(), 1),
    };
    digits
        .parse::<u64>()
        .map(|v| v * multiplier)
        .map_err(|_| RuntimeError::container_create_failed("", format!("invalid memory limit {:?}", s)))
}

type PortMaps = (
    HashMap<String, HashMap<(), ()>>,
    HashMap<String, Option<Vec<PortBinding>>>,
);

/// Parses port descriptors of the form
/// `[host_ip:]host_port:container_port[/proto]` or `container_port[/proto]`.
fn parse_ports(ports: &[String]) -> Result<PortMaps> {
    let mut exposed = HashMap::new();
    let mut bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();

    for spec in ports {
        let (addr, proto) = match spec.split_once('/') {
            Some((addr, proto)) => (addr, proto),
            None => (spec.as_str(), "tcp"),
        };
        let parts: Vec<&str> = addr.split(':').collect();
        let (host_ip, host_port, container_port) = match parts.as_slice() {
            [container] => (None, None, *container),
            [host, container] => (None, Some(*host), *container),
            [ip, host, container] => (Some(*ip), Some(*host), *container),
            _ => {
                return Err(RuntimeError::container_create_failed(
                    "",
                    format!("invalid port specification {:?}", spec),
                ))
            }
        };

        let key = format!("{}/{}", container_port, proto);
        exposed.insert(key.clone(), HashMap::new());
        if host_port.is_some() || host_ip.is_some() {
            bindings
                .entry(key)
                .or_insert_with(|| Some(Vec::new()))
                .get_or_insert_with(Vec::new)
                .push(PortBinding {
                    host_ip: host_ip.map(str::to_string),
                    host_port: host_port.map(str::to_string),
                });
        }
    }
    Ok((exposed, bindings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_bytes() {
        assert_eq!(parse_memory_bytes("512").unwrap(), 512);
        assert_eq!(parse_memory_bytes("512m").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_memory_bytes("2G").unwrap(), 2 * 1024 * 1024 * 1024);
        assert!(parse_memory_bytes("lots").is_err());
    }

    #[test]
    fn test_parse_ports() {
        let (exposed, bindings) = parse_ports(&[
            "8080:80/tcp".to_string(),
            "127.0.0.1:5353:53/udp".to_string(),
            "9090".to_string(),
        ])
        .unwrap();

        assert!(exposed.contains_key("80/tcp"));
        assert!(exposed.contains_key("53/udp"));
        assert!(exposed.contains_key("9090/tcp"));

        let http = bindings["80/tcp"].as_ref().unwrap();
        assert_eq!(http[0].host_port.as_deref(), Some("8080"));
        assert!(http[0].host_ip.is_none());

        let dns = bindings["53/udp"].as_ref().unwrap();
        assert_eq!(dns[0].host_ip.as_deref(), Some("127.0.0.1"));

        // expose-only port has no binding
        assert!(!bindings.contains_key("9090/tcp"));
    }

    #[test]
    fn test_parse_ports_rejects_garbage() {
        assert!(parse_ports(&["1:2:3:4:5".to_string()]).is_err());
    }

    #[test]
    fn test_bridge_name_derivation() {
        assert_eq!(DockerRuntime::bridge_name("bridge", "abc", None), "docker0");
        assert_eq!(
            DockerRuntime::bridge_name("clab", "0123456789abcdef", None),
            "br-0123456789ab"
        );

        let mut options = HashMap::new();
        options.insert(
            "com.docker.network.bridge.name".to_string(),
            "br-mgmt".to_string(),
        );
        assert_eq!(
            DockerRuntime::bridge_name("clab", "0123456789abcdef", Some(&options)),
            "br-mgmt"
        );
    }
}
