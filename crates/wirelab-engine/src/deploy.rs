//! The deployment engine.
//!
//! Orchestrates the full flow: resolve the topology, create the
//! management network, build the dependency DAG, run node workers fed by
//! dependency-gated launchers, wire links as endpoint nodes become
//! ready, run the post-deploy pass with health gating, and finalise.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use wirelab_core::error::{LabError, Result};
use wirelab_core::{
    LabDirectory, MgmtNet, NetworkMode, NodeState, Phase, Topology,
};
use wirelab_links::{KernelWire, Link, LinkNodeRef, ResolveParams, Wire};
use wirelab_nodes::DeployContext;
use wirelab_runtime::{ContainerRuntime, ExecOutput, ListFilter};

use crate::dag::DependencyManager;
use crate::external::ExternalWaiter;
use crate::hostsfile;
use crate::labnode::{LabNode, NodeHandle, NodeMap};
use crate::report::{DeployReport, NodeReport};

/// Default node worker pool size before clamping to the node count.
pub const DEFAULT_NODE_WORKERS: usize = 4;

/// Options governing a deploy/destroy invocation.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Worker cap for node and link pools; defaults derive from the
    /// topology size.
    pub max_workers: Option<usize>,

    /// Wall-clock budget for the whole deploy.
    pub timeout: Duration,

    /// Skip the post-deploy pass, including the health barrier.
    pub skip_post_deploy: bool,

    /// Keep the management network on destroy.
    pub keep_mgmt_net: bool,

    /// Destroy the lab and delete its directory before deploying.
    pub reconfigure: bool,

    /// Stop containers gracefully before removal.
    pub graceful: bool,

    /// Override the lab directory parent (tests; the CLI uses the
    /// `CLAB_LABDIR_BASE` environment variable instead).
    pub lab_dir_base: Option<PathBuf>,

    /// Hosts file updated with lab entries.
    pub hosts_file: PathBuf,

    /// External-container polling configuration.
    pub external: ExternalWaiter,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            max_workers: None,
            timeout: Duration::from_secs(600),
            skip_post_deploy: false,
            keep_mgmt_net: false,
            reconfigure: false,
            graceful: true,
            lab_dir_base: None,
            hosts_file: PathBuf::from(hostsfile::HOSTS_FILE),
            external: ExternalWaiter::default(),
        }
    }
}

/// Context cloned into every worker task.
#[derive(Clone)]
struct WorkerCtx {
    nodes: NodeMap,
    runtime: Arc<dyn ContainerRuntime>,
    lab_dir: Arc<LabDirectory>,
    mgmt: Arc<MgmtNet>,
    dm: Arc<DependencyManager>,
    cancel: CancellationToken,
    /// Tracks the per-node post-deploy tasks spawned as nodes come up.
    post_tasks: TaskTracker,
    skip_post_deploy: bool,
    /// Absolute deadline for health polling.
    deadline: Instant,
}

/// The deployment engine for one lab.
pub struct Engine {
    pub(crate) runtime: Arc<dyn ContainerRuntime>,
    pub(crate) topo: Topology,
    pub(crate) nodes: NodeMap,
    pub(crate) links: StdMutex<Vec<Arc<dyn Link>>>,
    pub(crate) mgmt: StdMutex<MgmtNet>,
    pub(crate) dm: Arc<DependencyManager>,
    pub(crate) cancel: CancellationToken,
    pub(crate) opts: DeployOptions,
    pub(crate) lab_dir: Arc<LabDirectory>,
    pub(crate) started: Instant,
    pub(crate) wire: Arc<dyn Wire>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine over a parsed topology and a runtime handle.
    pub fn new(
        topo: Topology,
        runtime: Arc<dyn ContainerRuntime>,
        opts: DeployOptions,
    ) -> Result<Self> {
        Self::with_wire(topo, runtime, opts, Arc::new(KernelWire))
    }

    /// Creates an engine with an explicit wire implementation.
    pub fn with_wire(
        mut topo: Topology,
        runtime: Arc<dyn ContainerRuntime>,
        opts: DeployOptions,
        wire: Arc<dyn Wire>,
    ) -> Result<Self> {
        topo.resolve()?;
        topo.mgmt.apply_subnet_defaults();
        topo.mgmt.validate()?;

        let extra_hosts = collect_extra_hosts(&topo)?;

        let mut nodes = HashMap::new();
        for (name, config) in &topo.topology.nodes {
            let kind = wirelab_nodes::new_kind(&config.kind).ok_or_else(|| {
                LabError::config(format!("unknown kind {:?} for node {:?}", config.kind, name))
            })?;

            let mut config = config.clone();
            kind.init(&mut config)?;
            config.extra_hosts = extra_hosts.clone();

            // managed namespace references address the container by its
            // lab-prefixed name at the runtime layer
            if let NetworkMode::Container(target) = &config.network_mode {
                if topo.topology.nodes.contains_key(target) {
                    config.network_mode = NetworkMode::Container(topo.long_name(target));
                }
            }

            nodes.insert(name.clone(), LabNode::new(config, kind));
        }

        let lab_dir = match &opts.lab_dir_base {
            Some(base) => LabDirectory::with_base(base, &topo.name),
            None => LabDirectory::new(&topo.name),
        };

        let mgmt = topo.mgmt.clone();
        Ok(Self {
            runtime,
            topo,
            nodes: Arc::new(std::sync::RwLock::new(nodes)),
            links: StdMutex::new(Vec::new()),
            mgmt: StdMutex::new(mgmt),
            dm: Arc::new(DependencyManager::new()),
            cancel: CancellationToken::new(),
            opts,
            lab_dir: Arc::new(lab_dir),
            started: Instant::now(),
            wire,
        })
    }

    /// The lab name.
    pub fn lab_name(&self) -> &str {
        &self.topo.name
    }

    /// Token cancelling all in-flight work; cancelling it makes deploy
    /// abort waits, stop runtime calls and destroy whatever was created.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Deploys the lab and returns the aggregate report.
    pub async fn deploy(&self) -> Result<DeployReport> {
        info!(lab = %self.topo.name, nodes = self.topo.node_count(), links = self.topo.link_count(), "deploying lab");

        if self.opts.reconfigure {
            info!(lab = %self.topo.name, "reconfigure requested, destroying previous deployment");
            if let Err(err) = self.destroy().await {
                warn!(error = %err, "destroy before reconfigure failed");
            }
            if self.lab_dir.root().exists() {
                std::fs::remove_dir_all(self.lab_dir.root())?;
            }
        }

        self.preflight().await?;

        // management network comes up before any node
        let mgmt_snapshot = self.mgmt.lock().expect("mgmt lock poisoned").clone();
        let mgmt = self.runtime.create_network(&mgmt_snapshot).await?;
        info!(
            network = %mgmt.network,
            bridge = mgmt.bridge.as_deref().unwrap_or("-"),
            "management network ready"
        );
        *self.mgmt.lock().expect("mgmt lock poisoned") = mgmt.clone();

        self.scaffold_lab_dir()?;

        // bind link descriptors now that the bridge name is known
        let links = {
            let handles = self.link_node_handles();
            let params = ResolveParams {
                nodes: &handles,
                mgmt_bridge: mgmt.bridge.as_deref().unwrap_or(""),
                wire: self.wire.clone(),
            };
            wirelab_links::resolve_links(&self.topo.topology.links, &params)?
        };
        *self.links.lock().expect("links lock poisoned") = links.clone();

        // fail fast on cycles, before any container exists
        self.build_dag()?;

        let link_workers = self
            .opts
            .max_workers
            .unwrap_or(links.len())
            .min(links.len().max(1));
        let link_task = tokio::spawn(Self::run_link_scheduler(
            links,
            link_workers,
            self.cancel.clone(),
        ));

        let post_tasks = TaskTracker::new();
        self.schedule_nodes(&mgmt, post_tasks.clone()).await;

        let (orphaned_links, failed_links) = link_task
            .await
            .map_err(|e| LabError::runtime(format!("link scheduler panicked: {}", e)))?;

        // wait for the per-node post-deploy tasks before finalising
        post_tasks.close();
        post_tasks.wait().await;

        if self.cancel.is_cancelled() {
            warn!(lab = %self.topo.name, "deploy cancelled, destroying partial lab");
            let _ = self.destroy().await;
            return Err(LabError::Cancelled);
        }

        self.finalise(&mgmt).await?;

        let report = self.build_report(failed_links, orphaned_links);
        info!(
            lab = %self.topo.name,
            failed = report.failed.len(),
            "deploy finished"
        );
        Ok(report)
    }

    /// Validates images and deferred external references before touching
    /// the host.
    async fn preflight(&self) -> Result<()> {
        let images: HashSet<String> = {
            let nodes = self.nodes.read().expect("node map lock poisoned");
            nodes
                .values()
                .filter(|n| n.kind.is_container())
                .filter_map(|n| n.config.image.clone())
                .collect()
        };
        for image in images {
            self.runtime
                .pull_image_if_required(&image)
                .await
                .map_err(LabError::from)?;
        }
        Ok(())
    }

    /// Registers nodes and derived dependencies, then validates
    /// acyclicity.
    fn build_dag(&self) -> Result<()> {
        for name in self.topo.topology.nodes.keys() {
            self.dm.add_node(name);
        }

        // user wait-for entries, optionally phase-qualified as
        // "node:phase"; the health barrier is skipped entirely with
        // skip-post-deploy, so dependers are downgraded to `created`
        for (name, config) in &self.topo.topology.nodes {
            for entry in &config.wait_for {
                let (dependee, phase) = parse_wait_for(entry)?;
                let phase = if self.opts.skip_post_deploy {
                    Phase::Created
                } else {
                    phase
                };
                self.dm.add_dependency(name, dependee, phase)?;
            }
        }

        // static management IPs are assigned before dynamic ones
        let static_nodes = self.topo.static_ip_nodes();
        for dynamic in self.topo.dynamic_ip_nodes() {
            for static_node in &static_nodes {
                self.dm
                    .add_dependency(dynamic, static_node, Phase::Created)?;
            }
        }

        // nodes sharing a managed container's namespace start after it
        for (name, config) in &self.topo.topology.nodes {
            if let Some(target) = config.network_mode.container_ref() {
                if self.topo.topology.nodes.contains_key(target) {
                    self.dm.add_dependency(name, target, Phase::Created)?;
                }
            }
        }

        self.dm.check_acyclic()
    }

    /// Launcher/worker scheduling for node creation.
    async fn schedule_nodes(&self, mgmt: &MgmtNet, post_tasks: TaskTracker) {
        let names: Vec<String> = self.topo.topology.nodes.keys().cloned().collect();
        if names.is_empty() {
            return;
        }

        let worker_count = self
            .opts
            .max_workers
            .unwrap_or(DEFAULT_NODE_WORKERS)
            .min(names.len())
            .max(1);
        debug!(workers = worker_count, nodes = names.len(), "starting node workers");

        let ctx = WorkerCtx {
            nodes: self.nodes.clone(),
            runtime: self.runtime.clone(),
            lab_dir: self.lab_dir.clone(),
            mgmt: Arc::new(mgmt.clone()),
            dm: self.dm.clone(),
            cancel: self.cancel.clone(),
            post_tasks,
            skip_post_deploy: self.opts.skip_post_deploy,
            deadline: self.started + self.opts.timeout,
        };

        let (tx, rx) = mpsc::channel::<String>(names.len());
        let rx = Arc::new(AsyncMutex::new(rx));

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let rx = rx.clone();
            let ctx = ctx.clone();
            workers.spawn(async move {
                loop {
                    let name = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(name) = name else {
                        debug!(worker = worker_id, "node worker terminating");
                        break;
                    };
                    debug!(worker = worker_id, node = %name, "node worker received node");
                    Self::create_node(&ctx, &name).await;
                }
            });
        }

        // one launcher per node gates submission on the DAG and on
        // external containers; submission order equals
        // dependency-satisfaction order and the workers never see the
        // graph
        let managed: Arc<HashSet<String>> =
            Arc::new(self.topo.topology.nodes.keys().cloned().collect());

        let mut launchers = JoinSet::new();
        for name in names {
            let ctx = ctx.clone();
            let tx = tx.clone();
            let external = self.opts.external.clone();
            let topo_mode = self
                .topo
                .topology
                .nodes
                .get(&name)
                .map(|n| n.network_mode.clone());
            let managed = managed.clone();
            launchers.spawn(async move {
                if let Err(err) = ctx.dm.wait(&name, &ctx.cancel).await {
                    Self::mark_failed(&ctx.nodes, &name, &err.to_string());
                    Self::signal_all_phases(&ctx.dm, &name);
                    return;
                }

                if let Some(NetworkMode::Container(target)) = topo_mode {
                    if !managed.contains(&target) {
                        if let Err(err) = external
                            .wait(&*ctx.runtime, &name, &target, &ctx.cancel)
                            .await
                        {
                            warn!(
                                node = %name,
                                container = %target,
                                error = %err,
                                "node left unscheduled, external dependency unavailable"
                            );
                            Self::mark_failed(&ctx.nodes, &name, &err.to_string());
                            Self::signal_all_phases(&ctx.dm, &name);
                            return;
                        }
                    }
                }

                let _ = tx.send(name).await;
            });
        }
        drop(tx);

        while launchers.join_next().await.is_some() {}
        while workers.join_next().await.is_some() {}
    }

    /// Worker body for one node: startup delay, pre-deploy, deploy,
    /// status flip under the write lock, then the `created` signal.
    async fn create_node(ctx: &WorkerCtx, name: &str) {
        let (config, kind) = {
            let nodes = ctx.nodes.read().expect("node map lock poisoned");
            let Some(node) = nodes.get(name) else {
                error!(node = %name, "node vanished from the map");
                return;
            };
            (node.config.clone(), node.kind.clone())
        };

        if let Some(delay) = config.startup_delay {
            info!(node = %name, delay, "delaying node startup");
            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    Self::mark_failed(&ctx.nodes, name, "cancelled");
                    // unblock dependers so the rest of the lab settles
                    Self::signal_all_phases(&ctx.dm, name);
                    return;
                }
                _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
            }
        }

        {
            let mut nodes = ctx.nodes.write().expect("node map lock poisoned");
            if let Some(node) = nodes.get_mut(name) {
                node.deploy_started_at = Some(Instant::now());
            }
        }

        let deploy_ctx = DeployContext {
            runtime: &*ctx.runtime,
            lab_dir: &ctx.lab_dir,
            mgmt: &ctx.mgmt,
        };

        if let Err(err) = kind.pre_deploy(&config, &deploy_ctx).await {
            error!(node = %name, error = %err, "pre-deploy failed");
            Self::mark_failed(&ctx.nodes, name, &err.to_string());
            Self::signal_all_phases(&ctx.dm, name);
            return;
        }
        {
            let mut nodes = ctx.nodes.write().expect("node map lock poisoned");
            if let Some(node) = nodes.get_mut(name) {
                node.state = NodeState::PreDeployed;
            }
        }

        match kind.deploy(&config, &deploy_ctx).await {
            Ok(deployed) => {
                let mut nodes = ctx.nodes.write().expect("node map lock poisoned");
                if let Some(node) = nodes.get_mut(name) {
                    node.config.container_id = deployed.container_id;
                    node.config.ns_path = deployed.ns_path;
                    node.state = NodeState::Created;
                    node.created_at = Some(Instant::now());
                }
                drop(nodes);
                ctx.dm.signal(name, Phase::Created);
                info!(node = %name, "node created");

                if ctx.skip_post_deploy {
                    debug!(node = %name, "post-deploy skipped");
                } else {
                    // post-deploy starts as soon as the node is up, so
                    // health-gated dependers can be scheduled while the
                    // rest of the lab is still being created
                    let ctx = ctx.clone();
                    let name = name.to_string();
                    ctx.post_tasks
                        .clone()
                        .spawn(async move { Self::post_deploy_node(&ctx, &name).await });
                }
            }
            Err(err) => {
                error!(node = %name, error = %err, "deploy failed");
                Self::mark_failed(&ctx.nodes, name, &err.to_string());
                Self::signal_all_phases(&ctx.dm, name);
            }
        }
    }

    /// Per-node post-deploy: kind hook, `configured` signal and, when a
    /// depender asked for it, health gating.
    async fn post_deploy_node(ctx: &WorkerCtx, name: &str) {
        let (config, kind) = {
            let nodes = ctx.nodes.read().expect("node map lock poisoned");
            let Some(node) = nodes.get(name) else {
                return;
            };
            (node.config.clone(), node.kind.clone())
        };

        let deploy_ctx = DeployContext {
            runtime: &*ctx.runtime,
            lab_dir: &ctx.lab_dir,
            mgmt: &ctx.mgmt,
        };
        if let Err(err) = kind.post_deploy(&config, &deploy_ctx).await {
            error!(node = %name, error = %err, "post-deploy task failed");
        }

        {
            let mut nodes = ctx.nodes.write().expect("node map lock poisoned");
            if let Some(node) = nodes.get_mut(name) {
                node.state = NodeState::Configured;
            }
        }
        ctx.dm.signal(name, Phase::Configured);

        if ctx.dm.is_health_required(name) {
            // some node waits for this one to turn healthy
            loop {
                if ctx.cancel.is_cancelled() || Instant::now() >= ctx.deadline {
                    warn!(node = %name, "gave up waiting for healthy state");
                    break;
                }
                match ctx.runtime.get_health(&config.long_name).await {
                    Ok(true) => {
                        info!(node = %name, "node turned healthy");
                        let mut nodes = ctx.nodes.write().expect("node map lock poisoned");
                        if let Some(node) = nodes.get_mut(name) {
                            node.state = NodeState::Healthy;
                        }
                        break;
                    }
                    Ok(false) => tokio::time::sleep(Duration::from_secs(1)).await,
                    Err(err) => {
                        error!(
                            node = %name,
                            error = %err,
                            "health check failed, continuing deployment anyway"
                        );
                        break;
                    }
                }
            }
        }
        ctx.dm.signal(name, Phase::Healthy);
    }

    fn mark_failed(nodes: &NodeMap, name: &str, reason: &str) {
        let mut nodes = nodes.write().expect("node map lock poisoned");
        if let Some(node) = nodes.get_mut(name) {
            node.state = NodeState::Failed;
            if node.error.is_none() {
                node.error = Some(reason.to_string());
            }
        }
    }

    /// Unblocks every depender of a failed node; dependers proceed and
    /// report their own outcome.
    fn signal_all_phases(dm: &DependencyManager, name: &str) {
        for phase in Phase::ALL {
            dm.signal(name, phase);
        }
    }

    /// Link worker pool: sweeps the pending set, dispatching each link
    /// once both endpoint nodes are `created`; terminates when the set
    /// is empty or every remaining link is orphaned by a failed node.
    async fn run_link_scheduler(
        links: Vec<Arc<dyn Link>>,
        workers: usize,
        cancel: CancellationToken,
    ) -> (Vec<String>, Vec<String>) {
        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let mut pending = links;
        let mut tasks: JoinSet<(String, Result<()>)> = JoinSet::new();
        let mut orphaned = Vec::new();

        while !pending.is_empty() && !cancel.is_cancelled() {
            pending.retain(|link| {
                if link.orphaned() {
                    warn!(link = %link, "link orphaned by a failed endpoint node");
                    orphaned.push(link.to_string());
                    return false;
                }
                if link.ready() {
                    let link = link.clone();
                    let semaphore = semaphore.clone();
                    tasks.spawn(async move {
                        let _permit = semaphore.acquire().await;
                        (link.to_string(), link.deploy().await)
                    });
                    return false;
                }
                true
            });
            if pending.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let mut failed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(()))) => debug!(link = %name, "link done"),
                Ok((name, Err(err))) => {
                    error!(link = %name, error = %err, "link deploy failed");
                    failed.push(name);
                }
                Err(err) => error!(error = %err, "link task panicked"),
            }
        }
        (orphaned, failed)
    }

    /// Captures dynamically assigned addresses, writes the export files,
    /// updates the hosts file and runs exec-on-deploy commands.
    async fn finalise(&self, _mgmt: &MgmtNet) -> Result<()> {
        debug!("containers created, retrieving state and addresses");
        let records = self
            .runtime
            .list_containers(&[ListFilter::label(
                wirelab_core::labels::LAB_LABEL,
                &self.topo.name,
            )])
            .await
            .map_err(LabError::from)?;

        {
            let mut nodes = self.nodes.write().expect("node map lock poisoned");
            for record in &records {
                let Some(node) = record.node_name().and_then(|n| nodes.get_mut(n)) else {
                    continue;
                };
                // host-networked nodes have no address of their own
                if node.config.network_mode == NetworkMode::Host {
                    continue;
                }
                if node.config.container_id.is_none() {
                    node.config.container_id = Some(record.id.clone());
                }
                if let Some(ipv4) = &record.network_settings.ipv4_addr {
                    node.config.mgmt_ipv4_address = Some(ipv4.clone());
                }
                if let Some(ipv6) = &record.network_settings.ipv6_addr {
                    node.config.mgmt_ipv6_address = Some(ipv6.clone());
                }
            }
        }

        self.write_exports()?;

        let entries: Vec<(String, String)> = {
            let nodes = self.nodes.read().expect("node map lock poisoned");
            nodes
                .values()
                .flat_map(|n| {
                    n.config
                        .mgmt_ipv4_address
                        .iter()
                        .chain(n.config.mgmt_ipv6_address.iter())
                        .map(|ip| (n.config.long_name.clone(), ip.clone()))
                        .collect::<Vec<_>>()
                })
                .collect()
        };
        if let Err(err) = hostsfile::append_entries(&self.opts.hosts_file, &self.topo.name, &entries)
        {
            warn!(error = %err, "failed to update hosts file");
        }

        self.run_exec_on_deploy().await;
        Ok(())
    }

    /// Runs the per-node `exec` commands configured in the topology.
    async fn run_exec_on_deploy(&self) {
        let execs: Vec<(String, Option<String>, Vec<String>)> = {
            let nodes = self.nodes.read().expect("node map lock poisoned");
            nodes
                .values()
                .filter(|n| !n.config.exec.is_empty() && n.state.is_created())
                .map(|n| {
                    (
                        n.config.short_name.clone(),
                        n.config.container_id.clone(),
                        n.config.exec.clone(),
                    )
                })
                .collect()
        };

        for (name, container_id, cmds) in execs {
            let Some(container_id) = container_id else {
                continue;
            };
            for cmd in cmds {
                let argv: Vec<String> = cmd.split_whitespace().map(str::to_string).collect();
                match self.runtime.exec(&container_id, &argv).await {
                    Ok(output) => info!(
                        node = %name,
                        cmd = %cmd,
                        stdout = %output.stdout.trim_end(),
                        "exec-on-deploy"
                    ),
                    Err(err) => error!(node = %name, cmd = %cmd, error = %err, "exec-on-deploy failed"),
                }
            }
        }
    }

    /// Executes a command in a node's container.
    pub async fn exec(&self, node: &str, cmd: &[String]) -> Result<ExecOutput> {
        let container_id = {
            let nodes = self.nodes.read().expect("node map lock poisoned");
            nodes.get(node).and_then(|n| n.config.container_id.clone())
        };
        let target = match container_id {
            Some(id) => id,
            None => self.topo.long_name(node),
        };
        Ok(self.runtime.exec(&target, cmd).await?)
    }

    /// Lists the lab's containers.
    pub async fn inspect(&self) -> Result<Vec<wirelab_runtime::ContainerRecord>> {
        Ok(self
            .runtime
            .list_containers(&[ListFilter::label(
                wirelab_core::labels::LAB_LABEL,
                &self.topo.name,
            )])
            .await?)
    }

    pub(crate) fn link_node_handles(&self) -> HashMap<String, LinkNodeRef> {
        self.topo
            .topology
            .nodes
            .keys()
            .map(|name| {
                (
                    name.clone(),
                    Arc::new(NodeHandle::new(name.clone(), self.nodes.clone())) as LinkNodeRef,
                )
            })
            .collect()
    }

    fn scaffold_lab_dir(&self) -> Result<()> {
        let root = self.lab_dir.root();
        info!(dir = %root.display(), "creating lab directory");
        std::fs::create_dir_all(root)?;

        // created empty up front so bind mounts of these files resolve
        for file in [
            self.lab_dir.ansible_inventory(),
            self.lab_dir.topology_data(),
        ] {
            if !file.exists() {
                std::fs::write(&file, "")?;
            }
        }

        let keys = collect_ssh_pubkeys();
        if let Err(err) = std::fs::write(self.lab_dir.authorized_keys(), keys.join("\n")) {
            warn!(error = %err, "failed to write authorized_keys");
        }
        Ok(())
    }

    /// Writes `topology-data.json` and the ansible inventory.
    fn write_exports(&self) -> Result<()> {
        let report = self.build_report(Vec::new(), Vec::new());
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| LabError::config(format!("failed to serialise topology data: {}", e)))?;
        std::fs::write(self.lab_dir.topology_data(), json)?;

        let inventory = self.build_inventory();
        let yaml = serde_yaml::to_string(&inventory)
            .map_err(|e| LabError::config(format!("failed to serialise inventory: {}", e)))?;
        std::fs::write(self.lab_dir.ansible_inventory(), yaml)?;
        Ok(())
    }

    /// Kind-grouped ansible inventory of the lab.
    fn build_inventory(&self) -> serde_json::Value {
        let nodes = self.nodes.read().expect("node map lock poisoned");
        let mut children = serde_json::Map::new();
        for node in nodes.values() {
            let hosts = children
                .entry(node.config.kind.clone())
                .or_insert_with(|| serde_json::json!({ "hosts": {} }));
            if let Some(hosts) = hosts
                .get_mut("hosts")
                .and_then(|h| h.as_object_mut())
            {
                let mut vars = serde_json::Map::new();
                if let Some(ip) = &node.config.mgmt_ipv4_address {
                    vars.insert("ansible_host".to_string(), serde_json::json!(ip));
                }
                hosts.insert(node.config.long_name.clone(), serde_json::Value::Object(vars));
            }
        }
        serde_json::json!({ "all": { "children": children } })
    }

    fn build_report(&self, failed_links: Vec<String>, orphaned_links: Vec<String>) -> DeployReport {
        let nodes = self.nodes.read().expect("node map lock poisoned");
        let mut rows: Vec<NodeReport> = nodes
            .values()
            .map(|node| NodeReport {
                name: node.config.short_name.clone(),
                long_name: node.config.long_name.clone(),
                kind: node.config.kind.clone(),
                image: node.config.image.clone(),
                state: node.state,
                ipv4: node.config.mgmt_ipv4_address.clone(),
                ipv6: node.config.mgmt_ipv6_address.clone(),
                container_id: node.config.container_id.as_deref().map(short_id),
                error: node.error.clone(),
                deploy_started_ms: node
                    .deploy_started_at
                    .map(|t| t.duration_since(self.started).as_millis() as u64),
                created_ms: node
                    .created_at
                    .map(|t| t.duration_since(self.started).as_millis() as u64),
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));

        let mut failed: Vec<String> = rows
            .iter()
            .filter(|r| r.state == NodeState::Failed)
            .map(|r| r.name.clone())
            .collect();
        failed.extend(failed_links);

        DeployReport {
            lab: self.topo.name.clone(),
            nodes: rows,
            failed,
            orphaned_links,
        }
    }
}

/// Splits a `wait-for` entry into node name and phase; the phase
/// defaults to `created`.
fn parse_wait_for(entry: &str) -> Result<(&str, Phase)> {
    match entry.split_once(':') {
        None => Ok((entry, Phase::Created)),
        Some((node, "created")) => Ok((node, Phase::Created)),
        Some((node, "configured")) => Ok((node, Phase::Configured)),
        Some((node, "healthy")) => Ok((node, Phase::Healthy)),
        Some((_, phase)) => Err(LabError::config(format!(
            "unknown wait-for phase {:?} in {:?}",
            phase, entry
        ))),
    }
}

/// Hosts entries handed to every container for nodes with static
/// management addresses.
fn collect_extra_hosts(topo: &Topology) -> Result<Vec<String>> {
    let mut entries = Vec::new();
    for (name, node) in &topo.topology.nodes {
        if let Some(ipv4) = node.static_ipv4()? {
            debug!(node = %name, ip = %ipv4, "static ipv4 hosts entry");
            entries.push(format!("{}:{}", name, ipv4));
        }
        if let Some(ipv6) = node.static_ipv6()? {
            debug!(node = %name, ip = %ipv6, "static ipv6 hosts entry");
            entries.push(format!("{}:{}", name, ipv6));
        }
    }
    entries.sort();
    Ok(entries)
}

/// Public keys offered to node configurations: the running agent's keys
/// plus any `~/.ssh/*.pub` files.
fn collect_ssh_pubkeys() -> Vec<String> {
    let mut keys = Vec::new();

    if std::env::var("SSH_AUTH_SOCK").is_ok() {
        if let Ok(output) = std::process::Command::new("ssh-add").arg("-L").output() {
            if output.status.success() {
                keys.extend(
                    String::from_utf8_lossy(&output.stdout)
                        .lines()
                        .map(str::to_string),
                );
            }
        }
    }

    if let Some(home) = std::env::var_os("HOME") {
        let ssh_dir = PathBuf::from(home).join(".ssh");
        if let Ok(dir) = std::fs::read_dir(ssh_dir) {
            for entry in dir.flatten() {
                if entry.path().extension().is_some_and(|e| e == "pub") {
                    if let Ok(content) = std::fs::read_to_string(entry.path()) {
                        keys.extend(content.lines().map(str::to_string));
                    }
                }
            }
        }
    }

    keys.sort();
    keys.dedup();
    keys
}

fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wait_for() {
        assert_eq!(parse_wait_for("a").unwrap(), ("a", Phase::Created));
        assert_eq!(parse_wait_for("a:healthy").unwrap(), ("a", Phase::Healthy));
        assert_eq!(
            parse_wait_for("a:configured").unwrap(),
            ("a", Phase::Configured)
        );
        assert!(parse_wait_for("a:sideways").is_err());
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }
}
