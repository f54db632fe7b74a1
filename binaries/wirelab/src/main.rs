//! wirelab CLI.
//!
//! Thin shim over the deployment engine: parses the topology file,
//! selects a runtime and dispatches to deploy/destroy/inspect/exec plus
//! the veth and netem tools.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;
use wirelab_core::error::{LabError, Result};
use wirelab_core::Topology;
use wirelab_engine::{DeployOptions, DeployReport, Engine};
use wirelab_links::Link as _;
use wirelab_netlink::netem::NetemParams;

/// Environment variable suppressing the upstream version probe.
const VERSION_CHECK_ENV: &str = "CLAB_VERSION_CHECK";

#[derive(Parser, Debug)]
#[command(name = "wirelab", about = "container-based network laboratories", version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'd', long, global = true, default_value = "info")]
    log_level: String,

    /// Container runtime (docker, podman); CLAB_RUNTIME applies when
    /// unset.
    #[arg(short, long, global = true, default_value = "")]
    runtime: String,

    /// Wall-clock budget for the operation.
    #[arg(long, global = true, default_value = "600", value_name = "SECONDS")]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deploy a lab from a topology file.
    Deploy(DeployArgs),
    /// Destroy a deployed lab.
    Destroy(DestroyArgs),
    /// Show the lab's containers.
    Inspect(InspectArgs),
    /// Execute a command in a lab node.
    Exec(ExecArgs),
    /// Wiring and impairment helpers.
    #[command(subcommand)]
    Tools(ToolsCommand),
}

#[derive(Args, Debug)]
struct DeployArgs {
    /// Topology file.
    #[arg(short, long, value_name = "FILE")]
    topo: PathBuf,

    /// Limit the node and link worker pools.
    #[arg(long)]
    max_workers: Option<usize>,

    /// Destroy the lab and regenerate artefacts before deploying.
    #[arg(short = 'c', long)]
    reconfigure: bool,

    /// Skip the post-deploy pass.
    #[arg(long)]
    skip_post_deploy: bool,

    /// Management network name override.
    #[arg(long)]
    network: Option<String>,

    /// Management IPv4 subnet override.
    #[arg(short = '4', long, value_name = "CIDR")]
    ipv4_subnet: Option<String>,

    /// Management IPv6 subnet override.
    #[arg(short = '6', long, value_name = "CIDR")]
    ipv6_subnet: Option<String>,

    /// Output format (table, json).
    #[arg(short, long, default_value = "table")]
    format: String,
}

#[derive(Args, Debug)]
struct DestroyArgs {
    /// Topology file.
    #[arg(short, long, value_name = "FILE")]
    topo: PathBuf,

    /// Keep the management network.
    #[arg(long)]
    keep_mgmt_net: bool,

    /// Stop containers gracefully before removal instead of killing
    /// them.
    #[arg(long)]
    graceful: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Topology file.
    #[arg(short, long, value_name = "FILE")]
    topo: PathBuf,

    /// Output format (table, json).
    #[arg(short, long, default_value = "table")]
    format: String,
}

#[derive(Args, Debug)]
struct ExecArgs {
    /// Topology file.
    #[arg(short, long, value_name = "FILE")]
    topo: PathBuf,

    /// Node short-name.
    #[arg(short, long)]
    node: String,

    /// Command and arguments.
    #[arg(trailing_var_arg = true, required = true)]
    cmd: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum ToolsCommand {
    /// Veth helpers.
    #[command(subcommand)]
    Veth(VethCommand),
    /// Netem impairment helpers.
    #[command(subcommand)]
    Netem(NetemCommand),
}

#[derive(Subcommand, Debug)]
enum VethCommand {
    /// Create a veth pair between two namespaces.
    Create(VethCreateArgs),
}

#[derive(Args, Debug)]
struct VethCreateArgs {
    /// First endpoint as `<container|host>:<interface>`.
    #[arg(short = 'a', long, value_name = "ENDPOINT")]
    a_endpoint: String,

    /// Second endpoint as `<container|host>:<interface>`.
    #[arg(short = 'b', long, value_name = "ENDPOINT")]
    b_endpoint: String,

    /// Wire MTU.
    #[arg(short, long, default_value_t = wirelab_core::topology::DEFAULT_LINK_MTU)]
    mtu: u32,
}

#[derive(Subcommand, Debug)]
enum NetemCommand {
    /// Apply delay/jitter/loss/rate to a node interface.
    Set(NetemSetArgs),
    /// Show the qdisc configuration of a node interface.
    Show(NetemShowArgs),
}

#[derive(Args, Debug)]
struct NetemSetArgs {
    /// Container long name (resolved under /run/netns), or `host`.
    #[arg(short, long)]
    node: String,

    /// Interface inside the node.
    #[arg(short, long)]
    interface: String,

    /// Added delay in milliseconds.
    #[arg(long)]
    delay: Option<u64>,

    /// Delay jitter in milliseconds; requires --delay.
    #[arg(long)]
    jitter: Option<u64>,

    /// Packet loss percentage.
    #[arg(long)]
    loss: Option<f64>,

    /// Rate limit in kbit/s.
    #[arg(long)]
    rate: Option<u64>,
}

#[derive(Args, Debug)]
struct NetemShowArgs {
    /// Container long name (resolved under /run/netns), or `host`.
    #[arg(short, long)]
    node: String,

    /// Interface inside the node.
    #[arg(short, long)]
    interface: String,
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    version_check_notice();

    let runtime = tokio::runtime::Runtime::new().expect("failed to start async runtime");
    let code = match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(err) => {
            error!("{}", err);
            err.exit_code()
        }
    };
    std::process::exit(code);
}

fn version_check_notice() {
    let status = std::env::var(VERSION_CHECK_ENV).unwrap_or_default();
    if status.to_lowercase().contains("disable") {
        debug!("version check disabled via {}", VERSION_CHECK_ENV);
    } else {
        debug!("upstream version probe not performed in this build");
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let timeout = Duration::from_secs(cli.timeout);

    match cli.command {
        Command::Deploy(args) => deploy(&cli.runtime, timeout, args).await,
        Command::Destroy(args) => destroy(&cli.runtime, timeout, args).await,
        Command::Inspect(args) => inspect(&cli.runtime, timeout, args).await,
        Command::Exec(args) => exec(&cli.runtime, timeout, args).await,
        Command::Tools(tools) => run_tools(tools).await,
    }
}

fn load_topology(path: &PathBuf) -> Result<Topology> {
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content)
        .map_err(|e| LabError::config(format!("invalid topology {}: {}", path.display(), e)))
}

async fn connect_runtime(
    name: &str,
    timeout: Duration,
    mgmt_network: &str,
) -> Result<Arc<dyn wirelab_runtime::ContainerRuntime>> {
    let config = wirelab_runtime::RuntimeConfig {
        timeout,
        mgmt_network: mgmt_network.to_string(),
    };
    Ok(wirelab_runtime::connect(name, config).await?)
}

async fn deploy(runtime: &str, timeout: Duration, args: DeployArgs) -> Result<i32> {
    let mut topo = load_topology(&args.topo)?;
    if let Some(network) = args.network {
        topo.mgmt.network = network;
    }
    if let Some(subnet) = args.ipv4_subnet {
        topo.mgmt.ipv4_subnet = Some(subnet);
    }
    if let Some(subnet) = args.ipv6_subnet {
        topo.mgmt.ipv6_subnet = Some(subnet);
    }

    let runtime = connect_runtime(runtime, timeout, &topo.mgmt.network).await?;
    let opts = DeployOptions {
        max_workers: args.max_workers,
        timeout,
        skip_post_deploy: args.skip_post_deploy,
        reconfigure: args.reconfigure,
        ..Default::default()
    };
    let engine = Arc::new(Engine::new(topo, runtime, opts)?);

    // ctrl-c cancels in-flight work and destroys what was created
    let cancel = engine.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling deployment");
            cancel.cancel();
        }
    });

    let report = engine.deploy().await?;
    print_report(&report, &args.format)?;
    Ok(if report.has_failures() { 1 } else { 0 })
}

async fn destroy(runtime: &str, timeout: Duration, args: DestroyArgs) -> Result<i32> {
    let topo = load_topology(&args.topo)?;
    let runtime = connect_runtime(runtime, timeout, &topo.mgmt.network).await?;
    let opts = DeployOptions {
        timeout,
        keep_mgmt_net: args.keep_mgmt_net,
        graceful: args.graceful,
        ..Default::default()
    };
    let engine = Engine::new(topo, runtime, opts)?;
    engine.destroy().await?;
    Ok(0)
}

async fn inspect(runtime: &str, timeout: Duration, args: InspectArgs) -> Result<i32> {
    let topo = load_topology(&args.topo)?;
    let runtime = connect_runtime(runtime, timeout, &topo.mgmt.network).await?;
    let engine = Engine::new(topo, runtime, DeployOptions::default())?;
    let records = engine.inspect().await?;

    if args.format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(&records)
                .map_err(|e| LabError::config(e.to_string()))?
        );
        return Ok(0);
    }

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Image")]
        image: String,
        #[tabled(rename = "State")]
        state: String,
        #[tabled(rename = "IPv4")]
        ipv4: String,
    }

    let rows: Vec<Row> = records
        .iter()
        .map(|r| Row {
            name: r.names.first().cloned().unwrap_or_default(),
            image: r.image.clone(),
            state: r.state.clone(),
            ipv4: r
                .network_settings
                .ipv4_addr
                .clone()
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
    Ok(0)
}

async fn exec(runtime: &str, timeout: Duration, args: ExecArgs) -> Result<i32> {
    let topo = load_topology(&args.topo)?;
    let runtime = connect_runtime(runtime, timeout, &topo.mgmt.network).await?;
    let engine = Engine::new(topo, runtime, DeployOptions::default())?;

    let output = engine.exec(&args.node, &args.cmd).await?;
    if !output.stdout.is_empty() {
        print!("{}", output.stdout);
    }
    if !output.stderr.is_empty() {
        eprint!("{}", output.stderr);
    }
    Ok(if output.success() { 0 } else { 1 })
}

async fn run_tools(tools: ToolsCommand) -> Result<i32> {
    match tools {
        ToolsCommand::Veth(VethCommand::Create(args)) => veth_create(args).await,
        ToolsCommand::Netem(NetemCommand::Set(args)) => {
            let params = NetemParams {
                delay: args.delay.map(Duration::from_millis),
                jitter: args.jitter.map(Duration::from_millis),
                loss: args.loss,
                rate_kbit: args.rate,
            };
            wirelab_netlink::netem::set_impairments(
                ns_path_for(&args.node).as_deref(),
                &args.interface,
                &params,
            )?;
            println!("netem parameters applied to {}:{}", args.node, args.interface);
            Ok(0)
        }
        ToolsCommand::Netem(NetemCommand::Show(args)) => {
            let output = wirelab_netlink::netem::show(
                ns_path_for(&args.node).as_deref(),
                &args.interface,
            )?;
            print!("{}", output);
            Ok(0)
        }
    }
}

/// Resolves a node argument to a namespace path; `host` means the host
/// namespace.
fn ns_path_for(node: &str) -> Option<String> {
    if node == "host" {
        None
    } else {
        Some(
            wirelab_netlink::netns::named_netns_path(node)
                .to_string_lossy()
                .into_owned(),
        )
    }
}

/// Ad-hoc link node for the veth tool: a named namespace or the host.
struct ToolNode {
    name: String,
}

impl wirelab_links::LinkNode for ToolNode {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn ns_path(&self) -> Option<String> {
        ns_path_for(&self.name)
    }

    fn endpoint_kind(&self) -> wirelab_links::EndpointKind {
        if self.name == "host" {
            wirelab_links::EndpointKind::Host
        } else {
            wirelab_links::EndpointKind::Container
        }
    }

    fn is_created(&self) -> bool {
        true
    }
}

async fn veth_create(args: VethCreateArgs) -> Result<i32> {
    let parse = |s: &str| -> Result<wirelab_links::Endpoint> {
        let ep = wirelab_core::ParsedEndpoint::parse(s)?;
        Ok(wirelab_links::Endpoint::new(
            Arc::new(ToolNode { name: ep.node }),
            ep.iface,
            None,
        ))
    };

    let link = wirelab_links::LinkVeth::new(
        wirelab_links::LinkKind::Veth,
        parse(&args.a_endpoint)?,
        parse(&args.b_endpoint)?,
        args.mtu,
        Arc::new(wirelab_links::KernelWire),
    );
    link.deploy().await?;
    println!("veth pair {} <-> {} created", args.a_endpoint, args.b_endpoint);
    Ok(0)
}

fn print_report(report: &DeployReport, format: &str) -> Result<()> {
    if format == "json" {
        println!(
            "{}",
            serde_json::to_string_pretty(report).map_err(|e| LabError::config(e.to_string()))?
        );
        return Ok(());
    }

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Kind")]
        kind: String,
        #[tabled(rename = "Image")]
        image: String,
        #[tabled(rename = "State")]
        state: String,
        #[tabled(rename = "IPv4")]
        ipv4: String,
        #[tabled(rename = "Error")]
        error: String,
    }

    let rows: Vec<Row> = report
        .nodes
        .iter()
        .map(|n| Row {
            name: n.long_name.clone(),
            kind: n.kind.clone(),
            image: n.image.clone().unwrap_or_default(),
            state: n.state.to_string(),
            ipv4: n.ipv4.clone().unwrap_or_else(|| "-".to_string()),
            error: n.error.clone().unwrap_or_default(),
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));

    if !report.orphaned_links.is_empty() {
        warn!(links = ?report.orphaned_links, "links orphaned by failed nodes");
    }
    Ok(())
}
