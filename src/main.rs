use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use mcplane::config::Config;
use mcplane::driver::CallMethod;
use mcplane::resource::custom_image::CustomImageReq;
use mcplane::resource::mcis::McisRegisterReq;
use mcplane::resource::security_group::SecurityGroupReq;
use mcplane::resource::ssh_key::SshKeyReq;
use mcplane::resource::vnet::VNetReq;
use mcplane::resource::{Provision, ProvisionMode, ResourceKind};
use mcplane::tracker::Tracked;
use mcplane::ControlPlane;

/// Multi-cloud infrastructure control plane
#[derive(Parser, Debug)]
#[command(name = "mcplane", version = mcplane::VERSION, about, long_about = None)]
struct Args {
    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Driver transport (REST or RPC)
    #[arg(long, global = true)]
    call_method: Option<CallMethod>,

    /// Driver REST base URL
    #[arg(long, global = true)]
    driver_url: Option<String>,

    /// RPC transport config file (YAML)
    #[arg(long, global = true)]
    rpc_config: Option<PathBuf>,

    /// Key store file
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or register a vNet
    Vnet(ProvisionArgs),
    /// Create or register a security group
    SecurityGroup(ProvisionArgs),
    /// Create or register an SSH key pair
    SshKey(ProvisionArgs),
    /// Create or register a custom image
    CustomImage(ProvisionArgs),
    /// Adopt existing VMs as an MCIS
    McisRegister {
        #[arg(long, default_value = "ns01")]
        ns: String,
        /// JSON request file
        #[arg(long)]
        file: PathBuf,
    },
    /// Snapshot an MCIS member VM into a custom image
    Snapshot {
        #[arg(long, default_value = "ns01")]
        ns: String,
        #[arg(long)]
        mcis: String,
        #[arg(long)]
        vm: String,
        /// Image name (generated when omitted)
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Suspend, resume, reboot, terminate or refine
    Control {
        #[arg(long, default_value = "ns01")]
        ns: String,
        #[arg(long)]
        mcis: String,
        /// Target one VM instead of the whole MCIS
        #[arg(long)]
        vm: Option<String>,
        #[arg(long)]
        action: String,
        /// Skip the status precondition check
        #[arg(long)]
        force: bool,
    },
    /// Show one stored resource, MCIS or VM
    Get {
        #[arg(long, default_value = "ns01")]
        ns: String,
        #[command(subcommand)]
        target: GetTarget,
    },
    /// List stored resources of one kind
    List {
        #[arg(long, default_value = "ns01")]
        ns: String,
        /// vNet, securityGroup, sshKey or customImage
        kind: String,
    },
}

#[derive(Subcommand, Debug)]
enum GetTarget {
    Resource { kind: String, id: String },
    Mcis { id: String },
    Vm { mcis: String, id: String },
}

#[derive(ClapArgs, Debug)]
struct ProvisionArgs {
    #[arg(value_enum)]
    mode: ModeArg,
    #[arg(long, default_value = "ns01")]
    ns: String,
    /// JSON request file
    #[arg(long)]
    file: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Create,
    Register,
}

impl From<ModeArg> for ProvisionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Create => ProvisionMode::Create,
            ModeArg::Register => ProvisionMode::Register,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("logging disabled: cannot open {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("mcplane {} started with log level: {:?}", mcplane::VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("mcplane").join("mcplane.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".mcplane").join("mcplane.log");
    }
    PathBuf::from("mcplane.log")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let mut config = Config::load();
    if let Some(method) = args.call_method {
        config.call_method = method;
    }
    if let Some(url) = args.driver_url {
        config.driver_rest_url = url;
    }
    if let Some(path) = args.rpc_config {
        config.rpc_config_path = path;
    }
    if let Some(path) = args.store {
        config.store_path = path;
    }

    let plane = ControlPlane::from_config(&config).context("Failed to initialize control plane")?;

    match args.command {
        Command::Vnet(a) => provision_from_file::<VNetReq>(&plane, a).await,
        Command::SecurityGroup(a) => provision_from_file::<SecurityGroupReq>(&plane, a).await,
        Command::SshKey(a) => provision_from_file::<SshKeyReq>(&plane, a).await,
        Command::CustomImage(a) => provision_from_file::<CustomImageReq>(&plane, a).await,
        Command::McisRegister { ns, file } => {
            let req: McisRegisterReq = read_request(&file)?;
            print_tracked(plane.register_mcis(&ns, req).await)
        }
        Command::Snapshot {
            ns,
            mcis,
            vm,
            name,
            description,
        } => print_tracked(plane.snapshot(&ns, &mcis, &vm, &name, &description).await),
        Command::Control {
            ns,
            mcis,
            vm,
            action,
            force,
        } => print_tracked(plane.control(&ns, &mcis, vm.as_deref(), &action, force).await),
        Command::Get { ns, target } => match target {
            GetTarget::Resource { kind, id } => {
                let kind: ResourceKind = kind.parse()?;
                print_json(&plane.get_resource(&ns, kind, &id)?)
            }
            GetTarget::Mcis { id } => print_json(&plane.get_mcis(&ns, &id)?),
            GetTarget::Vm { mcis, id } => print_json(&plane.get_vm(&ns, &mcis, &id)?),
        },
        Command::List { ns, kind } => {
            let kind: ResourceKind = kind.parse()?;
            print_json(&plane.list_resources(&ns, kind)?)
        }
    }
}

async fn provision_from_file<R>(plane: &ControlPlane, args: ProvisionArgs) -> Result<()>
where
    R: Provision + DeserializeOwned,
{
    let req: R = read_request(&args.file)?;
    print_tracked(plane.provision(&args.ns, req, args.mode.into()).await)
}

fn read_request<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid request in {:?}", path))
}

fn print_tracked<T: Serialize>(tracked: Tracked<T>) -> Result<()> {
    let request_id = tracked.request_id.clone();
    let result = tracked
        .into_result()
        .with_context(|| format!("request {} failed", request_id))?;
    print_json(&json!({ "requestId": request_id, "result": result }))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
