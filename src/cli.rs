use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use guestconf::GuestKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pvekit")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Read and update Proxmox VE guest configuration", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file [default: ~/.config/pvekit/config.toml]
    #[arg(long, global = true, env = "PVEKIT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show a guest's decoded configuration
    Show(ShowArgs),

    /// Set or delete raw configuration keys
    Set(SetArgs),

    /// Replace a guest's tags
    Tags(TagsArgs),

    /// Set or clear a guest's description
    Description(DescriptionArgs),

    /// Configure a network interface (and its ipconfig)
    Net(NetArgs),

    /// Add a SCSI disk to an empty slot
    Disk(DiskArgs),

    /// Insert or eject a CD-ROM image
    Cdrom(CdromArgs),

    /// Apply a batch of updates from a TOML file
    Apply(ApplyArgs),

    /// Decode a raw JSON config offline
    Decode(DecodeArgs),

    /// Print the field grammar tables
    Grammar,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print the resolved config file path
    ConfigPath,

    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ============================================================================
// Shared arguments
// ============================================================================

#[derive(Args, Clone)]
pub struct GuestArgs {
    /// Guest id
    pub vmid: u32,

    /// Node hosting the guest [default: from config, or located via the cluster]
    #[arg(long)]
    pub node: Option<String>,

    /// Guest type
    #[arg(long, value_enum)]
    pub kind: Option<KindArg>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
    Qemu,
    Lxc,
}

impl From<KindArg> for GuestKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Qemu => Self::Qemu,
            KindArg::Lxc => Self::Lxc,
        }
    }
}

#[derive(Args, Clone, Copy)]
pub struct WriteArgs {
    /// Show what would change without writing
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Conflict retries [default: from config]
    #[arg(long)]
    pub retries: Option<u32>,
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Parser)]
pub struct ShowArgs {
    #[command(flatten)]
    pub guest: GuestArgs,

    /// Only show these keys
    #[arg(short, long = "key")]
    pub keys: Vec<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Print the raw values as returned by the platform
    #[arg(long, conflicts_with = "json")]
    pub raw: bool,
}

#[derive(Parser)]
pub struct SetArgs {
    #[command(flatten)]
    pub guest: GuestArgs,

    /// KEY=VALUE in wire form (e.g. net1=virtio,bridge=vmbr1); a bare KEY sets a flag
    #[arg(value_name = "KEY=VALUE")]
    pub assignments: Vec<String>,

    /// Keys to delete
    #[arg(short, long)]
    pub delete: Vec<String>,

    /// Only write if the config still has this digest
    #[arg(long)]
    pub digest: Option<String>,

    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(Parser)]
pub struct TagsArgs {
    #[command(flatten)]
    pub guest: GuestArgs,

    /// New tags (replace the current set)
    #[arg(required_unless_present = "clear")]
    pub tags: Vec<String>,

    /// Remove all tags
    #[arg(long, conflicts_with = "tags")]
    pub clear: bool,

    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(Parser)]
#[command(group(ArgGroup::new("content").required(true)))]
pub struct DescriptionArgs {
    #[command(flatten)]
    pub guest: GuestArgs,

    /// Description text
    #[arg(long, group = "content")]
    pub text: Option<String>,

    /// Read the description from a file
    #[arg(long, group = "content")]
    pub file: Option<PathBuf>,

    /// Remove the description
    #[arg(long, group = "content")]
    pub clear: bool,

    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(Parser)]
pub struct NetArgs {
    #[command(flatten)]
    pub guest: GuestArgs,

    /// Interface index (net<N>)
    pub index: u32,

    /// NIC model
    #[arg(long, default_value = "virtio")]
    pub model: String,

    /// Bridge to attach to
    #[arg(long, default_value = "vmbr0")]
    pub bridge: String,

    /// VLAN tag
    #[arg(long)]
    pub tag: Option<u16>,

    /// Trunk VLANs, separated by `;` or `,`
    #[arg(long)]
    pub trunks: Option<String>,

    /// Enable the firewall on this interface
    #[arg(long)]
    pub firewall: Option<bool>,

    /// IPv4 address in CIDR form, or dhcp
    #[arg(long)]
    pub ip: Option<String>,

    /// IPv4 gateway
    #[arg(long)]
    pub gw: Option<String>,

    /// IPv6 address in CIDR form, dhcp or auto
    #[arg(long)]
    pub ip6: Option<String>,

    /// IPv6 gateway
    #[arg(long)]
    pub gw6: Option<String>,

    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(Parser)]
pub struct DiskArgs {
    #[command(flatten)]
    pub guest: GuestArgs,

    /// SCSI slot index (scsi<N>)
    pub index: u32,

    /// Storage to allocate on
    #[arg(long)]
    pub storage: String,

    /// Size in GiB
    #[arg(long, default_value = "32")]
    pub size: u32,

    /// Cache mode
    #[arg(long)]
    pub cache: Option<String>,

    /// Do not enable discard
    #[arg(long)]
    pub no_discard: bool,

    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(Parser)]
pub struct CdromArgs {
    #[command(flatten)]
    pub guest: GuestArgs,

    /// ISO file name, or `none` to eject
    pub file: String,

    /// Drive slot
    #[arg(long, default_value = "ide2")]
    pub device: String,

    /// Storage holding the ISO
    #[arg(long, default_value = "local")]
    pub storage: String,

    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(Parser)]
pub struct ApplyArgs {
    /// Batch file
    pub file: PathBuf,

    /// Number of guests updated in parallel [default: from config]
    #[arg(short, long)]
    pub jobs: Option<usize>,

    #[command(flatten)]
    pub write: WriteArgs,
}

#[derive(Parser)]
pub struct DecodeArgs {
    /// JSON file with the raw config (stdin if omitted)
    pub file: Option<PathBuf>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}
