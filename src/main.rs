// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, Subcommand};
use gimmecert::{
    ca, cert, render_status, CaHierarchy, Config, Error, HierarchyOptions, KeySpec, LeafOptions,
    LeafResult, RenewOptions, Result, Role, Store,
};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter directive.
const LOG_ENV_VAR: &str = "GIMMECERT_LOG";

// ============================================================================
// CLI definitions
// ============================================================================

#[derive(Parser)]
#[command(name = "gimmecert")]
#[command(about = "Issue X.509 certificates from a private CA hierarchy for test environments")]
#[command(version)]
#[command(after_help = "\
EXAMPLES:
    gimmecert init                           # Single-level CA named after the directory
    gimmecert init -b 'My Project' -d 3      # Three-level CA hierarchy
    gimmecert server myserver www.example.com
    gimmecert client alice --csr alice.csr.pem
    gimmecert renew server myserver --new-private-key
    gimmecert status")]
struct Cli {
    /// Project directory holding .gimmecert/ (default: current directory)
    #[arg(short = 'C', long = "directory", global = true, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show detailed output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialise the CA hierarchy
    Init {
        /// Base name for CA subjects (default: name of the project directory)
        #[arg(short = 'b', long)]
        ca_base_name: Option<String>,

        /// Number of CA levels, the first being the self-signed root
        #[arg(short = 'd', long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
        ca_hierarchy_depth: u32,

        /// Key algorithm: ecdsa:secp256r1, ecdsa:secp384r1 or ed25519
        #[arg(short = 'k', long)]
        key_specification: Option<KeySpec>,
    },

    /// Issue a server certificate
    Server {
        /// Entity name, used as the common name and first DNS name
        entity_name: String,

        /// Additional DNS subject alternative names
        extra_dns_names: Vec<String>,

        /// Issue for the public key in this CSR instead of generating a key ('-' for stdin)
        #[arg(short = 'c', long, value_name = "PATH")]
        csr: Option<PathBuf>,

        /// Key algorithm for the generated private key
        #[arg(short = 'k', long, conflicts_with = "csr")]
        key_specification: Option<KeySpec>,
    },

    /// Issue a client certificate
    Client {
        /// Entity name, used as the common name
        entity_name: String,

        /// Issue for the public key in this CSR instead of generating a key ('-' for stdin)
        #[arg(short = 'c', long, value_name = "PATH")]
        csr: Option<PathBuf>,

        /// Key algorithm for the generated private key
        #[arg(short = 'k', long, conflicts_with = "csr")]
        key_specification: Option<KeySpec>,
    },

    /// Renew an existing server or client certificate
    Renew {
        /// Certificate role: server or client
        role: Role,

        /// Entity name of the certificate to renew
        entity_name: String,

        /// Replace the private key (or CSR) with a newly generated private key
        #[arg(short = 'p', long)]
        new_private_key: bool,

        /// Replace the additional DNS names (comma-separated, server only)
        #[arg(long, value_delimiter = ',', num_args = 0..)]
        update_dns_names: Option<Vec<String>>,
    },

    /// Show the CA hierarchy and all issued certificates
    Status,
}

/// Output helper that respects --quiet and --verbose flags.
#[derive(Clone, Copy)]
struct Output {
    quiet: bool,
    verbose: bool,
}

impl Output {
    fn new(quiet: bool, verbose: bool) -> Self {
        Self { quiet, verbose }
    }

    /// Print a standard message (suppressed with --quiet)
    fn print(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a verbose message (only shown with --verbose)
    fn verbose(&self, msg: &str) {
        if self.verbose {
            println!("{}", msg);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    // Reset SIGPIPE to default behavior (exit) instead of panic
    // This prevents "broken pipe" panics when output is piped to tools like grep/head
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let out = Output::new(cli.quiet, cli.verbose);

    let project = match cli.directory {
        Some(dir) => dir,
        None => std::env::current_dir().map_err(|e| Error::ReadDir {
            path: PathBuf::from("."),
            source: e,
        })?,
    };
    let store = Store::open(&project);

    match cli.command {
        Commands::Init {
            ca_base_name,
            ca_hierarchy_depth,
            key_specification,
        } => cmd_init(
            &store,
            ca_base_name,
            ca_hierarchy_depth,
            key_specification,
            out,
        ),
        Commands::Server {
            entity_name,
            extra_dns_names,
            csr,
            key_specification,
        } => cmd_issue(
            &store,
            Role::Server,
            &entity_name,
            &extra_dns_names,
            csr.as_deref(),
            key_specification,
            out,
        ),
        Commands::Client {
            entity_name,
            csr,
            key_specification,
        } => cmd_issue(
            &store,
            Role::Client,
            &entity_name,
            &[],
            csr.as_deref(),
            key_specification,
            out,
        ),
        Commands::Renew {
            role,
            entity_name,
            new_private_key,
            update_dns_names,
        } => cmd_renew(
            &store,
            role,
            &entity_name,
            RenewOptions {
                new_private_key,
                dns_names: update_dns_names,
            },
            out,
        ),
        Commands::Status => cmd_status(&store),
    }
}

fn load_config(store: &Store) -> Result<Config> {
    Config::load(&store.paths().config)
}

/// Name of the project directory, used when no CA base name is given.
fn default_base_name(project: &Path) -> Result<String> {
    let resolved = project.canonicalize().map_err(|e| Error::ReadDir {
        path: project.to_path_buf(),
        source: e,
    })?;
    Ok(resolved
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "gimmecert".to_string()))
}

fn print_path(out: Output, store: &Store, label: &str, path: &Path) {
    out.print(&format!(
        "    {}: {}",
        label,
        store.paths().relative(path).display()
    ));
}

fn print_ca_artifacts(store: &Store, hierarchy: &CaHierarchy, out: Output) {
    let paths = store.paths();
    for level in hierarchy.levels() {
        print_path(
            out,
            store,
            &format!("CA Level {} private key", level.level),
            &paths.ca_key(level.level),
        );
        print_path(
            out,
            store,
            &format!("CA Level {} certificate", level.level),
            &paths.ca_cert(level.level),
        );
    }
    print_path(out, store, "Full certificate chain", &paths.full_chain);
}

fn cmd_init(
    store: &Store,
    ca_base_name: Option<String>,
    depth: u32,
    key_specification: Option<KeySpec>,
    out: Output,
) -> Result<()> {
    let config = load_config(store)?;
    let base_name = match ca_base_name {
        Some(name) => name,
        None => default_base_name(&store.paths().project)?,
    };
    let options = HierarchyOptions {
        key_spec: key_specification.map_or_else(|| config.key_spec(), Ok)?,
        validity_days: config.ca_days,
    };

    out.verbose(&format!(
        "Generating {}-level CA hierarchy '{}' ({})...",
        depth, base_name, options.key_spec
    ));

    let hierarchy = ca::init(store, &base_name, depth, &options)?;

    out.print("CA hierarchy initialised. Generated artifacts:");
    out.print("");
    print_ca_artifacts(store, &hierarchy, out);

    Ok(())
}

fn read_csr(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        io::read_to_string(io::stdin()).map_err(|e| Error::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })
    } else {
        gimmecert::fs::read_to_string(path)
    }
}

fn capitalised(role: Role) -> &'static str {
    match role {
        Role::Server => "Server",
        Role::Client => "Client",
    }
}

fn print_leaf_artifacts(store: &Store, leaf: &LeafResult, out: Output) {
    let paths = store.paths();
    let label = capitalised(leaf.role);

    if leaf.issued_from_csr() {
        print_path(
            out,
            store,
            &format!("{} CSR", label),
            &paths.leaf_csr(leaf.role, &leaf.name),
        );
    } else {
        print_path(
            out,
            store,
            &format!("{} private key", label),
            &paths.leaf_key(leaf.role, &leaf.name),
        );
    }
    print_path(
        out,
        store,
        &format!("{} certificate", label),
        &paths.leaf_cert(leaf.role, &leaf.name),
    );
    print_path(out, store, "Full certificate chain", &paths.full_chain);

    if leaf.role == Role::Server {
        out.verbose(&format!("    DNS names: {}", leaf.dns_names.join(", ")));
    }
}

fn cmd_issue(
    store: &Store,
    role: Role,
    entity_name: &str,
    extra_dns_names: &[String],
    csr: Option<&Path>,
    key_specification: Option<KeySpec>,
    out: Output,
) -> Result<()> {
    let config = load_config(store)?;
    let options = LeafOptions {
        key_spec: key_specification.map_or_else(|| config.key_spec(), Ok)?,
        validity_days: config.cert_days,
    };
    let csr_pem = csr.map(read_csr).transpose()?;

    let leaf = cert::issue(
        store,
        role,
        entity_name,
        extra_dns_names,
        csr_pem.as_deref(),
        &options,
    )?;

    out.print(&format!(
        "{} certificate issued for '{}'. Generated artifacts:",
        capitalised(role),
        entity_name
    ));
    out.print("");
    print_leaf_artifacts(store, &leaf, out);

    Ok(())
}

fn cmd_renew(
    store: &Store,
    role: Role,
    entity_name: &str,
    renew_options: RenewOptions,
    out: Output,
) -> Result<()> {
    let config = load_config(store)?;
    let options = LeafOptions {
        key_spec: config.key_spec()?,
        validity_days: config.cert_days,
    };

    let leaf = cert::renew(store, role, entity_name, &renew_options, &options)?;

    out.print(&format!(
        "{} certificate renewed for '{}'. Artifacts:",
        capitalised(role),
        entity_name
    ));
    out.print("");
    print_leaf_artifacts(store, &leaf, out);

    Ok(())
}

fn cmd_status(store: &Store) -> Result<()> {
    let status = render_status(store)?;
    print!("{}", status);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_renew() {
        let cli = Cli::try_parse_from([
            "gimmecert",
            "renew",
            "server",
            "web",
            "--update-dns-names",
            "a.example.com,b.example.com",
        ])
        .unwrap();

        match cli.command {
            Commands::Renew {
                role,
                entity_name,
                new_private_key,
                update_dns_names,
            } => {
                assert_eq!(role, Role::Server);
                assert_eq!(entity_name, "web");
                assert!(!new_private_key);
                assert_eq!(
                    update_dns_names,
                    Some(vec![
                        "a.example.com".to_string(),
                        "b.example.com".to_string()
                    ])
                );
            }
            _ => panic!("expected renew"),
        }
    }

    #[test]
    fn test_parse_rejects_zero_depth() {
        assert!(Cli::try_parse_from(["gimmecert", "init", "-d", "0"]).is_err());
    }

    #[test]
    fn test_parse_key_specification() {
        let cli =
            Cli::try_parse_from(["gimmecert", "client", "alice", "-k", "ed25519"]).unwrap();
        match cli.command {
            Commands::Client {
                key_specification, ..
            } => assert_eq!(key_specification, Some(KeySpec::Ed25519)),
            _ => panic!("expected client"),
        }
    }
}
