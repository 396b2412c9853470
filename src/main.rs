use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rand::RngCore;
use uuid::Uuid;

use sitewatcher::auth::{SessionKeys, TokenGenerator};
use sitewatcher::config::ServerConfig;
use sitewatcher::server::{AppState, create_router};
use sitewatcher::store::{SqliteStore, Store};
use sitewatcher::types::{Membership, Role, Tenant, User};
use sitewatcher::worker::WorkerClient;

#[derive(Parser)]
#[command(name = "sitewatcher", about = "Multi-tenant website monitoring control plane")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
    /// Start the API server
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
        /// Base URL of the discovery worker service
        #[arg(long, default_value = "http://127.0.0.1:8090")]
        worker_url: String,
        /// Public base URL used in magic links and invite links
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        public_base_url: String,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the data directory and seed the first super admin
    Init {
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,
        /// Email of the initial super admin
        #[arg(long)]
        super_admin_email: String,
        /// Name for the initial tenant
        #[arg(long, default_value = "Default")]
        tenant_name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sitewatcher=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init {
                data_dir,
                super_admin_email,
                tenant_name,
            } => admin_init(data_dir, &super_admin_email, &tenant_name),
        },
        Commands::Serve {
            host,
            port,
            data_dir,
            worker_url,
            public_base_url,
        } => {
            serve(ServerConfig {
                host,
                port,
                data_dir,
                worker_base_url: worker_url,
                public_base_url,
            })
            .await
        }
    }
}

fn admin_init(data_dir: PathBuf, super_admin_email: &str, tenant_name: &str) -> Result<()> {
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

    let store = SqliteStore::new(sitewatcher::config::db_path(&data_dir))?;
    store.initialize()?;

    if store.has_super_admin()? {
        bail!("already initialized: a super admin exists");
    }

    let secret_path = sitewatcher::config::session_secret_path(&data_dir);
    let mut secret = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret);
    let secret_hex: String = secret.iter().map(|b| format!("{b:02x}")).collect();
    fs::write(&secret_path, &secret_hex)
        .with_context(|| format!("failed to write {}", secret_path.display()))?;
    set_restrictive_permissions(&secret_path)?;

    let tenant = Tenant {
        id: Uuid::new_v4().to_string(),
        name: tenant_name.to_string(),
        plan: "free".to_string(),
        created_at: Utc::now(),
    };
    store.create_tenant(&tenant)?;

    let user = User {
        id: Uuid::new_v4().to_string(),
        email: super_admin_email.to_string(),
        name: None,
        created_at: Utc::now(),
    };
    store.create_user(&user)?;
    store.create_membership(&Membership {
        user_id: user.id.clone(),
        tenant_id: tenant.id.clone(),
        role: Role::SuperAdmin,
    })?;

    println!("Initialized data directory {}", data_dir.display());
    println!("  tenant:      {} ({})", tenant.name, tenant.id);
    println!("  super admin: {}", user.email);
    println!("  session secret written to {}", secret_path.display());
    Ok(())
}

async fn serve(config: ServerConfig) -> Result<()> {
    let secret_path = config.session_secret_path();
    if !secret_path.exists() {
        bail!(
            "no session secret at {}; run `sitewatcher admin init` first",
            secret_path.display()
        );
    }
    let secret = fs::read(&secret_path)
        .with_context(|| format!("failed to read {}", secret_path.display()))?;

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;
    if !store.has_super_admin()? {
        bail!("no super admin configured; run `sitewatcher admin init` first");
    }

    let gateway = WorkerClient::new(&config.worker_base_url)
        .map_err(|e| anyhow::anyhow!("failed to build worker client: {e}"))?;

    let state = Arc::new(AppState {
        store: Arc::new(store),
        gateway: Arc::new(gateway),
        sessions: SessionKeys::new(&secret),
        tokens: TokenGenerator::new(),
        public_base_url: config.public_base_url.clone(),
    });

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("Listening on {} (worker at {})", addr, config.worker_base_url);
    axum::serve(listener, create_router(state)).await?;
    Ok(())
}

#[cfg(unix)]
fn set_restrictive_permissions(path: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(0o600);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn set_restrictive_permissions(_path: &std::path::Path) -> Result<()> {
    Ok(())
}
