// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use clap::{Parser, Subcommand};
use kube::Client;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tenantctl::config::Config;
use tenantctl::error::TenantError;
use tenantctl::kubernetes::ClusterInfo;
use tenantctl::provisioner::Provisioner;
use tenantctl::reconcilers::TenantReconciler;
use tenantctl::registry::{Registry, TenantRecord};
use tenantctl::types::TenantRequest;

#[derive(Parser)]
#[command(name = "tenantctl", version, about = "Onboard tenants onto a shared Kubernetes cluster")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a tenant, or converge an existing one
    Provision {
        username: String,
        /// Base domain; the tenant is served on <username>.<domain>
        domain: String,
        /// Namespace to use instead of the username
        #[arg(long)]
        namespace: Option<String>,
        /// One of admin, edit, view, developer
        #[arg(long, default_value = "developer")]
        role: String,
        /// Wildcard TLS secret to serve the subdomain with
        #[arg(long)]
        cert_secret: Option<String>,
        #[arg(long)]
        validity_days: Option<u32>,
    },
    /// Delete everything recorded for a tenant
    Deprovision { username: String },
    /// Issue a new client certificate and kubeconfig
    RotateCredentials {
        username: String,
        #[arg(long)]
        validity_days: Option<u32>,
    },
    /// List registered tenants
    List,
    /// Print a tenant's registry record
    Show { username: String },
    /// Keep tenant RBAC in line with the registry until interrupted
    Watch,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli.command).await {
        error!("{}", err);
        let code = err.downcast_ref::<TenantError>().map_or(1, TenantError::exit_code);
        std::process::exit(code);
    }
}

async fn run(command: Command) -> Result<()> {
    let config = Config::from_env()?;

    match command {
        Command::Provision {
            username,
            domain,
            namespace,
            role,
            cert_secret,
            validity_days,
        } => {
            let request = TenantRequest {
                username,
                domain,
                namespace,
                role,
                cert_secret,
                validity_days,
            };
            let record = connect(config).await?.provision(request).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Deprovision { username } => {
            if !connect(config).await?.deprovision(&username).await? {
                warn!("Nothing to do for {}", username);
            }
        }
        Command::RotateCredentials {
            username,
            validity_days,
        } => {
            let record = connect(config)
                .await?
                .rotate_credentials(&username, validity_days)
                .await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::List => {
            let records = Registry::new(&config.state_dir).list()?;
            print_table(&records);
        }
        Command::Show { username } => {
            let record = Registry::new(&config.state_dir).get(&username)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Watch => {
            let client = Client::try_default().await?;
            info!("Connected to Kubernetes cluster");
            TenantReconciler::new(client, &config).run().await?;
            warn!("Reconciler stopped unexpectedly");
        }
    }

    Ok(())
}

async fn connect(config: Config) -> Result<Provisioner> {
    let client = Client::try_default().await?;
    let cluster = ClusterInfo::discover(&config.cluster).await?;
    info!("Connected to cluster {} at {}", cluster.name, cluster.endpoint);
    Ok(Provisioner::new(client, config, cluster))
}

fn print_table(records: &[TenantRecord]) {
    println!(
        "{:<20} {:<20} {:<10} {:<40} {:<13} {}",
        "USERNAME", "NAMESPACE", "ROLE", "SUBDOMAIN", "PHASE", "CERT EXPIRY"
    );
    for record in records {
        let expiry = record
            .cert_expiry
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<20} {:<20} {:<10} {:<40} {:<13} {}",
            record.username,
            record.namespace,
            record.role.as_str(),
            record.subdomain,
            format!("{:?}", record.phase),
            expiry
        );
    }
}
