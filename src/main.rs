use anyhow::Context;
use clap::{Parser, Subcommand};

use timetrack_authz::audit::AuditEmitter;
use timetrack_authz::authz::{Authorize, Authorizer, Registry};
use timetrack_authz::config::AuthzConfig;
use timetrack_authz::models::{Action, Actor, ResourceInstance, ResourceType, Role};

#[derive(Parser, Debug)]
#[command(author, version, about = "timetrack authorization policy tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate the configured policy
    Validate,
    /// Print the capability table
    Matrix {
        #[arg(long)]
        role: Option<Role>,
    },
    /// Evaluate one authorization request and print the decision
    Check {
        #[command(flatten)]
        actor: ActorArgs,
        #[arg(long)]
        action: Action,
        #[arg(long)]
        resource: ResourceType,
        /// Instance id; required for update, delete and assignment actions
        #[arg(long)]
        instance: Option<String>,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        enterprise_wide: bool,
    },
    /// Print the read scope an actor gets for a resource type
    Scope {
        #[command(flatten)]
        actor: ActorArgs,
        #[arg(long)]
        resource: ResourceType,
    },
}

#[derive(clap::Args, Debug)]
struct ActorArgs {
    /// Actor id
    #[arg(long = "actor")]
    id: String,
    /// Role claim as sent by the identity provider; unknown values act as employee
    #[arg(long)]
    role: Option<String>,
    #[arg(long)]
    actor_department: Option<String>,
    #[arg(long, default_value = "default")]
    organization: String,
}

impl ActorArgs {
    fn to_actor(&self) -> Actor {
        let actor = Actor::from_identity(&self.id, self.role.as_deref(), &self.organization);
        match &self.actor_department {
            Some(department) => actor.with_department(department),
            None => actor,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();
    let config = AuthzConfig::from_env().context("invalid authorization configuration")?;

    let registry = match Registry::load(&config.policy_version) {
        Ok(registry) => registry,
        Err(err) => {
            tracing::error!(version = %config.policy_version, "policy failed validation: {}", err);
            return Err(err).context("refusing to start with an invalid policy");
        }
    };

    match cli.command {
        Commands::Validate => {
            println!("policy {} is valid", registry.version());
        }
        Commands::Matrix { role } => {
            print_matrix(&registry, role);
        }
        Commands::Check {
            actor,
            action,
            resource,
            instance,
            owner,
            department,
            enterprise_wide,
        } => {
            let sink = config
                .audit_sink
                .open()
                .await
                .context("failed to open audit sink")?;
            let emitter = AuditEmitter::spawn(sink, config.audit.clone());
            let authorizer = Authorizer::new(registry).with_audit(emitter.handle());

            let instance = instance.map(|id| {
                let mut instance = ResourceInstance::new(id);
                instance.owner_id = owner;
                instance.department_id = department;
                instance.enterprise_wide(enterprise_wide)
            });

            let decision = authorizer.can(&actor.to_actor(), action, resource, instance.as_ref());
            println!("{}", serde_json::to_string(&decision)?);

            let stats = emitter.shutdown().await;
            tracing::debug!(lost = stats.lost(), "audit flushed");
        }
        Commands::Scope { actor, resource } => {
            let authorizer = Authorizer::new(registry);
            let scope = authorizer.scope_for(&actor.to_actor(), resource);
            println!("{}", serde_json::to_string(&scope)?);
        }
    }

    Ok(())
}

fn print_matrix(registry: &Registry, only: Option<Role>) {
    const ABBREVIATIONS: [&str; 6] = ["C", "R", "U", "D", "AE", "MDM"];

    println!("policy {}", registry.version());
    println!(
        "{:<16} {:<14} {:<18} scope",
        "role",
        "resource",
        ABBREVIATIONS.join(" ")
    );

    for role in Role::ALL.into_iter().filter(|role| only.map_or(true, |only| only == *role)) {
        let caps = registry.capabilities_for(role);
        for resource in ResourceType::ALL {
            let flags: Vec<&str> = Action::ALL
                .iter()
                .zip(ABBREVIATIONS)
                .map(|(action, abbreviation)| {
                    if caps.allows(resource, *action) {
                        abbreviation
                    } else {
                        "-"
                    }
                })
                .collect();
            let scopes: Vec<&str> = caps
                .scope_modes(resource)
                .iter()
                .map(|mode| mode.as_str())
                .collect();
            println!(
                "{:<16} {:<14} {:<18} {}",
                role.as_str(),
                resource.as_str(),
                flags.join(" "),
                scopes.join(", ")
            );
        }
    }
}

fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

