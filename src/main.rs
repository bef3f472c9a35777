use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use strum::IntoEnumIterator;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use scriptshop::config::Config;
use scriptshop::db::{AppState, DbPool, create_pool, init_audit_db, init_db, queries};
use scriptshop::events::{EventBus, spawn_discord_notifier};
use scriptshop::handlers;
use scriptshop::models::{AuditAction, DiscordProfile, Permission, Role, UpdateUserRoles};
use scriptshop::payments::{PaymentSettings, SvgQrRenderer, funding};
use scriptshop::uploads::SlipStore;

#[derive(Parser)]
#[command(name = "scriptshop", version, about = "Script storefront with PromptPay top-ups")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Expire stale QR payments once and exit
    Sweep,
    /// Give a user admin rights
    GrantAdmin {
        #[arg(long)]
        discord_id: String,
        #[arg(long, default_value = "admin")]
        role: String,
    },
    /// Issue a session token for a user (dev mode only)
    IssueSession {
        #[arg(long)]
        discord_id: String,
        #[arg(long)]
        username: Option<String>,
    },
    /// Delete audit logs past the retention window
    PurgeAudit,
}

fn open_databases(config: &Config) -> anyhow::Result<(DbPool, DbPool)> {
    let db = create_pool(&config.database_path).context("Failed to open database")?;
    let audit = create_pool(&config.audit_database_path).context("Failed to open audit database")?;
    init_db(&*db.get()?).context("Failed to initialize database schema")?;
    init_audit_db(&*audit.get()?).context("Failed to initialize audit schema")?;
    Ok((db, audit))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scriptshop=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Sweep => {
            let (db, _) = open_databases(&config)?;
            let expired = funding::expire_stale_intents(
                &*db.get()?,
                &EventBus::default(),
                chrono::Utc::now().timestamp(),
            )?;
            println!("Expired {} payment(s)", expired);
            Ok(())
        }
        Command::GrantAdmin { discord_id, role } => {
            let role: Role = role.parse().context("Role must be user, admin or superadmin")?;
            let (db, audit) = open_databases(&config)?;
            let conn = db.get()?;
            let user = queries::get_user_by_discord_id(&conn, &discord_id)?
                .with_context(|| format!("No user with Discord id {}", discord_id))?;
            // Bootstrap grants carry every permission; narrow them later over HTTP.
            let update = UpdateUserRoles {
                role,
                permissions: Permission::iter().collect(),
            };
            queries::update_user_roles(&conn, &user.id, role, &update.normalized_permissions())?;
            queries::create_audit_log(
                &*audit.get()?,
                config.audit_log_enabled,
                None,
                AuditAction::GrantAdmin,
                "user",
                &user.id,
                Some(&serde_json::json!({ "role": role, "source": "cli" })),
                None,
                None,
            )?;
            println!("{} is now {}", user.username, role.as_ref());
            Ok(())
        }
        Command::IssueSession {
            discord_id,
            username,
        } => {
            if !config.dev_mode {
                bail!("issue-session is only available with SCRIPTSHOP_ENV=dev");
            }
            let (db, _) = open_databases(&config)?;
            let conn = db.get()?;
            let user = queries::upsert_user_from_discord(
                &conn,
                &DiscordProfile {
                    username: username.unwrap_or_else(|| format!("user-{}", discord_id)),
                    discord_id,
                    avatar: None,
                },
            )?;
            let token = queries::create_session(&conn, &user.id, config.session_ttl_hours * 3600)?;
            println!("{}", token);
            Ok(())
        }
        Command::PurgeAudit => {
            let (_, audit) = open_databases(&config)?;
            if config.audit_log_retention_days <= 0 {
                println!("Audit log retention is unlimited; nothing to purge");
                return Ok(());
            }
            let deleted =
                queries::purge_old_audit_logs(&*audit.get()?, config.audit_log_retention_days)?;
            println!("Purged {} audit log(s)", deleted);
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    if let Err(e) = config.validate() {
        bail!(e);
    }
    if config.dev_mode {
        tracing::warn!("Running in dev mode");
    }

    let (db, audit) = open_databases(&config)?;

    if config.audit_log_retention_days > 0 {
        match queries::purge_old_audit_logs(&*audit.get()?, config.audit_log_retention_days) {
            Ok(0) => {}
            Ok(n) => tracing::info!("Purged {} old audit logs", n),
            Err(e) => tracing::warn!("Failed to purge old audit logs: {}", e),
        }
    }
    match queries::purge_expired_sessions(&*db.get()?) {
        Ok(0) => {}
        Ok(n) => tracing::info!("Purged {} expired sessions", n),
        Err(e) => tracing::warn!("Failed to purge expired sessions: {}", e),
    }

    let events = EventBus::default();
    if let Some(url) = config.discord_webhook_url.clone() {
        spawn_discord_notifier(&events, url);
        tracing::info!("Discord notifications enabled");
    }
    funding::spawn_expiry_sweeper(
        db.clone(),
        events.clone(),
        Duration::from_secs(config.expiry_sweep_secs.max(1)),
    );

    let state = AppState {
        db,
        audit,
        audit_log_enabled: config.audit_log_enabled,
        payments: PaymentSettings::from_config(&config),
        slips: SlipStore::new(&config.upload_dir, config.max_slip_bytes),
        session_ttl_secs: config.session_ttl_hours * 3600,
        events,
        qr: Arc::new(SvgQrRenderer::default()),
    };

    let app = handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {} ({})", addr, config.base_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}
