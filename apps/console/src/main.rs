use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    load_settings, ClientSettings, CollectionItem, Dashboard, DirtyField, Dispatch,
};
use shared::domain::{
    FootprintId, IncidenceFilter, IncidenceId, IntegrationId, SettingId, TransitionKind,
};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "insider-console",
    about = "Operate an Insider error dashboard from the terminal"
)]
struct Cli {
    /// Overrides base_url from insider.toml and the environment.
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    csrf_token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Incidences {
        /// "", "new" or "regressions".
        #[arg(long, default_value = "")]
        filter: String,
    },
    Incidence {
        id: i64,
    },
    Resolve {
        ids: Vec<i64>,
        #[arg(long, default_value = "")]
        filter: String,
    },
    Ignore {
        ids: Vec<i64>,
        #[arg(long, default_value = "")]
        filter: String,
    },
    Integrations,
    Toggle {
        identifier: String,
    },
    Reorder {
        from: usize,
        to: usize,
    },
    Settings,
    Set {
        id: i64,
        value: String,
    },
    Stats,
    Footprints {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Footprint {
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let settings = resolve_settings(&cli);
    let dashboard = Dashboard::from_settings(&settings)
        .with_context(|| format!("failed to build client for {}", settings.base_url))?;

    let outcome = run(&dashboard, cli.command).await;
    dashboard.settle().await;
    print_failures(&dashboard).await?;
    dashboard.shutdown().await;
    outcome
}

fn resolve_settings(cli: &Cli) -> ClientSettings {
    load_settings().with_overrides(cli.base_url.as_deref(), cli.csrf_token.as_deref())
}

async fn run(dashboard: &Arc<Dashboard>, command: Command) -> Result<()> {
    match command {
        Command::Incidences { filter } => {
            let rows = dashboard.set_filter(parse_filter(&filter)?).await?;
            for row in &rows {
                println!(
                    "#{:<6} {:<9} x{:<5} users={:<4} last_seen={} {}",
                    row.id,
                    format!("{:?}", row.status),
                    row.occurrence_count,
                    row.users_affected,
                    row.last_seen.to_rfc3339(),
                    row.title
                );
            }
            println!("{} incidences", rows.len());
        }
        Command::Incidence { id } => {
            let detail = dashboard.incidence_detail(IncidenceId(id)).await?;
            let footprints = dashboard.incidence_footprints(IncidenceId(id)).await?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
            println!("{} footprints", footprints.len());
        }
        Command::Resolve { ids, filter } => {
            transition(dashboard, TransitionKind::Resolve, &ids, &filter).await?;
        }
        Command::Ignore { ids, filter } => {
            transition(dashboard, TransitionKind::Ignore, &ids, &filter).await?;
        }
        Command::Integrations => {
            print_integrations(&dashboard.load_integrations().await?);
        }
        Command::Toggle { identifier } => {
            dashboard.load_integrations().await?;
            let id = IntegrationId::new(identifier);
            if let Dispatch::Accepted(is_active) = dashboard.toggle_integration(&id).await? {
                println!("requested {id} active={is_active}");
            }
            dashboard.settle().await;
            print_integrations(&dashboard.integrations().await);
        }
        Command::Reorder { from, to } => {
            dashboard.load_integrations().await?;
            let _ = dashboard.reorder_integration(from, to).await?;
            dashboard.settle().await;
            print_integrations(&dashboard.integrations().await);
        }
        Command::Settings => {
            print_settings(&dashboard.load_settings().await?);
        }
        Command::Set { id, value } => {
            let id = SettingId(id);
            dashboard.load_settings().await?;
            dashboard.edit_setting_input(id, &value).await?;
            dashboard.save_setting(id).await?;
            dashboard.settle().await;
            print_settings(&dashboard.settings().await);
        }
        Command::Stats => {
            let stats = dashboard.dashboard_stats().await?;
            println!(
                "24h total={} 5xx={} 4xx={} avg_response={:.1}ms",
                stats.velocity.total_24h,
                stats.velocity.errors_500,
                stats.velocity.errors_400,
                stats.health.avg_response_time_ms
            );
            for offender in &stats.top_offenders {
                println!(
                    "  offender #{} x{} {}",
                    offender.id, offender.occurrence_count, offender.title
                );
            }
            for risk in &stats.performance_risks {
                println!(
                    "  slow {} {} queries={} avg={:.1}ms",
                    risk.method, risk.path, risk.db_query_count, risk.avg_duration
                );
            }
        }
        Command::Footprints { page } => {
            let listing = dashboard.footprints_page(page).await?;
            for footprint in &listing.results {
                println!(
                    "{:<8} {:<6} {:<4} {}",
                    footprint.id,
                    footprint.request_method,
                    footprint.status_code,
                    footprint.request_path
                );
            }
            println!(
                "page {page}/{} ({} footprints)",
                listing.page_count().max(1),
                listing.count
            );
        }
        Command::Footprint { id } => {
            let footprint = dashboard.footprint(FootprintId(id)).await?;
            let breadcrumbs = dashboard.footprint_breadcrumbs(FootprintId(id)).await?;
            println!("{}", serde_json::to_string_pretty(&footprint)?);
            for crumb in &breadcrumbs {
                println!(
                    "  <- {} {} {}",
                    crumb.created_at.to_rfc3339(),
                    crumb.request_method,
                    crumb.request_path
                );
            }
        }
    }
    Ok(())
}

async fn transition(
    dashboard: &Arc<Dashboard>,
    kind: TransitionKind,
    ids: &[i64],
    filter: &str,
) -> Result<()> {
    if ids.is_empty() {
        bail!("no incidence ids given");
    }
    dashboard.set_filter(parse_filter(filter)?).await?;
    for id in ids {
        if dashboard.toggle_selected(IncidenceId(*id)).await != Dispatch::Accepted(true) {
            warn!(incidence = id, "not in the current list; skipped");
        }
    }
    match dashboard.bulk_transition(kind).await {
        Dispatch::Accepted(0) => println!("nothing selected"),
        Dispatch::Accepted(sent) => println!("sent {kind:?} for {sent} incidences"),
        Dispatch::Disabled => println!("list is reloading; try again"),
    }
    dashboard.settle().await;
    println!("{} incidences remain in view", dashboard.incidences().await.rows.len());
    Ok(())
}

fn parse_filter(raw: &str) -> Result<IncidenceFilter> {
    IncidenceFilter::from_query(raw).ok_or_else(|| anyhow!("unknown filter {raw:?}"))
}

fn print_integrations(items: &[CollectionItem]) {
    for item in items {
        println!(
            "{:>2}. [{}] {} ({})",
            item.order_index,
            if item.is_active { "x" } else { " " },
            item.name,
            item.identifier
        );
    }
}

fn print_settings(fields: &[DirtyField]) {
    for field in fields {
        println!(
            "{:>3} {:<28} {:?}{}",
            field.record_id,
            field.key,
            field.value,
            if field.is_dirty { " (unsaved)" } else { "" }
        );
    }
}

async fn print_failures(dashboard: &Dashboard) -> Result<()> {
    for failure in dashboard.failures().await {
        eprintln!("failed: {}", serde_json::to_string(&failure)?);
    }
    Ok(())
}
