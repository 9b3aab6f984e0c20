use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use curation_core::{
    config::load_settings, CandidateFilter, CurationSession, DurationRange, EditStatus,
    HttpCurationApi, MembershipView,
};
use shared::{
    domain::{ContainerId, ContainerKind, ItemId},
    protocol::ItemQuery,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    /// Overrides `api_base_url` from the config file and environment.
    #[arg(long)]
    api_url: Option<String>,
    /// `section` or `category`.
    #[arg(long, default_value = "section")]
    kind: String,
    /// REST collection holding the items, e.g. `songs` or `audio`.
    #[arg(long)]
    items_path: Option<String>,
    /// Only load candidates of this item kind.
    #[arg(long)]
    item_kind: Option<String>,
    container_id: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Show,
    Toggle {
        item_id: String,
    },
    Drag {
        item_id: String,
        onto: String,
    },
    Up {
        item_id: String,
    },
    Down {
        item_id: String,
    },
    Candidates {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        min_secs: Option<u32>,
        #[arg(long)]
        max_secs: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings();
    if let Some(api_url) = cli.api_url {
        settings.api_base_url = api_url;
    }
    let kind = if cli.kind.eq_ignore_ascii_case("category") {
        ContainerKind::Category
    } else {
        ContainerKind::Section
    };
    settings.containers_path = kind.resource_path().to_string();
    if let Some(items_path) = cli.items_path {
        settings.items_path = items_path;
    }

    let api = Arc::new(HttpCurationApi::from_settings(&settings)?);
    let query = ItemQuery {
        kind: cli.item_kind,
        category: None,
    };
    let (session, report) = CurationSession::open(
        ContainerId::new(cli.container_id),
        api.clone(),
        api,
        query,
        &settings,
    )
    .await?;
    if !report.pruned.is_empty() {
        info!(pruned = ?report.pruned, "dropped members whose items no longer exist");
    }

    let status = match cli.command {
        Command::Show => None,
        Command::Toggle { item_id } => Some(session.toggle_membership(item_id.into()).await?),
        Command::Drag { item_id, onto } => Some(
            session
                .reorder(&ItemId::new(item_id), &ItemId::new(onto))
                .await?,
        ),
        Command::Up { item_id } => Some(session.move_up(&ItemId::new(item_id)).await?),
        Command::Down { item_id } => Some(session.move_down(&ItemId::new(item_id)).await?),
        Command::Candidates {
            search,
            category,
            min_secs,
            max_secs,
        } => {
            session
                .set_filter(CandidateFilter {
                    search,
                    kind: None,
                    category,
                    duration: (min_secs.is_some() || max_secs.is_some()).then_some(
                        DurationRange {
                            min_secs,
                            max_secs,
                        },
                    ),
                })
                .await?;
            for item in session.view().candidate_items {
                println!("{}\t{}", item.id, item.name);
            }
            return Ok(());
        }
    };

    if let Some(EditStatus::Rejected(reason)) = &status {
        bail!("edit rejected: {reason}");
    }
    let view = session.settled().await;
    print_members(kind, session.container_id(), &view);
    if let Some(failure) = view.last_error {
        bail!("{:?} failure: {}", failure.kind, failure.message);
    }
    Ok(())
}

fn print_members(kind: ContainerKind, container_id: &ContainerId, view: &MembershipView) {
    println!("{} {container_id}", kind.resource_path());
    for (position, item) in view.resolved_members.iter().enumerate() {
        println!("{:>3}. {}\t{}", position + 1, item.id, item.name);
    }
}
