//! CLI interface for the mirror.
//!
//! `mmnm-mirror run` keeps the mirror current until interrupted. Every
//! other command performs a single ingestion pass and then answers one
//! query from the fresh state, printing plain text to stdout.
//!
//! All commands read `~/.mmnm/config.toml` unless `--config` is given.

mod format;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use jiff::{SignedDuration, Timestamp};
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::events::EventBus;
use crate::identity::{IdentityResolver, MojangService};
use crate::ingest::{PassReport, Pipeline};
use crate::model::Rarity;
use crate::remote::{FileCache, FtpStore};
use crate::storage::{IdentityStore, Storage};
use crate::views::players::{SEARCH_LIMIT, mob_display_name};
use crate::views::{
    BountyBoard, Circulation, CrewRegistry, FactionRoles, PlayerDirectory, PlayerLogs, Stat,
};

use format::{format_age, format_amount, format_fruits, format_owner, format_player};

/// Mirror of a MineMineNoMi server's player and world state.
#[derive(Debug, Parser)]
#[command(name = "mmnm-mirror")]
pub struct Cli {
    /// Config file (defaults to `~/.mmnm/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ingest on a schedule until interrupted.
    Run,

    /// Run one ingestion pass and print what it did.
    ///
    /// The pass report is printed as JSON. With `--out`, the resulting
    /// player list is also written to that file.
    Pass {
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Catalog fruits by rarity, or those whose name starts with a prefix.
    Fruits { prefix: Option<String> },

    /// Catalog fruits nobody holds, in columns by rarity order.
    Circulation,

    /// Who holds a fruit, by qualified name (e.g. `mera_mera`).
    Owners { fruit: String },

    /// Fruits held by more than one player.
    Duplicates,

    /// Players carrying more than one unconsumed fruit.
    Overstocked,

    /// Show a player, by UUID, name, or linked account id.
    Player { query: String },

    /// Player names starting with a prefix.
    Search { prefix: String },

    /// Players unseen for longer than the inactivity window.
    Inactive {
        /// Only players still holding a fruit.
        #[arg(long)]
        with_fruits: bool,
    },

    /// A player's mob kill counts.
    MobKills { player: String },

    /// Open bounties, highest first.
    Bounties,

    /// Crews, optionally filtered by a name fragment.
    Crews { query: Option<String> },

    /// Link a player (UUID or name) to a chat account.
    Link {
        player: String,

        /// Account id to link. Omit with `--unlink`.
        #[arg(required_unless_present = "unlink")]
        account_id: Option<u64>,

        /// Remove the existing link.
        #[arg(long, conflicts_with = "account_id")]
        unlink: bool,
    },

    /// Players linked to a chat account.
    Links,

    /// Set or clear the chat role attached to a crew.
    CrewRole {
        crew: String,

        /// Role id to attach. Omit with `--clear`.
        #[arg(required_unless_present = "clear")]
        role_id: Option<u64>,

        #[arg(long, conflicts_with = "role_id")]
        clear: bool,
    },

    /// Top players by a stat.
    Leaderboard {
        #[arg(value_enum)]
        stat: Stat,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Server log lines mentioning a player.
    Logs { player: String },

    /// Faction role changes for linked accounts.
    ///
    /// Without `--current`, prints the role each linked account should hold.
    /// With it, reads a JSON object of account id to held role ids and
    /// prints the additions and removals needed.
    Roles {
        #[arg(long)]
        current: Option<PathBuf>,
    },
}

/// Everything a command needs, wired together.
struct Mirror {
    pipeline: Pipeline,
    catalog: Arc<Catalog>,
    storage: Arc<Storage>,
    resolver: Arc<IdentityResolver>,
    players: Arc<PlayerDirectory>,
    circulation: Arc<Circulation>,
    bounties: Arc<BountyBoard>,
    crews: Arc<CrewRegistry>,
    roles: Arc<FactionRoles>,
    logs: Arc<PlayerLogs>,
    quarantine: SignedDuration,
}

impl Mirror {
    fn build(config: &Config) -> Result<Self, String> {
        let catalog = match &config.catalog {
            Some(path) => Catalog::load(path),
            None => Catalog::bundled(),
        }
        .map_err(|e| format!("failed to load catalog: {e}"))?;
        if catalog.is_empty() {
            return Err("the devil fruit catalog is empty".to_string());
        }
        tracing::debug!(fruits = catalog.len(), "Catalog loaded");
        let catalog = Arc::new(catalog);

        let database = config
            .database()
            .ok_or("could not determine home directory")?;
        let storage = Arc::new(
            Storage::new(&database)
                .map_err(|e| format!("failed to open {}: {e}", database.display()))?,
        );

        let service = MojangService::new(config.identity.base_url.clone())
            .map_err(|e| format!("failed to build identity client: {e}"))?;
        let resolver = Arc::new(IdentityResolver::new(
            Arc::clone(&storage) as Arc<dyn IdentityStore>,
            Arc::new(service),
            config.identity.ttl(),
            config.identity.max_stale(),
        ));

        let cache_dir = config
            .cache_dir()
            .ok_or("could not determine home directory")?;
        let cache = FileCache::new(Arc::new(FtpStore::new(config.ftp.clone())), cache_dir);

        let players = Arc::new(PlayerDirectory::new());
        let circulation = Arc::new(Circulation::new(Arc::clone(&catalog)));
        let bounties = Arc::new(BountyBoard::new());
        let crews = Arc::new(CrewRegistry::new(Arc::clone(&storage)));
        let roles = Arc::new(FactionRoles::new(config.factions.clone()));
        let logs = Arc::new(PlayerLogs::new());

        let mut bus = EventBus::new();
        bus.subscribe(players.clone());
        bus.subscribe(circulation.clone());
        bus.subscribe(bounties.clone());
        bus.subscribe(crews.clone());
        bus.subscribe(roles.clone());
        bus.subscribe(logs.clone());

        let pipeline = Pipeline::new(
            cache,
            Arc::clone(&catalog),
            Arc::clone(&resolver),
            bus,
            config,
        );

        Ok(Self {
            pipeline,
            catalog,
            storage,
            resolver,
            players,
            circulation,
            bounties,
            crews,
            roles,
            logs,
            quarantine: config.ingest.quarantine(),
        })
    }

    async fn refresh(&self) -> Result<PassReport, String> {
        let report = self
            .pipeline
            .pass()
            .await
            .map_err(|e| format!("ingestion failed: {e}"))?;
        for failure in &report.failures {
            eprintln!("warning: {}: {}", failure.path, failure.error);
        }
        Ok(report)
    }
}

/// Run the CLI, returning an error message on failure.
pub async fn run() -> Result<(), String> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let mirror = Mirror::build(&config)?;

    match cli.command {
        Command::Run => cmd_run(&mirror).await,
        Command::Pass { out } => cmd_pass(&mirror, out).await,
        Command::Link {
            player,
            account_id,
            unlink,
        } => cmd_link(&mirror, &player, if unlink { None } else { account_id }).await,
        Command::Logs { player } => cmd_logs(&mirror, &player).await,
        Command::Fruits { prefix } => {
            print_fruits(&mirror.catalog, prefix.as_deref());
            Ok(())
        }
        Command::Links => cmd_links(&mirror),
        Command::CrewRole {
            crew,
            role_id,
            clear,
        } => cmd_crew_role(&mirror, &crew, if clear { None } else { role_id }),
        command => {
            mirror.refresh().await?;
            query(&mirror, command)
        }
    }
}

async fn cmd_run(mirror: &Mirror) -> Result<(), String> {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    mirror.pipeline.run(cancel).await;
    Ok(())
}

async fn cmd_pass(mirror: &Mirror, out: Option<PathBuf>) -> Result<(), String> {
    let report = mirror.refresh().await?;

    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| format!("failed to serialize report: {e}"))?;
    println!("{json}");

    if let Some(path) = out {
        let players = serde_json::to_string_pretty(&*mirror.pipeline.players())
            .map_err(|e| format!("failed to serialize players: {e}"))?;
        fs::write(&path, players)
            .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
        eprintln!("{} players → {}", report.total(), path.display());
    }

    Ok(())
}

fn print_fruits(catalog: &Catalog, prefix: Option<&str>) {
    if let Some(prefix) = prefix {
        for fruit in catalog.search(prefix, SEARCH_LIMIT) {
            println!("{}  ({})", fruit.format_name, fruit.qualified_name);
        }
        return;
    }

    for rarity in [Rarity::GoldenBox, Rarity::IronBox, Rarity::WoodenBox] {
        let mut fruits: Vec<&str> = catalog
            .of_rarity(rarity)
            .map(|f| f.format_name.as_str())
            .collect();
        fruits.sort_unstable();
        println!("{} ({}): {}", rarity.as_str(), fruits.len(), fruits.join(", "));
    }
}

fn cmd_links(mirror: &Mirror) -> Result<(), String> {
    let identities = mirror
        .storage
        .list_identities()
        .map_err(|e| format!("failed to list identities: {e}"))?;

    let linked: Vec<_> = identities
        .iter()
        .filter_map(|r| Some((r, r.account_id?)))
        .collect();
    if linked.is_empty() {
        println!("No linked players");
    }
    for (record, account) in linked {
        println!("{}  {}  → {account}", record.name, record.uuid);
    }
    Ok(())
}

fn cmd_crew_role(mirror: &Mirror, crew: &str, role_id: Option<u64>) -> Result<(), String> {
    mirror
        .storage
        .set_crew_role(crew, role_id)
        .map_err(|e| format!("failed to set role for {crew}: {e}"))?;

    let stored = mirror
        .storage
        .find_crew(crew)
        .map_err(|e| format!("failed to read {crew}: {e}"))?
        .ok_or_else(|| format!("crew {crew} disappeared"))?;
    match stored.role_id {
        Some(role) => println!("{} → role {role}", stored.name),
        None => println!("{} has no role", stored.name),
    }
    Ok(())
}

async fn cmd_link(mirror: &Mirror, player: &str, account_id: Option<u64>) -> Result<(), String> {
    let record = mirror
        .resolver
        .link(player, account_id)
        .await
        .map_err(|e| format!("failed to link {player}: {e}"))?;

    match record.account_id {
        Some(account) => println!("{} ({}) → {account}", record.name, record.uuid),
        None => println!("{} ({}) unlinked", record.name, record.uuid),
    }
    Ok(())
}

async fn cmd_logs(mirror: &Mirror, player: &str) -> Result<(), String> {
    mirror.refresh().await?;
    mirror
        .pipeline
        .read_logs()
        .await
        .map_err(|e| format!("failed to read logs: {e}"))?;

    let name = match mirror.players.find(player) {
        Some(p) => p.name,
        None => mirror
            .resolver
            .find_by_name(player)
            .await
            .map_err(|e| format!("failed to look up {player}: {e}"))?
            .map_or_else(|| player.to_string(), |r| r.name),
    };
    let report = mirror.logs.report(&name);
    if report.is_empty() {
        println!("No log lines mention {name}");
    } else {
        print!("{report}");
    }
    Ok(())
}

/// Commands answered from the views after a pass.
fn query(mirror: &Mirror, command: Command) -> Result<(), String> {
    let now = Timestamp::now();

    match command {
        Command::Circulation => {
            let columns = mirror.circulation.available_columns();
            if columns.is_empty() {
                println!("Every fruit is taken");
            }
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                for fruit in column {
                    println!("{}", fruit.format_name);
                }
            }
        }
        Command::Owners { fruit } => {
            let owners = mirror
                .circulation
                .owners(&fruit)
                .ok_or_else(|| format!("unknown fruit '{fruit}'"))?;
            if owners.is_empty() {
                println!("Nobody holds {fruit}");
            }
            for owner in &owners {
                println!("{}", format_owner(owner));
            }
        }
        Command::Duplicates => {
            let duplicates = mirror.circulation.duplicates();
            if duplicates.is_empty() {
                println!("No duplicates");
            }
            for (fruit, owners) in &duplicates {
                let owners: Vec<String> = owners.iter().map(format_owner).collect();
                println!("{}: {}", fruit.format_name, owners.join(", "));
            }
        }
        Command::Overstocked => {
            let overstocked = mirror.circulation.overstocked();
            if overstocked.is_empty() {
                println!("Nobody carries more than one fruit");
            }
            for (name, fruits) in &overstocked {
                println!("{name}: {}", format_fruits(fruits));
            }
        }
        Command::Player { query } => {
            let player = mirror
                .players
                .find(&query)
                .or_else(|| {
                    let account = query.parse().ok()?;
                    mirror.players.by_account(account)
                })
                .ok_or_else(|| format!("no player matching '{query}'"))?;
            println!("{}", format_player(&player, now));
            if let Some(world) = mirror.pipeline.world()
                && world.is_quarantined(player.uuid, now, mirror.quarantine)
            {
                println!("  fruit accounting paused: logged out holding fruit");
            }
        }
        Command::Search { prefix } => {
            for (name, uuid) in mirror.players.search(&prefix) {
                println!("{name}  {uuid}");
            }
        }
        Command::Inactive { with_fruits } => {
            let inactive = mirror.players.inactive(with_fruits);
            if inactive.is_empty() {
                println!("No inactive players");
            }
            for p in &inactive {
                println!(
                    "{}  {}  [{}]",
                    p.name,
                    format_age(p.last_seen, now),
                    format_fruits(&p.devil_fruits)
                );
            }
        }
        Command::MobKills { player } => {
            let found = mirror
                .players
                .find(&player)
                .ok_or_else(|| format!("no player matching '{player}'"))?;
            let (kills, total) = mirror.players.mob_kills(found.uuid).unwrap_or_default();
            for (mob, count) in &kills {
                println!("{:<24} {count}", mob_display_name(mob));
            }
            println!("{:<24} {total}", "Total");
        }
        Command::Bounties => {
            if let Some(world) = mirror.pipeline.world() {
                println!("As of {}", format_age(world.read_at, now));
            }
            let open = mirror.bounties.open();
            if open.is_empty() {
                println!("No open bounties");
            }
            for bounty in &open {
                println!("{:<20} {}", bounty.name, format_amount(bounty.amount));
            }
        }
        Command::Crews { query } => {
            let crews = match query {
                Some(q) => mirror.crews.search(&q, usize::MAX),
                None => mirror.crews.all().to_vec(),
            };
            for crew in &crews {
                let captain = crew.captain().map_or("-", |m| m.username.as_str());
                println!("{}  captain: {captain}  members: {}", crew.name, crew.members.len());
            }
            let diff = mirror.crews.last_diff();
            for crew in &diff.created {
                eprintln!("created: {}", crew.name);
            }
            for crew in &diff.deleted {
                eprintln!("deleted: {}", crew.name);
            }
        }
        Command::Leaderboard { stat, limit } => {
            let board = mirror.players.leaderboard(stat, limit);
            for (rank, (name, value)) in board.iter().enumerate() {
                println!("{:>3}. {name:<20} {value:.1}", rank + 1);
            }
        }
        Command::Roles { current } => cmd_roles(mirror, current)?,
        other => return Err(format!("{other:?} is not a query")),
    }

    Ok(())
}

fn cmd_roles(mirror: &Mirror, current: Option<PathBuf>) -> Result<(), String> {
    let Some(path) = current else {
        for (account, role) in mirror.roles.desired() {
            match role {
                Some(role) => println!("{account} → {role}"),
                None => println!("{account} → none"),
            }
        }
        return Ok(());
    };

    let contents = fs::read_to_string(&path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let held: HashMap<u64, Vec<u64>> = serde_json::from_str(&contents)
        .map_err(|e| format!("invalid roles file {}: {e}", path.display()))?;

    let plan = mirror.roles.plan(&held);
    if plan.is_empty() {
        println!("Roles are in sync");
    }
    for change in &plan {
        println!(
            "{}  add: {:?}  remove: {:?}",
            change.account_id, change.add, change.remove
        );
    }
    Ok(())
}
