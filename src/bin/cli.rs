//! CLI for talking to a zero coordinator

use clap::{Parser, Subcommand};
use minizero::common::parse_duration;
use minizero::coordinator::{Member, MemberRef, MembershipUpdate, ZeroClient};

#[derive(Parser)]
#[command(name = "minizero")]
#[command(about = "minizero coordinator CLI")]
#[command(version)]
struct Cli {
    /// Coordinator URL
    #[arg(long, default_value = "http://localhost:5080")]
    coordinator: String,

    /// Per-request deadline (e.g. "5s")
    #[arg(long, default_value = "5s")]
    timeout: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a member
    Connect {
        #[arg(long)]
        id: u64,

        #[arg(long)]
        address: String,

        /// Preferred group (0 = let the coordinator decide)
        #[arg(long, default_value = "0")]
        group: u32,
    },

    /// Heartbeat a member
    Update {
        #[arg(long)]
        id: u64,

        /// New address (empty keeps the registered one)
        #[arg(long, default_value = "")]
        address: String,
    },

    /// Ask whether a member may serve a tablet
    ShouldServe {
        #[arg(long)]
        id: u64,

        #[arg(long)]
        group: u32,

        /// Tablet predicate
        predicate: String,
    },

    /// Show groups, members and tablet owners
    Status,
}

fn print_update(update: &MembershipUpdate) {
    println!(
        "Member {} ({}) is in group {}",
        update.member.id, update.member.address, update.group_id
    );
    let peers = update.peers();
    if peers.is_empty() {
        println!("  No peers yet");
    }
    for peer in peers {
        println!("  Peer {} at {}", peer.id, peer.address);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = ZeroClient::new(&cli.coordinator)
        .with_timeout(parse_duration(&cli.timeout)?)
        .with_retries(3);

    match cli.command {
        Commands::Connect { id, address, group } => {
            let update = client
                .connect(&Member::new(id, address).in_group(group))
                .await?;
            print_update(&update);
        }

        Commands::Update { id, address } => {
            let update = client.update(&Member::new(id, address)).await?;
            print_update(&update);
        }

        Commands::ShouldServe {
            id,
            group,
            predicate,
        } => {
            let status = client
                .should_serve(MemberRef { id, group_id: group }, &predicate)
                .await?;
            println!("{}", status);
        }

        Commands::Status => {
            let snapshot = client.state().await?;
            println!("Cluster status:");
            println!("  Replicas per group: {}", snapshot.num_replicas);
            println!("  Next group id: {}", snapshot.next_group_id);
            for (gid, members) in &snapshot.groups {
                println!("  Group {} ({} members)", gid, members.len());
                for m in members {
                    let seen = snapshot
                        .last_seen
                        .get(&m.id)
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "never".to_string());
                    println!("    {} at {} (last seen: {})", m.id, m.address, seen);
                }
            }
            println!("  Tablets: {}", snapshot.tablets.len());
            for (predicate, gid) in &snapshot.tablets {
                println!("    {} -> group {}", predicate, gid);
            }
        }
    }

    Ok(())
}
