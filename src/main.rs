//! Sonar node binary: the overlay runtime plus the operator menu.

use clap::Parser;
use sonar::net::{DEFAULT_TTL, Initiated, Node, NodeConfig, PeerAddr, SearchMode};
use sonar::{load_keys, load_neighbors};
use std::collections::HashMap;
use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sonar", version, about = "Unstructured P2P key-value search overlay")]
struct Args {
    /// Local address peers reach this node at, as HOST:PORT
    local: String,

    /// Neighbors file: one HOST:PORT per line
    neighbors_file: Option<PathBuf>,

    /// Key-value seed file: one KEY VALUE pair per line
    key_value_file: Option<PathBuf>,

    /// Initial hop budget for searches originated here
    #[arg(short, long, default_value_t = DEFAULT_TTL)]
    ttl: u32,
}

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sonar=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let local: PeerAddr = match args.local.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("invalid local address: {e}");
            return ExitCode::FAILURE;
        }
    };

    let neighbors = match &args.neighbors_file {
        Some(path) => match load_neighbors(path) {
            Ok(neighbors) => {
                info!("loaded {} neighbors from {}", neighbors.len(), path.display());
                neighbors
            }
            Err(e) => {
                error!("failed to load neighbors from {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => Vec::new(),
    };

    let keys = match &args.key_value_file {
        Some(path) => match load_keys(path) {
            Ok(keys) => {
                info!("loaded {} key-value pairs from {}", keys.len(), path.display());
                keys
            }
            Err(e) => {
                error!("failed to load key-value pairs from {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => HashMap::new(),
    };

    info!("sonar v{} starting at {local}", env!("CARGO_PKG_VERSION"));

    let node = match Node::start(NodeConfig {
        local,
        neighbors,
        keys,
        default_ttl: args.ttl,
    })
    .await
    {
        Ok(node) => node,
        Err(e) => {
            error!("failed to start node: {e}");
            return ExitCode::FAILURE;
        }
    };

    menu_loop(node.clone()).await;
    node.shutdown().await;
    ExitCode::SUCCESS
}

/// The operator menu. Runs until the operator quits or stdin closes.
async fn menu_loop(node: Arc<Node>) {
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_menu();
        let Some(choice) = read_line(&mut input).await else {
            return;
        };
        match choice.trim() {
            "" => {}
            "0" => list_neighbors(&node).await,
            "1" => hello_neighbor(&node, &mut input).await,
            "2" => search(&node, SearchMode::Flooding, &mut input).await,
            "3" => search(&node, SearchMode::RandomWalk, &mut input).await,
            "4" => search(&node, SearchMode::DepthFirst, &mut input).await,
            "5" => show_statistics(&node).await,
            "6" => change_ttl(&node, &mut input).await,
            "9" => return,
            other => println!("invalid choice `{other}`"),
        }
    }
}

fn print_menu() {
    println!();
    println!("[0] list neighbors");
    println!("[1] hello");
    println!("[2] flooding search");
    println!("[3] random walk search");
    println!("[4] depth-first search");
    println!("[5] statistics");
    println!("[6] change default ttl");
    println!("[9] quit");
}

async fn read_line(input: &mut Input) -> Option<String> {
    match input.next_line().await {
        Ok(Some(line)) => Some(line),
        _ => None,
    }
}

async fn prompt(input: &mut Input, text: &str) -> Option<String> {
    print!("{text}");
    std::io::stdout().flush().ok();
    read_line(input).await
}

async fn list_neighbors(node: &Node) {
    let peers = node.neighbors().list().await;
    println!("{} neighbors in the table:", peers.len());
    for (i, peer) in peers.iter().enumerate() {
        println!("  [{i}] {peer}");
    }
}

async fn hello_neighbor(node: &Node, input: &mut Input) {
    let Some(line) = prompt(input, "neighbor index: ").await else {
        return;
    };
    let Ok(index) = line.trim().parse::<usize>() else {
        println!("invalid index `{}`", line.trim());
        return;
    };
    match node.neighbors().get(index).await {
        Some(peer) => node.send_hello(&peer).await,
        None => println!("no neighbor at index {index}"),
    }
}

async fn search(node: &Node, mode: SearchMode, input: &mut Input) {
    let Some(line) = prompt(input, "key: ").await else {
        return;
    };
    let key = line.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        println!("keys are single non-empty words");
        return;
    }
    match node.engine().initiate(mode, key).await {
        Initiated::LocalHit(value) => println!("{key} = {value} (held locally)"),
        Initiated::Launched(seqno) => {
            println!("{mode} search #{seqno} launched for {key} (results arrive asynchronously)")
        }
    }
}

async fn show_statistics(node: &Node) {
    let stats = node.engine().stats_snapshot().await;
    println!("completed searches (default ttl {}):", node.engine().default_ttl());
    for mode in SearchMode::ALL {
        let m = stats.mode(mode);
        println!(
            "  {mode}: {} completed, mean hops {:.2}, stddev {:.2}",
            m.completed,
            m.mean(),
            m.stddev()
        );
    }
}

async fn change_ttl(node: &Node, input: &mut Input) {
    let Some(line) = prompt(input, "new ttl: ").await else {
        return;
    };
    match line.trim().parse::<u32>() {
        Ok(ttl) if ttl > 0 => {
            node.engine().set_default_ttl(ttl);
            println!("default ttl set to {ttl}");
        }
        _ => println!("ttl must be a positive integer"),
    }
}
