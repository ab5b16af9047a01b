//! constellation-ctl — command-line interface for the constellation daemon.

use anyhow::{Context, Result};

mod cmd;

const DEFAULT_PORT: u16 = 33001;

fn print_usage() {
    println!("Usage: constellation-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                         Show node status");
    println!("  neighbours                     List established neighbours");
    println!("  blocklist                      List blocklisted nodes");
    println!("  unblock <ip:port>              Remove a node from the blocklist");
    println!("  constellation                  Show the gossiped constellation view");
    println!("  discovery                      Show known and pending discovered nodes");
    println!("  routes [ip:port]               Show routes from this node");
    println!("  route <src> <dst> [--priority <p>] [--message <m>]");
    println!("                                 Select a route and simulate delivery");
    println!("  forward <ip:port> <message>    Relay a message hop by hop");
    println!("  heartbeat                      Run one gossip push now");
    println!("  churn                          Run one churn tick now");
    println!();
    println!("Options:");
    println!("  --port <port>   Node API port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut port = DEFAULT_PORT;
    let mut priority: Option<String> = None;
    let mut message = String::from("ping");
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                port = args
                    .get(i)
                    .context("--port requires a value")?
                    .parse()
                    .context("--port must be a number")?;
            }
            "--priority" => {
                i += 1;
                priority = Some(args.get(i).context("--priority requires a value")?.clone());
            }
            "--message" => {
                i += 1;
                message = args.get(i).context("--message requires a value")?.clone();
            }
            other => remaining.push(other),
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | []                 => cmd::status::cmd_status(port).await,
        ["neighbours"] | ["neighbors"]  => cmd::status::cmd_neighbours(port).await,
        ["constellation"]               => cmd::status::cmd_constellation(port).await,
        ["discovery"]                   => cmd::status::cmd_discovery(port).await,
        ["blocklist"]                   => cmd::blocklist::cmd_blocklist(port).await,
        ["unblock", node]               => cmd::blocklist::cmd_unblock(port, node).await,
        ["routes"]                      => cmd::routing::cmd_routes(port, None).await,
        ["routes", dest]                => cmd::routing::cmd_routes(port, Some(dest)).await,
        ["route", src, dst]             => {
            cmd::routing::cmd_route(port, src, dst, priority.as_deref(), &message).await
        }
        ["forward", dst, msg]           => cmd::routing::cmd_forward(port, dst, msg).await,
        ["heartbeat"]                   => cmd::trigger::cmd_heartbeat(port).await,
        ["churn"]                       => cmd::trigger::cmd_churn(port).await,
        ["help"] | ["--help"] | ["-h"]  => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
