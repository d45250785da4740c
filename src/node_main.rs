use std::fmt::Display;
use std::process;
use std::sync::Arc;

use vnet::cli::Cli;
use vnet::cmdline::{Invocation, USAGE};
use vnet::iface::Interfaces;
use vnet::node::{NodeBuilder, Role};
use vnet::router::{ArpCache, RouteTable};
use vnet::{Args, Exit};

#[tokio::main]
async fn main() {
    env_logger::init();

    let invocation = match Invocation::try_from(std::env::args()) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("{}", USAGE);
            process::exit(1);
        }
    };

    let args = or_exit(Args::parse_from_path(invocation.link_file()));
    log::info!("{}", args);

    let role = match &invocation {
        Invocation::Router {
            route_table,
            arp_cache,
            ..
        } => {
            let routes = or_exit(RouteTable::load_from_path(
                route_table,
                &Interfaces::from(&args),
            ));
            let arp_cache = or_exit(ArpCache::load_from_path(arp_cache));
            log::info!("Route table:\n{}", routes);
            log::info!("ARP cache:\n{}", arp_cache);
            Role::Router { routes, arp_cache }
        }
        Invocation::Switch { .. } => Role::Switch,
    };

    let node = Arc::new(or_exit(NodeBuilder::new(&args, role).build().await));
    log::info!("Listening on port {}", node.host_port());

    let runner = node.clone();
    tokio::spawn(async move {
        runner.run().await;
    });

    if Cli::new(node.device()).run().await == Exit::EndOfInput {
        log::info!("Standard input closed, running until interrupted");
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Failed to wait for interrupt: {}", e);
        }
    }

    node.shutdown().await;
}

fn or_exit<T, E: Display>(result: Result<T, E>) -> T {
    result.unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        process::exit(1)
    })
}
