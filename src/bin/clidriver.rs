//! Starts one client. Grounded on the teacher crate's `examples/start_client.rs` arg-count
//! handling, condensed from the teacher's interactive/repeated proposal loop to the spec's single
//! blocking `Set` call (spec 4.7, 6).
//!
//! Usage:
//!     RUST_LOG=ring_paxos=info clidriver <uid> <value> <desired_proposer_index> [directory_file]

extern crate env_logger;
#[macro_use]
extern crate log;
extern crate ring_paxos;

use std::env;
use std::process;

use ring_paxos::client::Client;
use ring_paxos::config::NodeConfig;
use ring_paxos::directory::Directory;
use ring_paxos::Value;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    info!("{:?}", args);

    if args.len() < 4 || args.len() > 5 {
        eprintln!("Usage: clidriver <uid> <value> <desired_proposer_index> [directory_file]");
        process::exit(2);
    }

    let uid: usize = match args[1].parse() {
        Ok(n) => n,
        Err(_) => {
            error!("Error: <uid> must be a non-negative integer");
            process::exit(2);
        }
    };
    let value: Value = match args[2].parse() {
        Ok(v) => v,
        Err(_) => {
            error!("Error: <value> must be an integer");
            process::exit(2);
        }
    };
    let desired_proposer_index: usize = match args[3].parse() {
        Ok(n) => n,
        Err(_) => {
            error!("Error: <desired_proposer_index> must be a non-negative integer");
            process::exit(2);
        }
    };

    let directory_path = args.get(4).map(String::as_str).unwrap_or("hosts.txt");
    let directory = match Directory::parse_file(directory_path) {
        Ok(d) => d,
        Err(e) => {
            error!("Error: could not load directory file {:?}: {}", directory_path, e);
            process::exit(1);
        }
    };

    if uid < directory.consensus_count() || uid >= directory.node_count() {
        error!(
            "Error: uid {} is not a client node (client ids are [{}, {}))",
            uid,
            directory.consensus_count(),
            directory.node_count()
        );
        process::exit(2);
    }

    let config = NodeConfig::from_env();
    let own_endpoint = directory.client_endpoint(uid);
    let mut client = match Client::<Value>::new(uid, directory, desired_proposer_index, &own_endpoint, config) {
        Ok(c) => c,
        Err(e) => {
            error!("Error: could not bind client socket: {}", e);
            process::exit(1);
        }
    };

    client.initialize();
    let delivered = client.set(value);
    info!("[C={:?}] delivered value: {:?}", uid, delivered);
    println!("{}", delivered);
    client.cleanup();

    process::exit(0);
}
