//! Starts one consensus node. The node does not know its Paxos role until the bootstrap handshake
//! (Chang-Roberts election, then the elected leader's role assignment) has run; unlike the teacher
//! crate's four role-specific `start_proposer`/`start_acceptor`/`start_learner` example binaries,
//! a single `condriver` covers all three, per spec section 6.
//!
//! Usage:
//!     RUST_LOG=ring_paxos=info condriver <uid> [directory_file]
//! `directory_file` defaults to `hosts.txt` (spec section 6 names no directory-file argument, so
//! this is an added trailing argument; see DESIGN.md Open Question decisions).

extern crate env_logger;
#[macro_use]
extern crate log;
extern crate ring_paxos;

use std::env;
use std::process;

use ring_paxos::config::NodeConfig;
use ring_paxos::directory::Directory;
use ring_paxos::node;
use ring_paxos::Value;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    info!("{:?}", args);

    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: condriver <uid> [directory_file]");
        process::exit(2);
    }

    let uid: usize = match args[1].parse() {
        Ok(n) => n,
        Err(_) => {
            error!("Error: <uid> must be a non-negative integer");
            process::exit(2);
        }
    };

    let directory_path = args.get(2).map(String::as_str).unwrap_or("hosts.txt");
    let directory = match Directory::parse_file(directory_path) {
        Ok(d) => d,
        Err(e) => {
            error!("Error: could not load directory file {:?}: {}", directory_path, e);
            process::exit(1);
        }
    };

    if uid >= directory.consensus_count() {
        error!(
            "Error: uid {} is not a consensus node (consensus ids are [0, {}))",
            uid,
            directory.consensus_count()
        );
        process::exit(2);
    }

    let config = NodeConfig::from_env();

    match node::run::<Value>(uid, directory, config) {
        Ok(()) => process::exit(0),
        Err(e) => {
            error!("Error: node {} exited with I/O error: {}", uid, e);
            process::exit(1);
        }
    }
}
