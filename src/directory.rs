//! A module which contains the static, immutable-after-startup view of the cluster: the ordered
//! list of endpoints, their tags (`con`/`cli`), and the `(P, A, L)` role-size tuple. Parsed once,
//! at process startup, from the host directory file described by the crate's external interface.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A node's position in the dense `[0, N)` identifier space. Consensus ids occupy `[0, P+A+L)`;
/// client ids occupy `[P+A+L, N)`.
pub type NodeId = usize;

/// `(host, port)`. Equality by value. Immutable once constructed.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(pub SocketAddrV4);

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The tag carried by each line of the host directory file.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Tag {
    Consensus,
    Client,
}

/// Everything that can go wrong parsing the host directory file. Never a panic: bootstrap failures
/// propagate as a typed error up to the CLI driver's `main`.
#[derive(Debug)]
pub enum DirectoryError {
    Io(std::io::Error),
    MissingHeader(&'static str),
    MalformedHeader { line: String },
    MalformedEntry { line: String },
    UnknownTag { line: String, tag: String },
    CountMismatch { expected: usize, found: usize },
    EmptyClients,
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryError::Io(e) => write!(f, "could not read directory file: {}", e),
            DirectoryError::MissingHeader(h) => write!(f, "missing {} header", h),
            DirectoryError::MalformedHeader { line } => {
                write!(f, "malformed header line: {:?}", line)
            }
            DirectoryError::MalformedEntry { line } => write!(f, "malformed entry line: {:?}", line),
            DirectoryError::UnknownTag { line, tag } => {
                write!(f, "unknown tag {:?} in line: {:?}", tag, line)
            }
            DirectoryError::CountMismatch { expected, found } => write!(
                f,
                "expected {} consensus entries (PROPOSERS+ACCEPTORS+LEARNERS), found {}",
                expected, found
            ),
            DirectoryError::EmptyClients => write!(f, "directory file lists zero client entries"),
        }
    }
}

impl std::error::Error for DirectoryError {}

impl From<std::io::Error> for DirectoryError {
    fn from(e: std::io::Error) -> Self {
        DirectoryError::Io(e)
    }
}

/// The static, immutable cluster topology: every endpoint the process will ever need to address,
/// tagged and ordered, plus the `(P, A, L)` role-size tuple.
#[derive(Debug, Clone)]
pub struct Directory {
    consensus: Vec<Endpoint>,
    clients: Vec<Endpoint>,
    pub proposers: usize,
    pub acceptors: usize,
    pub learners: usize,
}

impl Directory {
    /// Parses the line-oriented host directory file format:
    /// ```text
    /// PROPOSERS <p>
    /// ACCEPTORS <a>
    /// LEARNERS  <l>
    /// <host> <port> con           # repeated p+a+l times
    /// <host> <port> cli           # repeated for each client
    /// ```
    /// Blank lines and lines starting with `#` are ignored. Consensus lines must precede client
    /// lines; the last consensus line is the elected leader and the terminal learner.
    pub fn parse_file(path: &str) -> Result<Directory, DirectoryError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Directory, DirectoryError> {
        let mut lines = contents
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'));

        let proposers = parse_header(&mut lines, "PROPOSERS")?;
        let acceptors = parse_header(&mut lines, "ACCEPTORS")?;
        let learners = parse_header(&mut lines, "LEARNERS")?;

        let mut consensus = Vec::new();
        let mut clients = Vec::new();

        for line in lines {
            let (endpoint, tag) = parse_entry(line)?;
            match tag {
                Tag::Consensus if clients.is_empty() => consensus.push(endpoint),
                Tag::Consensus => {
                    // Consensus lines must precede client lines.
                    return Err(DirectoryError::MalformedEntry {
                        line: line.to_string(),
                    });
                }
                Tag::Client => clients.push(endpoint),
            }
        }

        let expected = proposers + acceptors + learners;
        if consensus.len() != expected {
            return Err(DirectoryError::CountMismatch {
                expected,
                found: consensus.len(),
            });
        }
        if clients.is_empty() {
            return Err(DirectoryError::EmptyClients);
        }

        Ok(Directory {
            consensus,
            clients,
            proposers,
            acceptors,
            learners,
        })
    }

    /// Number of consensus nodes, i.e. `P + A + L`.
    pub fn consensus_count(&self) -> usize {
        self.consensus.len()
    }

    /// Number of client nodes.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Total dense id space, `N = P + A + L + C`.
    pub fn node_count(&self) -> usize {
        self.consensus.len() + self.clients.len()
    }

    /// The endpoint of the consensus node with the given dense id, `id ∈ [0, P+A+L)`.
    pub fn consensus_endpoint(&self, id: NodeId) -> Endpoint {
        self.consensus[id]
    }

    /// All consensus endpoints, in ascending id order.
    pub fn consensus_endpoints(&self) -> &[Endpoint] {
        &self.consensus
    }

    /// All client endpoints.
    pub fn client_endpoints(&self) -> &[Endpoint] {
        &self.clients
    }

    /// The endpoint of the client node with the given dense id, `id ∈ [P+A+L, N)`.
    pub fn client_endpoint(&self, id: NodeId) -> Endpoint {
        self.clients[id - self.consensus.len()]
    }

    /// The dense id of the elected leader: the last consensus id, `P+A+L-1`.
    pub fn leader_id(&self) -> NodeId {
        self.consensus.len() - 1
    }

    /// The consensus ring successor of `id`, wrapping around modulo `P+A+L`.
    pub fn ring_successor(&self, id: NodeId) -> NodeId {
        (id + 1) % self.consensus.len()
    }
}

fn parse_header<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
    expected: &'static str,
) -> Result<usize, DirectoryError> {
    let line = lines.next().ok_or(DirectoryError::MissingHeader(expected))?;
    let mut parts = line.split_whitespace();
    let header = parts.next().ok_or_else(|| DirectoryError::MalformedHeader {
        line: line.to_string(),
    })?;
    if header != expected {
        return Err(DirectoryError::MalformedHeader {
            line: line.to_string(),
        });
    }
    let value = parts
        .next()
        .ok_or_else(|| DirectoryError::MalformedHeader {
            line: line.to_string(),
        })?;
    value.parse().map_err(|_| DirectoryError::MalformedHeader {
        line: line.to_string(),
    })
}

fn parse_entry(line: &str) -> Result<(Endpoint, Tag), DirectoryError> {
    let mut parts = line.split_whitespace();
    let host = parts.next().ok_or_else(|| DirectoryError::MalformedEntry {
        line: line.to_string(),
    })?;
    let port = parts.next().ok_or_else(|| DirectoryError::MalformedEntry {
        line: line.to_string(),
    })?;
    let tag = parts.next().ok_or_else(|| DirectoryError::MalformedEntry {
        line: line.to_string(),
    })?;

    let ip = Ipv4Addr::from_str(host).map_err(|_| DirectoryError::MalformedEntry {
        line: line.to_string(),
    })?;
    let port: u16 = port.parse().map_err(|_| DirectoryError::MalformedEntry {
        line: line.to_string(),
    })?;
    let endpoint = Endpoint(SocketAddrV4::new(ip, port));

    let tag = match tag {
        "con" => Tag::Consensus,
        "cli" => Tag::Client,
        other => {
            return Err(DirectoryError::UnknownTag {
                line: line.to_string(),
                tag: other.to_string(),
            })
        }
    };

    Ok((endpoint, tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "\
PROPOSERS 1
ACCEPTORS 1
LEARNERS  1
127.0.0.1 10000 con
127.0.0.1 10001 con
127.0.0.1 10002 con
127.0.0.1 10003 cli
";

    #[test]
    fn parses_minimal_directory() {
        let dir = Directory::parse(MINIMAL).unwrap();
        assert_eq!(dir.proposers, 1);
        assert_eq!(dir.acceptors, 1);
        assert_eq!(dir.learners, 1);
        assert_eq!(dir.consensus_count(), 3);
        assert_eq!(dir.client_count(), 1);
        assert_eq!(dir.leader_id(), 2);
        assert_eq!(dir.ring_successor(2), 0);
        assert_eq!(dir.ring_successor(0), 1);
        assert_eq!(dir.client_endpoint(3), dir.client_endpoints()[0]);
    }

    #[test]
    fn rejects_count_mismatch() {
        let bad = MINIMAL.replace("ACCEPTORS 1", "ACCEPTORS 2");
        let err = Directory::parse(&bad).unwrap_err();
        assert!(matches!(err, DirectoryError::CountMismatch { .. }));
    }

    #[test]
    fn rejects_client_before_consensus() {
        let bad = "\
PROPOSERS 1
ACCEPTORS 0
LEARNERS  0
127.0.0.1 10003 cli
127.0.0.1 10000 con
";
        let err = Directory::parse(bad).unwrap_err();
        assert!(matches!(err, DirectoryError::MalformedEntry { .. }));
    }

    #[test]
    fn rejects_unknown_tag() {
        let bad = "\
PROPOSERS 1
ACCEPTORS 0
LEARNERS  0
127.0.0.1 10000 xyz
127.0.0.1 10003 cli
";
        let err = Directory::parse(bad).unwrap_err();
        assert!(matches!(err, DirectoryError::UnknownTag { .. }));
    }

    #[test]
    fn ignores_blank_and_comment_lines() {
        let commented = "\
# a comment
PROPOSERS 1
ACCEPTORS 1
LEARNERS  1

127.0.0.1 10000 con
127.0.0.1 10001 con
# another comment
127.0.0.1 10002 con
127.0.0.1 10003 cli
";
        let dir = Directory::parse(commented).unwrap();
        assert_eq!(dir.consensus_count(), 3);
    }
}
