//! Parsing of stdin lines into driver commands.

/// One line of operator input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `c <address>`: dial a peer.
    Connect(String),
    /// `q`: leave the loop and shut down.
    Quit,
    /// Anything else: send to every peer.
    Broadcast(String),
    /// Blank line.
    Empty,
    /// A recognised command with bad arguments.
    Usage(&'static str),
}

impl Command {
    /// Interpret one line (without its trailing newline).
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Self::Empty;
        }
        match line.trim() {
            "q" => return Self::Quit,
            "c" => return Self::Usage("usage: c <host:port>"),
            _ => {}
        }
        if let Some(rest) = line.strip_prefix("c ") {
            let address = rest.trim();
            return match address.split_whitespace().count() {
                1 => Self::Connect(address.to_owned()),
                _ => Self::Usage("usage: c <host:port>"),
            };
        }
        Self::Broadcast(line.to_owned())
    }
}
