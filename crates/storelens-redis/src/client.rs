//! Transport seam of the key-value adapter
//!
//! A [`Connector`] dials a backend and hands back a [`KvConnection`]. The
//! handshake (auth, database selection, ping) is issued over that connection
//! by the connection factory, so every transport shares it.

use async_trait::async_trait;

use storelens_common::ssl::SslConfig;
use storelens_common::Result;

use crate::resp::{Cmd, Reply};

/// One open connection to a key-value backend.
///
/// Dropping the connection closes it.
#[async_trait]
pub trait KvConnection: Send {
    /// Sends one command and waits for its reply.
    /// An error reply surfaces as `Error::Backend`.
    async fn query(&mut self, cmd: &Cmd) -> Result<Reply>;

    /// Sends all commands in one round trip.
    /// Error replies are returned in place, one reply per command.
    async fn pipeline(&mut self, cmds: &[Cmd]) -> Result<Vec<Reply>>;
}

/// Where to dial
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub tls: Option<SslConfig>,
}

impl ConnectTarget {
    /// `host:port`, bracketing IPv6 literals
    #[must_use]
    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Dials a backend
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: KvConnection;

    async fn connect(&self, target: &ConnectTarget) -> Result<Self::Conn>;
}

/// Connection answering from a closure, for replies no real store produces
#[cfg(test)]
pub(crate) mod scripted {
    use super::{async_trait, Cmd, KvConnection, Reply, Result};

    type Responder = Box<dyn FnMut(&Cmd) -> Reply + Send>;

    pub(crate) struct ScriptedConnection {
        respond: Responder,
        /// Every command received, pipelined ones included
        pub sent: Vec<Cmd>,
    }

    impl ScriptedConnection {
        pub(crate) fn new(respond: impl FnMut(&Cmd) -> Reply + Send + 'static) -> Self {
            Self {
                respond: Box::new(respond),
                sent: Vec::new(),
            }
        }

        /// Names of the commands received, in order
        pub(crate) fn sent_names(&self) -> Vec<String> {
            self.sent.iter().map(|cmd| cmd.name().to_string()).collect()
        }
    }

    #[async_trait]
    impl KvConnection for ScriptedConnection {
        async fn query(&mut self, cmd: &Cmd) -> Result<Reply> {
            self.sent.push(cmd.clone());
            (self.respond)(cmd).into_result()
        }

        async fn pipeline(&mut self, cmds: &[Cmd]) -> Result<Vec<Reply>> {
            let mut replies = Vec::with_capacity(cmds.len());
            for cmd in cmds {
                self.sent.push(cmd.clone());
                replies.push((self.respond)(cmd));
            }
            Ok(replies)
        }
    }
}
