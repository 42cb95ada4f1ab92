//! In-process keyspace executing the adapter's command set
//!
//! [`MemoryConnector`] stands in for a network server: commands go through the
//! same [`KvConnection`] interface and get the same replies a RESP server
//! gives, including `WRONGTYPE` and range errors. The store counts open
//! connections and round trips so callers can check resource handling.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use storelens_common::{Error, Result};

use crate::client::{ConnectTarget, Connector, KvConnection};
use crate::resp::{Cmd, Reply};

/// Logical databases of a default server
pub const DEFAULT_DATABASES: usize = 16;

type Keyspace = DashMap<String, KvValue>;

/// A stored value
#[derive(Debug, Clone)]
pub enum KvValue {
    String(String),
    Hash(HashMap<String, String>),
    List(Vec<String>),
    Set(HashSet<String>),
    /// Kept ordered by (score, member)
    SortedSet(Vec<(f64, String)>),
}

impl KvValue {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            KvValue::String(_) => "string",
            KvValue::Hash(_) => "hash",
            KvValue::List(_) => "list",
            KvValue::Set(_) => "set",
            KvValue::SortedSet(_) => "zset",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            KvValue::String(_) => false,
            KvValue::Hash(h) => h.is_empty(),
            KvValue::List(l) => l.is_empty(),
            KvValue::Set(s) => s.is_empty(),
            KvValue::SortedSet(z) => z.is_empty(),
        }
    }
}

fn wrong_type() -> Reply {
    Reply::error("WRONGTYPE Operation against a key holding the wrong kind of value")
}

fn wrong_arity(cmd: &str) -> Reply {
    Reply::error(format!("ERR wrong number of arguments for '{}' command", cmd.to_lowercase()))
}

fn not_an_integer() -> Reply {
    Reply::error("ERR value is not an integer or out of range")
}

fn count(n: usize) -> Reply {
    Reply::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

/// Shared server state
pub struct MemoryStore {
    databases: Vec<Keyspace>,
    password: Option<String>,
    reachable: AtomicBool,
    open_connections: AtomicUsize,
    round_trips: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_databases(DEFAULT_DATABASES)
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_databases(count: usize) -> Self {
        Self {
            databases: (0..count).map(|_| DashMap::new()).collect(),
            password: None,
            reachable: AtomicBool::new(true),
            open_connections: AtomicUsize::new(0),
            round_trips: AtomicUsize::new(0),
        }
    }

    /// Requires `AUTH <password>` before any other command
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Makes subsequent dials fail
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Connections currently open
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    /// Round trips served so far; a pipeline counts once
    #[must_use]
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    /// Runs a command directly against database `db`, outside any connection
    pub fn seed(&self, db: usize, args: &[&str]) -> Reply {
        let args: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
        self.execute(db, &args)
    }

    /// Executes one command against database `db`
    pub fn execute(&self, db: usize, args: &[String]) -> Reply {
        let Some(keyspace) = self.databases.get(db) else {
            return Reply::error("ERR DB index is out of range");
        };
        let Some(name) = args.first() else {
            return Reply::error("ERR empty command");
        };
        let cmd = name.to_uppercase();
        let min_args = match cmd.as_str() {
            "PING" | "DBSIZE" | "FLUSHDB" => 1,
            "TYPE" | "KEYS" | "DEL" | "EXISTS" | "GET" | "STRLEN" | "HGETALL" | "HLEN" | "LLEN"
            | "SMEMBERS" | "SCARD" | "ZCARD" | "ECHO" => 2,
            "SET" | "HGET" | "HDEL" | "RPUSH" | "LINDEX" | "SADD" | "SREM" | "ZREM" => 3,
            "HSET" | "LRANGE" | "LSET" | "LREM" | "ZADD" | "ZRANGE" => 4,
            _ => return Reply::error(format!("ERR unknown command '{}'", name)),
        };
        if args.len() < min_args {
            return wrong_arity(&cmd);
        }

        match cmd.as_str() {
            "PING" => match args.get(1) {
                Some(msg) => Reply::bulk(msg.clone()),
                None => Reply::Status("PONG".to_string()),
            },
            "ECHO" => Reply::bulk(args[1].clone()),
            "DBSIZE" => count(keyspace.len()),
            "FLUSHDB" => {
                keyspace.clear();
                Reply::ok()
            }
            "TYPE" => Reply::Status(
                keyspace
                    .get(&args[1])
                    .map_or("none", |v| v.type_name())
                    .to_string(),
            ),
            "KEYS" => {
                let mut keys: Vec<String> = keyspace
                    .iter()
                    .filter(|e| glob_match(&args[1], e.key()))
                    .map(|e| e.key().clone())
                    .collect();
                keys.sort();
                Reply::strings(keys)
            }
            "DEL" => count(args[1..].iter().filter(|k| keyspace.remove(*k).is_some()).count()),
            "EXISTS" => count(args[1..].iter().filter(|k| keyspace.contains_key(*k)).count()),

            // Strings
            "GET" => match keyspace.get(&args[1]).as_deref() {
                Some(KvValue::String(s)) => Reply::bulk(s.clone()),
                Some(_) => wrong_type(),
                None => Reply::nil(),
            },
            "SET" => {
                keyspace.insert(args[1].clone(), KvValue::String(args[2].clone()));
                Reply::ok()
            }
            "STRLEN" => match keyspace.get(&args[1]).as_deref() {
                Some(KvValue::String(s)) => count(s.len()),
                Some(_) => wrong_type(),
                None => Reply::Integer(0),
            },

            // Hashes
            "HSET" => {
                if (args.len() - 2) % 2 != 0 {
                    return wrong_arity(&cmd);
                }
                update(keyspace, &args[1], Some(KvValue::Hash(HashMap::new())), |value| {
                    let KvValue::Hash(hash) = value else {
                        return wrong_type();
                    };
                    let added = args[2..]
                        .chunks(2)
                        .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
                        .count();
                    count(added)
                })
            }
            "HGET" => match keyspace.get(&args[1]).as_deref() {
                Some(KvValue::Hash(h)) => h.get(&args[2]).map_or_else(Reply::nil, |v| Reply::bulk(v.clone())),
                Some(_) => wrong_type(),
                None => Reply::nil(),
            },
            "HGETALL" => match keyspace.get(&args[1]).as_deref() {
                Some(KvValue::Hash(h)) => {
                    Reply::strings(h.iter().flat_map(|(k, v)| [k.clone(), v.clone()]))
                }
                Some(_) => wrong_type(),
                None => Reply::strings(Vec::<String>::new()),
            },
            "HDEL" => update(keyspace, &args[1], None, |value| {
                let KvValue::Hash(hash) = value else {
                    return wrong_type();
                };
                count(args[2..].iter().filter(|f| hash.remove(*f).is_some()).count())
            }),
            "HLEN" => match keyspace.get(&args[1]).as_deref() {
                Some(KvValue::Hash(h)) => count(h.len()),
                Some(_) => wrong_type(),
                None => Reply::Integer(0),
            },

            // Lists
            "RPUSH" => update(keyspace, &args[1], Some(KvValue::List(Vec::new())), |value| {
                let KvValue::List(list) = value else {
                    return wrong_type();
                };
                list.extend(args[2..].iter().cloned());
                count(list.len())
            }),
            "LRANGE" => {
                let (Ok(start), Ok(stop)) = (args[2].parse::<i64>(), args[3].parse::<i64>()) else {
                    return not_an_integer();
                };
                match keyspace.get(&args[1]).as_deref() {
                    Some(KvValue::List(l)) => {
                        let (from, to) = range_bounds(l.len(), start, stop);
                        Reply::strings(l[from..to].iter().cloned())
                    }
                    Some(_) => wrong_type(),
                    None => Reply::strings(Vec::<String>::new()),
                }
            }
            "LLEN" => match keyspace.get(&args[1]).as_deref() {
                Some(KvValue::List(l)) => count(l.len()),
                Some(_) => wrong_type(),
                None => Reply::Integer(0),
            },
            "LINDEX" => {
                let Ok(index) = args[2].parse::<i64>() else {
                    return not_an_integer();
                };
                match keyspace.get(&args[1]).as_deref() {
                    Some(KvValue::List(l)) => resolve_index(l.len(), index)
                        .map_or_else(Reply::nil, |i| Reply::bulk(l[i].clone())),
                    Some(_) => wrong_type(),
                    None => Reply::nil(),
                }
            }
            "LSET" => {
                let Ok(index) = args[2].parse::<i64>() else {
                    return not_an_integer();
                };
                if !keyspace.contains_key(&args[1]) {
                    return Reply::error("ERR no such key");
                }
                update(keyspace, &args[1], None, |value| {
                    let KvValue::List(list) = value else {
                        return wrong_type();
                    };
                    match resolve_index(list.len(), index) {
                        Some(i) => {
                            list[i] = args[3].clone();
                            Reply::ok()
                        }
                        None => Reply::error("ERR index out of range"),
                    }
                })
            }
            "LREM" => {
                let Ok(limit) = args[2].parse::<i64>() else {
                    return not_an_integer();
                };
                update(keyspace, &args[1], None, |value| {
                    let KvValue::List(list) = value else {
                        return wrong_type();
                    };
                    count(remove_occurrences(list, &args[3], limit))
                })
            }

            // Sets
            "SADD" => update(keyspace, &args[1], Some(KvValue::Set(HashSet::new())), |value| {
                let KvValue::Set(set) = value else {
                    return wrong_type();
                };
                count(args[2..].iter().filter(|m| set.insert((*m).clone())).count())
            }),
            "SREM" => update(keyspace, &args[1], None, |value| {
                let KvValue::Set(set) = value else {
                    return wrong_type();
                };
                count(args[2..].iter().filter(|m| set.remove(*m)).count())
            }),
            "SMEMBERS" => match keyspace.get(&args[1]).as_deref() {
                Some(KvValue::Set(s)) => Reply::strings(s.iter().cloned()),
                Some(_) => wrong_type(),
                None => Reply::strings(Vec::<String>::new()),
            },
            "SCARD" => match keyspace.get(&args[1]).as_deref() {
                Some(KvValue::Set(s)) => count(s.len()),
                Some(_) => wrong_type(),
                None => Reply::Integer(0),
            },

            // Sorted sets
            "ZADD" => zadd(keyspace, &args[1], &args[2..]),
            "ZRANGE" => {
                let (Ok(start), Ok(stop)) = (args[2].parse::<i64>(), args[3].parse::<i64>()) else {
                    return not_an_integer();
                };
                let with_scores = args.get(4).is_some_and(|a| a.eq_ignore_ascii_case("WITHSCORES"));
                match keyspace.get(&args[1]).as_deref() {
                    Some(KvValue::SortedSet(z)) => {
                        let (from, to) = range_bounds(z.len(), start, stop);
                        Reply::strings(z[from..to].iter().flat_map(|(score, member)| {
                            let mut out = vec![member.clone()];
                            if with_scores {
                                out.push(score.to_string());
                            }
                            out
                        }))
                    }
                    Some(_) => wrong_type(),
                    None => Reply::strings(Vec::<String>::new()),
                }
            }
            "ZREM" => update(keyspace, &args[1], None, |value| {
                let KvValue::SortedSet(zset) = value else {
                    return wrong_type();
                };
                let before = zset.len();
                zset.retain(|(_, m)| !args[2..].contains(m));
                count(before - zset.len())
            }),
            "ZCARD" => match keyspace.get(&args[1]).as_deref() {
                Some(KvValue::SortedSet(z)) => count(z.len()),
                Some(_) => wrong_type(),
                None => Reply::Integer(0),
            },
            _ => Reply::error(format!("ERR unknown command '{}'", name)),
        }
    }
}

/// `ZADD key [XX|NX] score member [score member ...]`
fn zadd(keyspace: &Keyspace, key: &str, rest: &[String]) -> Reply {
    let mut xx = false;
    let mut nx = false;
    let mut pos = 0;
    while let Some(flag) = rest.get(pos) {
        match flag.to_uppercase().as_str() {
            "XX" => xx = true,
            "NX" => nx = true,
            _ => break,
        }
        pos += 1;
    }
    let pairs = &rest[pos..];
    if pairs.is_empty() || pairs.len() % 2 != 0 {
        return Reply::error("ERR syntax error");
    }
    if xx && nx {
        return Reply::error("ERR XX and NX options at the same time are not compatible");
    }
    let mut parsed = Vec::with_capacity(pairs.len() / 2);
    for pair in pairs.chunks(2) {
        match pair[0].parse::<f64>() {
            Ok(score) if !score.is_nan() => parsed.push((score, pair[1].clone())),
            _ => return Reply::error("ERR value is not a valid float"),
        }
    }

    update(keyspace, key, Some(KvValue::SortedSet(Vec::new())), |value| {
        let KvValue::SortedSet(zset) = value else {
            return wrong_type();
        };
        let mut added = 0;
        for (score, member) in parsed {
            let existing = zset.iter().position(|(_, m)| *m == member);
            match existing {
                Some(i) if !nx => zset[i].0 = score,
                None if !xx => {
                    zset.push((score, member));
                    added += 1;
                }
                _ => {}
            }
        }
        zset.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        count(added)
    })
}

/// Applies `op` to the value at `key`, creating it with `init` when missing.
/// Aggregates left empty are removed, as a server does.
fn update<F>(keyspace: &Keyspace, key: &str, init: Option<KvValue>, op: F) -> Reply
where
    F: FnOnce(&mut KvValue) -> Reply,
{
    let reply = match init {
        Some(init) => {
            let mut entry = keyspace.entry(key.to_string()).or_insert(init);
            op(entry.value_mut())
        }
        None => match keyspace.get_mut(key) {
            Some(mut entry) => op(entry.value_mut()),
            None => Reply::Integer(0),
        },
    };
    keyspace.remove_if(key, |_, v| v.is_empty());
    reply
}

/// Inclusive `start..=stop` with negative offsets from the end, as a
/// half-open slice range clamped to `len`
fn range_bounds(len: usize, start: i64, stop: i64) -> (usize, usize) {
    let len_i = i64::try_from(len).unwrap_or(i64::MAX);
    let start = if start < 0 { (len_i + start).max(0) } else { start };
    let stop = if stop < 0 { len_i + stop } else { stop.min(len_i - 1) };
    if start > stop || start >= len_i {
        return (0, 0);
    }
    let from = usize::try_from(start).unwrap_or(len);
    let to = usize::try_from(stop + 1).unwrap_or(len);
    (from, to)
}

fn resolve_index(len: usize, index: i64) -> Option<usize> {
    let len_i = i64::try_from(len).ok()?;
    let index = if index < 0 { len_i + index } else { index };
    if (0..len_i).contains(&index) {
        usize::try_from(index).ok()
    } else {
        None
    }
}

/// `LREM` semantics: positive `limit` removes from the head, negative from
/// the tail, zero removes every occurrence
fn remove_occurrences(list: &mut Vec<String>, value: &str, limit: i64) -> usize {
    let max = if limit == 0 {
        usize::MAX
    } else {
        usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX)
    };
    let mut positions: Vec<usize> = list
        .iter()
        .enumerate()
        .filter(|(_, v)| v.as_str() == value)
        .map(|(i, _)| i)
        .collect();
    if limit < 0 {
        positions.reverse();
    }
    positions.truncate(max);
    positions.sort_unstable();
    for i in positions.iter().rev() {
        list.remove(*i);
    }
    positions.len()
}

/// Glob matching for `KEYS`: `*` and `?` wildcards
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}

/// Hands out connections to a shared [`MemoryStore`]
#[derive(Clone, Default)]
pub struct MemoryConnector {
    store: Arc<MemoryStore>,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Conn = MemoryConnection;

    async fn connect(&self, target: &ConnectTarget) -> Result<MemoryConnection> {
        if !self.store.reachable.load(Ordering::SeqCst) {
            return Err(Error::ConnectionFailed(format!("{} is unreachable", target.addr())));
        }
        self.store.open_connections.fetch_add(1, Ordering::SeqCst);
        debug!(addr = %target.addr(), tls = target.tls.is_some(), "Opened in-memory connection");
        Ok(MemoryConnection {
            store: Arc::clone(&self.store),
            db: 0,
            authenticated: self.store.password.is_none(),
        })
    }
}

/// Connection to a [`MemoryStore`] with its own selected database
pub struct MemoryConnection {
    store: Arc<MemoryStore>,
    db: usize,
    authenticated: bool,
}

impl MemoryConnection {
    fn dispatch(&mut self, cmd: &Cmd) -> Reply {
        // the store holds text only
        let Ok(args) = cmd
            .as_args()
            .iter()
            .map(|arg| String::from_utf8(arg.to_vec()))
            .collect::<std::result::Result<Vec<String>, _>>()
        else {
            return Reply::error("ERR argument is not valid UTF-8");
        };
        let args = args.as_slice();
        match cmd.name().to_uppercase().as_str() {
            "AUTH" => {
                let Some(password) = args.last().filter(|_| (2..=3).contains(&args.len())) else {
                    return wrong_arity("AUTH");
                };
                match &self.store.password {
                    None => Reply::error(
                        "ERR AUTH <password> called without any password configured for the default user",
                    ),
                    Some(expected) if expected == password => {
                        self.authenticated = true;
                        Reply::ok()
                    }
                    Some(_) => Reply::error(
                        "WRONGPASS invalid username-password pair or user is disabled.",
                    ),
                }
            }
            _ if !self.authenticated => Reply::error("NOAUTH Authentication required."),
            "SELECT" => match args.get(1).and_then(|a| a.parse::<usize>().ok()) {
                Some(db) if db < self.store.databases.len() => {
                    self.db = db;
                    Reply::ok()
                }
                Some(_) => Reply::error("ERR DB index is out of range"),
                None => not_an_integer(),
            },
            _ => self.store.execute(self.db, args),
        }
    }
}

#[async_trait]
impl KvConnection for MemoryConnection {
    async fn query(&mut self, cmd: &Cmd) -> Result<Reply> {
        self.store.round_trips.fetch_add(1, Ordering::SeqCst);
        self.dispatch(cmd).into_result()
    }

    async fn pipeline(&mut self, cmds: &[Cmd]) -> Result<Vec<Reply>> {
        self.store.round_trips.fetch_add(1, Ordering::SeqCst);
        Ok(cmds.iter().map(|cmd| self.dispatch(cmd)).collect())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.store.open_connections.fetch_sub(1, Ordering::SeqCst);
    }
}
