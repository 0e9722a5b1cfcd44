use std::collections::HashMap;
use std::fmt;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::time;
use tracing::{info, warn};
use crate::config::{Config, Endpoint};
use crate::connection::Connection;
use crate::error::Error;
use crate::parser::Parse;
use crate::encoder::format_double;
use crate::resp::Type;
use crate::store::Store;

/// A `Store` backed by a Redis-compatible server over RESP.
#[derive(Debug)]
pub struct RemoteStore {
    con: Connection,
}

/// What the startup banner reports about the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerInfo {
    pub version: Option<String>,
    pub mode: String,
    pub os: Option<String>,
    pub used_memory_human: Option<String>,
    pub connected_clients: Option<u64>,
    pub keys: u64,
}

/// Builder for a command frame.
struct Cmd(Vec<Bytes>);

impl Cmd {
    fn new(name: &'static str) -> Cmd {
        Cmd(vec![Bytes::from_static(name.as_bytes())])
    }

    fn arg(mut self, arg: impl AsRef<[u8]>) -> Cmd {
        self.0.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    fn frame(self) -> Type {
        Type::command(self.0)
    }
}

impl RemoteStore {
    pub fn new(con: Connection) -> RemoteStore {
        RemoteStore { con }
    }

    /// Open a session: connect, authenticate, select the database and probe
    /// with `PING`. Transport failures are retried with back-off; a rejected
    /// handshake is not.
    pub async fn connect(config: &Config) -> crate::Result<RemoteStore> {
        let endpoint = config.endpoint()?;
        let attempts = config.connect_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match RemoteStore::open(&endpoint, config).await {
                Ok(store) => {
                    info!(addr = %endpoint.addr(), db = endpoint.db, "connected to store");
                    return Ok(store);
                }
                Err(e) if e.is_fatal() && attempt < attempts => {
                    let delay = Config::retry_delay(attempt);
                    warn!(attempt, error = %e, ?delay, "connection attempt failed, retrying");
                    time::sleep(delay).await;
                }
                Err(Error::Server(msg)) => {
                    return Err(Error::Connection(format!("handshake rejected: {}", msg)));
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn open(endpoint: &Endpoint, config: &Config) -> crate::Result<RemoteStore> {
        let con = Connection::connect(&endpoint.addr(), config.connect_timeout, config.command_timeout).await?;
        let mut store = RemoteStore::new(con);
        if let Some(password) = &endpoint.password {
            let auth = match &endpoint.username {
                Some(user) => Cmd::new("AUTH").arg(user).arg(password),
                None => Cmd::new("AUTH").arg(password),
            };
            store.call_ok(auth).await?;
        }
        if endpoint.db != 0 {
            store.call_ok(Cmd::new("SELECT").arg(endpoint.db.to_string())).await?;
        }
        store.ping().await?;
        Ok(store)
    }

    pub async fn ping(&mut self) -> crate::Result<()> {
        match self.call(Cmd::new("PING")).await? {
            reply if reply == "PONG" => Ok(()),
            reply => Err(Error::Protocol(format!("unexpected PING reply `{}`", reply))),
        }
    }

    pub async fn server_info(&mut self, db: u32) -> crate::Result<ServerInfo> {
        let text = bulk_string(self.call(Cmd::new("INFO")).await?)?.unwrap_or_default();
        Ok(ServerInfo::parse(&text, db))
    }

    async fn call(&mut self, cmd: Cmd) -> crate::Result<Type> {
        self.con.request(&cmd.frame()).await
    }

    async fn call_ok(&mut self, cmd: Cmd) -> crate::Result<()> {
        match self.call(cmd).await? {
            reply if reply == "OK" => Ok(()),
            reply => Err(Error::Protocol(format!("expected OK, got `{}`", reply))),
        }
    }
}

fn integer(reply: Type) -> crate::Result<i64> {
    match reply {
        Type::Integer(i) => Ok(i),
        reply => Err(Error::Protocol(format!("expected integer, got {:?}", reply))),
    }
}

fn bulk_string(reply: Type) -> crate::Result<Option<String>> {
    match reply {
        Type::Null => Ok(None),
        Type::SimpleString(s) => Ok(Some(s)),
        Type::BulkString(data) => String::from_utf8(data.to_vec())
            .map(Some)
            .map_err(|_| Error::Protocol("value is not valid UTF-8".into())),
        reply => Err(Error::Protocol(format!("expected bulk string, got {:?}", reply))),
    }
}

fn strings(parse: &mut Parse) -> crate::Result<Vec<String>> {
    let mut out = Vec::with_capacity(parse.remaining());
    while parse.remaining() > 0 {
        out.push(parse.next_string()?);
    }
    Ok(out)
}

#[async_trait]
impl Store for RemoteStore {
    async fn scan(&mut self, cursor: u64, pattern: &str, count: usize) -> crate::Result<(u64, Vec<String>)> {
        let cmd = Cmd::new("SCAN")
            .arg(cursor.to_string())
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count.to_string());
        let mut parse = Parse::new(self.call(cmd).await?)?;
        let next = parse.next_int()?;
        let keys = strings(&mut parse.next_array()?)?;
        parse.finish()?;
        Ok((next, keys))
    }

    async fn key_type(&mut self, key: &str) -> crate::Result<String> {
        let reply = self.call(Cmd::new("TYPE").arg(key)).await?;
        Ok(bulk_string(reply)?.unwrap_or_else(|| "none".to_string()))
    }

    async fn get(&mut self, key: &str) -> crate::Result<Option<String>> {
        bulk_string(self.call(Cmd::new("GET").arg(key)).await?)
    }

    async fn hgetall(&mut self, key: &str) -> crate::Result<Vec<(String, String)>> {
        let mut parse = Parse::new(self.call(Cmd::new("HGETALL").arg(key)).await?)?;
        let mut fields = Vec::with_capacity(parse.remaining() / 2);
        while parse.remaining() > 0 {
            let field = parse.next_string()?;
            let value = parse.next_string()?;
            fields.push((field, value));
        }
        Ok(fields)
    }

    async fn lrange_all(&mut self, key: &str) -> crate::Result<Vec<String>> {
        let reply = self.call(Cmd::new("LRANGE").arg(key).arg("0").arg("-1")).await?;
        strings(&mut Parse::new(reply)?)
    }

    async fn smembers(&mut self, key: &str) -> crate::Result<Vec<String>> {
        let reply = self.call(Cmd::new("SMEMBERS").arg(key)).await?;
        strings(&mut Parse::new(reply)?)
    }

    async fn zrange_withscores(&mut self, key: &str) -> crate::Result<Vec<(String, f64)>> {
        let cmd = Cmd::new("ZRANGE").arg(key).arg("0").arg("-1").arg("WITHSCORES");
        let mut parse = Parse::new(self.call(cmd).await?)?;
        let mut members = Vec::with_capacity(parse.remaining() / 2);
        while parse.remaining() > 0 {
            let member = parse.next_string()?;
            let score = parse.next_double()?;
            members.push((member, score));
        }
        Ok(members)
    }

    async fn ttl(&mut self, key: &str) -> crate::Result<i64> {
        integer(self.call(Cmd::new("TTL").arg(key)).await?)
    }

    async fn del(&mut self, key: &str) -> crate::Result<bool> {
        Ok(integer(self.call(Cmd::new("DEL").arg(key)).await?)? > 0)
    }

    async fn set(&mut self, key: &str, value: &str) -> crate::Result<()> {
        self.call_ok(Cmd::new("SET").arg(key).arg(value)).await
    }

    async fn hset(&mut self, key: &str, fields: &[(String, String)]) -> crate::Result<()> {
        let mut cmd = Cmd::new("HSET").arg(key);
        for (field, value) in fields {
            cmd = cmd.arg(field).arg(value);
        }
        integer(self.call(cmd).await?).map(|_| ())
    }

    async fn rpush(&mut self, key: &str, items: &[String]) -> crate::Result<()> {
        let mut cmd = Cmd::new("RPUSH").arg(key);
        for item in items {
            cmd = cmd.arg(item);
        }
        integer(self.call(cmd).await?).map(|_| ())
    }

    async fn sadd(&mut self, key: &str, members: &[String]) -> crate::Result<()> {
        let mut cmd = Cmd::new("SADD").arg(key);
        for member in members {
            cmd = cmd.arg(member);
        }
        integer(self.call(cmd).await?).map(|_| ())
    }

    async fn zadd(&mut self, key: &str, members: &[(String, f64)]) -> crate::Result<()> {
        let mut cmd = Cmd::new("ZADD").arg(key);
        for (member, score) in members {
            cmd = cmd.arg(format_double(*score)).arg(member);
        }
        integer(self.call(cmd).await?).map(|_| ())
    }

    async fn expire(&mut self, key: &str, seconds: u64) -> crate::Result<bool> {
        Ok(integer(self.call(Cmd::new("EXPIRE").arg(key).arg(seconds.to_string())).await?)? == 1)
    }
}

impl ServerInfo {
    /// Parse an `INFO` reply. `db` selects which keyspace line to count.
    pub fn parse(text: &str, db: u32) -> ServerInfo {
        let fields: HashMap<&str, &str> = text
            .lines()
            .filter(|line| !line.starts_with('#'))
            .filter_map(|line| line.trim_end().split_once(':'))
            .collect();
        let keys = fields
            .get(format!("db{}", db).as_str())
            .and_then(|stats| {
                stats
                    .split(',')
                    .find_map(|kv| kv.strip_prefix("keys="))
                    .and_then(|n| n.parse().ok())
            })
            .unwrap_or(0);
        ServerInfo {
            version: fields.get("redis_version").map(|s| s.to_string()),
            mode: fields.get("redis_mode").unwrap_or(&"standalone").to_string(),
            os: fields.get("os").map(|s| s.to_string()),
            used_memory_human: fields.get("used_memory_human").map(|s| s.to_string()),
            connected_clients: fields.get("connected_clients").and_then(|s| s.parse().ok()),
            keys,
        }
    }
}

impl fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "version {} ({}), os {}, memory {}, clients {}, keys {}",
            self.version.as_deref().unwrap_or("?"),
            self.mode,
            self.os.as_deref().unwrap_or("?"),
            self.used_memory_human.as_deref().unwrap_or("?"),
            self.connected_clients.map(|c| c.to_string()).unwrap_or_else(|| "?".into()),
            self.keys,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_info() {
        let text = "# Server\r\nredis_version:7.2.4\r\nredis_mode:standalone\r\nos:Linux 6.1\r\n\
                    # Clients\r\nconnected_clients:3\r\n# Memory\r\nused_memory_human:1.02M\r\n\
                    # Keyspace\r\ndb0:keys=12,expires=2,avg_ttl=0\r\ndb2:keys=5,expires=0,avg_ttl=0\r\n";
        let info = ServerInfo::parse(text, 2);
        assert_eq!(info.version.as_deref(), Some("7.2.4"));
        assert_eq!(info.os.as_deref(), Some("Linux 6.1"));
        assert_eq!(info.connected_clients, Some(3));
        assert_eq!(info.used_memory_human.as_deref(), Some("1.02M"));
        assert_eq!(info.keys, 5);
        assert_eq!(ServerInfo::parse(text, 0).keys, 12);
        assert_eq!(ServerInfo::parse(text, 9).keys, 0);
    }

    #[test]
    fn command_frame() {
        let frame = Cmd::new("ZADD").arg("rank").arg("1").arg("a").frame();
        assert_eq!(frame, Type::command(["ZADD", "rank", "1", "a"]));
    }
}
