//! Line parsing and dispatch for the REPL: each input line becomes a verb
//! plus byte-string arguments, routed either straight at the `Database`
//! facade or, while a transaction is open, at the pending `Transaction`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use kv::{Database, IsolationLevel, Transaction};

pub struct Session {
    db: Arc<Database>,
    txn: Option<Transaction>,
}

impl Session {
    pub fn new(db: Arc<Database>) -> Self {
        Session { db, txn: None }
    }

    pub fn in_transaction(&self) -> bool {
        self.txn.is_some()
    }

    pub fn dispatch(&mut self, line: &str) -> Result<String> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or_else(|| anyhow!("empty command"))?.to_ascii_lowercase();
        let args: Vec<&str> = parts.collect();

        match verb.as_str() {
            "help" => Ok(HELP.to_string()),

            "begin" => self.begin(&args),
            "commit" => self.commit(),
            "rollback" => self.rollback(),

            "get" => self.get(&args),
            "set" => self.set(&args),
            "del" => self.del(&args),
            "exists" => self.exists(&args),
            "expire" => self.expire(&args),
            "persist" => self.persist(&args),
            "incr" => self.incr(&args),
            "decr" => self.decr(&args),

            "hset" => self.hset(&args),
            "hget" => self.hget(&args),
            "hdel" => self.hdel(&args),
            "hgetall" => self.hgetall(&args),
            "hlen" => self.hlen(&args),

            "sadd" => self.sadd(&args),
            "srem" => self.srem(&args),
            "smembers" => self.smembers(&args),
            "sismember" => self.sismember(&args),

            "lpush" => self.lpush(&args),
            "rpush" => self.rpush(&args),
            "lpop" => self.lpop(&args),
            "rpop" => self.rpop(&args),
            "llen" => self.llen(&args),

            "merge" => {
                self.db.merge()?;
                Ok("OK".to_string())
            }

            other => bail!("unknown command '{}', type 'help' for a list", other),
        }
    }

    fn begin(&mut self, args: &[&str]) -> Result<String> {
        if self.txn.is_some() {
            bail!("a transaction is already open");
        }
        let isolation = match args.first().map(|s| s.to_ascii_lowercase()).as_deref() {
            None | Some("read-committed") => IsolationLevel::ReadCommitted,
            Some("serializable") => IsolationLevel::Serializable,
            Some(other) => bail!("unknown isolation level '{}'", other),
        };
        self.txn = Some(self.db.begin(false, isolation)?);
        Ok("OK".to_string())
    }

    fn commit(&mut self) -> Result<String> {
        let txn = self.txn.take().ok_or_else(|| anyhow!("no transaction open"))?;
        txn.commit()?;
        Ok("OK".to_string())
    }

    fn rollback(&mut self) -> Result<String> {
        let txn = self.txn.take().ok_or_else(|| anyhow!("no transaction open"))?;
        txn.rollback();
        Ok("OK".to_string())
    }

    fn get(&self, args: &[&str]) -> Result<String> {
        let key = arg(args, 0, "get <key>")?;
        let value = match &self.txn {
            Some(txn) => txn.get(key.as_bytes()),
            None => self.db.get(key.as_bytes()),
        }?;
        Ok(display_bytes(&value))
    }

    fn set(&mut self, args: &[&str]) -> Result<String> {
        let key = arg(args, 0, "set <key> <value>")?;
        let value = args.get(1).ok_or_else(|| anyhow!("usage: set <key> <value>"))?;
        match &mut self.txn {
            Some(txn) => txn.set(key.as_bytes(), value.as_bytes())?,
            None => self.db.put(key.as_bytes(), value.as_bytes())?,
        }
        Ok("OK".to_string())
    }

    fn del(&mut self, args: &[&str]) -> Result<String> {
        let key = arg(args, 0, "del <key>")?;
        match &mut self.txn {
            Some(txn) => txn.del(key.as_bytes())?,
            None => self.db.del(key.as_bytes())?,
        }
        Ok("OK".to_string())
    }

    fn exists(&self, args: &[&str]) -> Result<String> {
        let key = arg(args, 0, "exists <key>")?;
        let exists = match &self.txn {
            Some(txn) => txn.exists(key.as_bytes()),
            None => self.db.exists(key.as_bytes()),
        };
        Ok(exists.to_string())
    }

    fn expire(&self, args: &[&str]) -> Result<String> {
        let key = arg(args, 0, "expire <key> <seconds>")?;
        let seconds: u64 = args.get(1).ok_or_else(|| anyhow!("usage: expire <key> <seconds>"))?.parse()?;
        let value = self.db.get(key.as_bytes())?;
        self.db.put_with_ttl(key.as_bytes(), &value, Duration::from_secs(seconds))?;
        Ok("OK".to_string())
    }

    fn persist(&self, args: &[&str]) -> Result<String> {
        let key = arg(args, 0, "persist <key>")?;
        self.db.persist(key.as_bytes());
        Ok("OK".to_string())
    }

    fn incr(&self, args: &[&str]) -> Result<String> {
        let key = arg(args, 0, "incr <key>")?;
        Ok(self.db.incr(key.as_bytes())?.to_string())
    }

    fn decr(&self, args: &[&str]) -> Result<String> {
        let key = arg(args, 0, "decr <key>")?;
        Ok(self.db.decr(key.as_bytes())?.to_string())
    }

    fn hset(&mut self, args: &[&str]) -> Result<String> {
        let (key, field) = (arg(args, 0, "hset <key> <field> <value>")?, arg(args, 1, "hset <key> <field> <value>")?);
        let value = args.get(2).ok_or_else(|| anyhow!("usage: hset <key> <field> <value>"))?;
        match &mut self.txn {
            Some(txn) => txn.hash_set(key.as_bytes(), field.as_bytes(), value.as_bytes())?,
            None => self.db.hash_set(key.as_bytes(), field.as_bytes(), value.as_bytes())?,
        }
        Ok("OK".to_string())
    }

    fn hget(&self, args: &[&str]) -> Result<String> {
        let (key, field) = (arg(args, 0, "hget <key> <field>")?, arg(args, 1, "hget <key> <field>")?);
        let value = match &self.txn {
            Some(txn) => txn.hash_get(key.as_bytes(), field.as_bytes()),
            None => self.db.hash_get(key.as_bytes(), field.as_bytes()),
        }?;
        Ok(display_bytes(&value))
    }

    fn hdel(&mut self, args: &[&str]) -> Result<String> {
        let (key, field) = (arg(args, 0, "hdel <key> <field>")?, arg(args, 1, "hdel <key> <field>")?);
        match &mut self.txn {
            Some(txn) => txn.hash_del(key.as_bytes(), field.as_bytes())?,
            None => self.db.hash_del(key.as_bytes(), field.as_bytes())?,
        }
        Ok("OK".to_string())
    }

    fn hgetall(&self, args: &[&str]) -> Result<String> {
        let key = arg(args, 0, "hgetall <key>")?;
        let (fields, values) = match &self.txn {
            Some(txn) => txn.hash_get_all(key.as_bytes()),
            None => self.db.hash_get_all(key.as_bytes()),
        }?;
        let pairs: Vec<String> =
            fields.iter().zip(values.iter()).map(|(f, v)| format!("{} => {}", display_bytes(f), display_bytes(v))).collect();
        Ok(pairs.join("\n"))
    }

    fn hlen(&self, args: &[&str]) -> Result<String> {
        let key = arg(args, 0, "hlen <key>")?;
        let len = match &self.txn {
            Some(txn) => txn.hash_len(key.as_bytes()),
            None => self.db.hash_len(key.as_bytes()),
        }?;
        Ok(len.to_string())
    }

    fn sadd(&mut self, args: &[&str]) -> Result<String> {
        let key = arg(args, 0, "sadd <key> <member>...")?;
        let members = to_vecs(&args[1..]);
        match &mut self.txn {
            Some(txn) => txn.set_add(key.as_bytes(), &members)?,
            None => self.db.set_add(key.as_bytes(), &members)?,
        }
        Ok("OK".to_string())
    }

    fn srem(&mut self, args: &[&str]) -> Result<String> {
        let key = arg(args, 0, "srem <key> <member>...")?;
        let members = to_vecs(&args[1..]);
        match &mut self.txn {
            Some(txn) => txn.set_rem(key.as_bytes(), &members)?,
            None => self.db.set_rem(key.as_bytes(), &members)?,
        }
        Ok("OK".to_string())
    }

    fn smembers(&self, args: &[&str]) -> Result<String> {
        let key = arg(args, 0, "smembers <key>")?;
        let members = match &self.txn {
            Some(txn) => txn.set_members(key.as_bytes()),
            None => self.db.set_members(key.as_bytes()),
        }?;
        Ok(members.iter().map(|m| display_bytes(m)).collect::<Vec<_>>().join("\n"))
    }

    fn sismember(&self, args: &[&str]) -> Result<String> {
        let (key, member) = (arg(args, 0, "sismember <key> <member>")?, arg(args, 1, "sismember <key> <member>")?);
        let is_member = match &self.txn {
            Some(txn) => txn.set_is_member(key.as_bytes(), member.as_bytes()),
            None => self.db.set_is_member(key.as_bytes(), member.as_bytes()),
        };
        Ok(is_member.to_string())
    }

    fn lpush(&mut self, args: &[&str]) -> Result<String> {
        let key = arg(args, 0, "lpush <key> <value>...")?;
        let values = to_vecs(&args[1..]);
        match &mut self.txn {
            Some(txn) => txn.l_push(key.as_bytes(), &values)?,
            None => self.db.l_push(key.as_bytes(), &values)?,
        }
        Ok("OK".to_string())
    }

    fn rpush(&mut self, args: &[&str]) -> Result<String> {
        let key = arg(args, 0, "rpush <key> <value>...")?;
        let values = to_vecs(&args[1..]);
        match &mut self.txn {
            Some(txn) => txn.r_push(key.as_bytes(), &values)?,
            None => self.db.r_push(key.as_bytes(), &values)?,
        }
        Ok("OK".to_string())
    }

    fn lpop(&mut self, args: &[&str]) -> Result<String> {
        let key = arg(args, 0, "lpop <key>")?;
        let value = match &mut self.txn {
            Some(txn) => txn.l_pop(key.as_bytes()),
            None => self.db.l_pop(key.as_bytes()),
        }?;
        Ok(display_bytes(&value))
    }

    fn rpop(&mut self, args: &[&str]) -> Result<String> {
        let key = arg(args, 0, "rpop <key>")?;
        let value = match &mut self.txn {
            Some(txn) => txn.r_pop(key.as_bytes()),
            None => self.db.r_pop(key.as_bytes()),
        }?;
        Ok(display_bytes(&value))
    }

    fn llen(&self, args: &[&str]) -> Result<String> {
        let key = arg(args, 0, "llen <key>")?;
        let len = match &self.txn {
            Some(txn) => txn.l_len(key.as_bytes()),
            None => self.db.l_len(key.as_bytes()),
        }?;
        Ok(len.to_string())
    }
}

fn arg<'a>(args: &[&'a str], index: usize, usage: &str) -> Result<&'a str> {
    args.get(index).copied().ok_or_else(|| anyhow!("usage: {}", usage))
}

fn to_vecs(args: &[&str]) -> Vec<Vec<u8>> {
    args.iter().map(|s| s.as_bytes().to_vec()).collect()
}

fn display_bytes(bytes: &[u8]) -> String {
    String::from_utf8(bytes.to_vec()).unwrap_or_else(|_| format!("{:?}", bytes))
}

const HELP: &str = "\
string:    get <key> | set <key> <value> | del <key> | exists <key>
           expire <key> <seconds> | persist <key> | incr <key> | decr <key>
hash:      hset <key> <field> <value> | hget <key> <field> | hdel <key> <field>
           hgetall <key> | hlen <key>
set:       sadd <key> <member...> | srem <key> <member...> | smembers <key>
           sismember <key> <member>
list:      lpush <key> <value...> | rpush <key> <value...> | lpop <key>
           rpop <key> | llen <key>
txn:       begin [serializable|read-committed] | commit | rollback
other:     merge | help | exit";

#[cfg(test)]
mod tests {
    use super::*;
    use kv::Options;
    use tempfile::tempdir;

    fn session() -> (tempfile::TempDir, Session) {
        let dir = tempdir().unwrap();
        let mut options = Options::default();
        options.dir_path = dir.path().to_path_buf();
        let db = Database::open(options).unwrap();
        (dir, Session::new(db))
    }

    #[test]
    fn set_then_get() {
        let (_dir, mut session) = session();
        assert_eq!(session.dispatch("set a 1").unwrap(), "OK");
        assert_eq!(session.dispatch("get a").unwrap(), "1");
    }

    #[test]
    fn unknown_command_is_an_error() {
        let (_dir, mut session) = session();
        assert!(session.dispatch("frobnicate a").is_err());
    }

    #[test]
    fn transaction_is_isolated_until_commit() {
        let (_dir, mut session) = session();
        assert_eq!(session.dispatch("begin").unwrap(), "OK");
        assert!(session.in_transaction());
        assert_eq!(session.dispatch("set a 1").unwrap(), "OK");
        assert_eq!(session.dispatch("commit").unwrap(), "OK");
        assert!(!session.in_transaction());
        assert_eq!(session.dispatch("get a").unwrap(), "1");
    }

    #[test]
    fn rolled_back_transaction_leaves_no_trace() {
        let (_dir, mut session) = session();
        session.dispatch("begin").unwrap();
        session.dispatch("set a 1").unwrap();
        session.dispatch("rollback").unwrap();
        assert!(session.dispatch("get a").is_err());
    }

    #[test]
    fn hash_and_set_roundtrip() {
        let (_dir, mut session) = session();
        session.dispatch("hset h f v").unwrap();
        assert_eq!(session.dispatch("hget h f").unwrap(), "v");
        session.dispatch("sadd s a b c").unwrap();
        assert_eq!(session.dispatch("sismember s b").unwrap(), "true");
    }
}
