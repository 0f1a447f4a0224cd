use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use tidings_types::{ChannelIdentity, IdentityKind, LookupKey};

use crate::entry::{LogEntry, sanitize_field};
use crate::error::{Result, StoreError};
use crate::log::{ChangeLog, FileLog, ReplayStats};

type NameKey = (IdentityKind, String);
type ChannelKey = (IdentityKind, i64);

/// Durable routing table for external messaging identities.
///
/// Two indexes (by name, by channel id) plus the durable log sit behind one
/// lock: an upsert evicts stale entries from both indexes, inserts the new
/// record into both, and appends its log line before the lock is released.
/// Readers therefore never see one index updated without the other.
pub struct ChannelStore {
    inner: RwLock<StoreInner>,
}

struct StoreInner {
    by_name: HashMap<NameKey, Arc<ChannelIdentity>>,
    by_channel: HashMap<ChannelKey, Arc<ChannelIdentity>>,
    log: Box<dyn ChangeLog>,
}

/// Index entries touched by one upsert, with the values they replaced.
///
/// Replaying the journal backwards restores the indexes exactly, which is
/// how an upsert is undone when its log append fails.
struct Applied {
    name_key: NameKey,
    channel_key: ChannelKey,
    evicted: usize,
    names: Vec<(NameKey, Option<Arc<ChannelIdentity>>)>,
    channels: Vec<(ChannelKey, Option<Arc<ChannelIdentity>>)>,
}

impl ChannelStore {
    /// Build a store over `log`, replaying it first.
    pub fn open(log: impl ChangeLog + 'static) -> Result<Self> {
        let store = Self {
            inner: RwLock::new(StoreInner {
                by_name: HashMap::new(),
                by_channel: HashMap::new(),
                log: Box::new(log),
            }),
        };
        store.load()?;
        Ok(store)
    }

    /// Open (or create) a file-backed store at `path`.
    pub fn open_file(path: &Path) -> Result<Self> {
        Self::open(FileLog::open(path)?)
    }

    /// Replay the durable log through the same upsert path live traffic uses.
    fn load(&self) -> Result<ReplayStats> {
        let mut guard = self.write()?;
        let inner = &mut *guard;

        let mut changed = 0usize;
        let by_name = &mut inner.by_name;
        let by_channel = &mut inner.by_channel;
        let stats = inner.log.replay(&mut |entry| {
            if apply(by_name, by_channel, entry.into_identity()).is_some() {
                changed += 1;
            }
        })?;

        info!(
            applied = stats.applied,
            skipped = stats.skipped,
            changed,
            identities = inner.by_channel.len(),
            "Channel log replayed"
        );
        Ok(stats)
    }

    /// Insert or replace the user bound to `external_id`.
    ///
    /// Returns `false` (and writes nothing) if the stored record is identical.
    pub fn upsert_user(
        &self,
        external_id: &str,
        display_names: &[String],
        channel_id: i64,
    ) -> Result<bool> {
        let identity = ChannelIdentity::user(
            sanitize_field(external_id),
            display_names.iter().map(|n| sanitize_field(n)).collect(),
            channel_id,
        );
        self.upsert(identity)
    }

    /// Insert or replace the group bound to `channel_id`.
    pub fn upsert_group(
        &self,
        channel_id: i64,
        title: &str,
        invite_link: Option<&str>,
    ) -> Result<bool> {
        let identity = ChannelIdentity::group(
            channel_id,
            sanitize_field(title),
            invite_link.map(sanitize_field).filter(|l| !l.is_empty()),
        );
        self.upsert(identity)
    }

    fn upsert(&self, identity: ChannelIdentity) -> Result<bool> {
        if identity.external_id.is_empty() {
            debug!(channel_id = identity.channel_id, "Ignoring upsert with empty key");
            return Ok(false);
        }

        let mut guard = self.write()?;
        let inner = &mut *guard;

        let entry = LogEntry::from_identity(&identity);
        let Some(applied) = apply(&mut inner.by_name, &mut inner.by_channel, identity) else {
            return Ok(false);
        };

        if let Err(e) = inner.log.append(&entry) {
            rollback(&mut inner.by_name, &mut inner.by_channel, applied);
            return Err(e);
        }

        debug!(
            kind = %applied.name_key.0,
            key = %applied.name_key.1,
            channel_id = applied.channel_key.1,
            evicted = applied.evicted,
            "Channel identity updated"
        );
        Ok(true)
    }

    /// Look up by name or channel id. Users take precedence over groups.
    pub fn lookup(&self, key: impl Into<LookupKey>) -> Result<Option<ChannelIdentity>> {
        let key = key.into();
        let inner = self.read()?;
        Ok([IdentityKind::User, IdentityKind::Group]
            .into_iter()
            .find_map(|kind| find(&inner, kind, &key)))
    }

    pub fn lookup_kind(
        &self,
        kind: IdentityKind,
        key: impl Into<LookupKey>,
    ) -> Result<Option<ChannelIdentity>> {
        let key = key.into();
        let inner = self.read()?;
        Ok(find(&inner, kind, &key))
    }

    /// All current identities, ordered by kind then channel id.
    pub fn identities(&self) -> Result<Vec<ChannelIdentity>> {
        let inner = self.read()?;
        let mut all: Vec<ChannelIdentity> =
            inner.by_channel.values().map(|i| (**i).clone()).collect();
        all.sort_by(|a, b| (a.kind, a.channel_id).cmp(&(b.kind, b.channel_id)));
        Ok(all)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.by_channel.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Rewrite the durable log as one entry per current identity.
    pub fn compact(&self) -> Result<usize> {
        let mut guard = self.write()?;
        let inner = &mut *guard;

        // Records that currently own their name go last, so replaying the
        // compacted log hands each shared group title to the same holder.
        let mut current: Vec<&Arc<ChannelIdentity>> = inner.by_channel.values().collect();
        current.sort_by_key(|i| {
            let holds_name = inner
                .by_name
                .get(&(i.kind, i.external_id.clone()))
                .is_some_and(|holder| Arc::ptr_eq(holder, i));
            (holds_name, i.kind, i.channel_id)
        });
        let entries: Vec<LogEntry> = current.into_iter().map(|i| LogEntry::from_identity(i)).collect();

        inner.log.rewrite(&entries)?;
        info!(entries = entries.len(), "Channel log compacted");
        Ok(entries.len())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreInner>> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreInner>> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }
}

fn find(inner: &StoreInner, kind: IdentityKind, key: &LookupKey) -> Option<ChannelIdentity> {
    let hit = match key {
        LookupKey::Name(name) => inner.by_name.get(&(kind, name.clone())),
        LookupKey::ChannelId(id) => inner.by_channel.get(&(kind, *id)),
    };
    hit.map(|i| (**i).clone())
}

/// Install `identity` in both indexes. Returns `None` when nothing changes.
///
/// A channel id belongs to one record per kind, so whatever held it is
/// evicted. User names are unique as well. Group titles are not: the title
/// entry points at the most recent group to claim it, and older groups with
/// the same title stay reachable by channel id.
fn apply(
    by_name: &mut HashMap<NameKey, Arc<ChannelIdentity>>,
    by_channel: &mut HashMap<ChannelKey, Arc<ChannelIdentity>>,
    identity: ChannelIdentity,
) -> Option<Applied> {
    let name_key = (identity.kind, identity.external_id.clone());
    let channel_key = (identity.kind, identity.channel_id);

    let unchanged = by_name.get(&name_key).is_some_and(|cur| **cur == identity)
        && by_channel.get(&channel_key).is_some_and(|cur| **cur == identity);
    if unchanged {
        return None;
    }

    let mut txn = Txn {
        by_name,
        by_channel,
        names: Vec::new(),
        channels: Vec::new(),
    };
    let mut evicted = 0;

    if let Some(old) = txn.by_channel.get(&channel_key).cloned() {
        txn.set_channel(channel_key, None);
        txn.release_name(&old);
        evicted += 1;
    }
    if identity.kind == IdentityKind::User {
        if let Some(old) = txn.by_name.get(&name_key).cloned() {
            txn.set_name(name_key.clone(), None);
            txn.release_channel(&old);
            evicted += 1;
        }
    }

    let record = Arc::new(identity);
    txn.set_name(name_key.clone(), Some(record.clone()));
    txn.set_channel(channel_key, Some(record));

    Some(Applied {
        name_key,
        channel_key,
        evicted,
        names: txn.names,
        channels: txn.channels,
    })
}

/// Index mutations that remember what they overwrote.
struct Txn<'a> {
    by_name: &'a mut HashMap<NameKey, Arc<ChannelIdentity>>,
    by_channel: &'a mut HashMap<ChannelKey, Arc<ChannelIdentity>>,
    names: Vec<(NameKey, Option<Arc<ChannelIdentity>>)>,
    channels: Vec<(ChannelKey, Option<Arc<ChannelIdentity>>)>,
}

impl Txn<'_> {
    fn set_name(&mut self, key: NameKey, value: Option<Arc<ChannelIdentity>>) {
        let prev = match value {
            Some(record) => self.by_name.insert(key.clone(), record),
            None => self.by_name.remove(&key),
        };
        self.names.push((key, prev));
    }

    fn set_channel(&mut self, key: ChannelKey, value: Option<Arc<ChannelIdentity>>) {
        let prev = match value {
            Some(record) => self.by_channel.insert(key, record),
            None => self.by_channel.remove(&key),
        };
        self.channels.push((key, prev));
    }

    /// Drop `old`'s name entry if it still owns it. A group title then
    /// passes to another group carrying the same title, if any is left.
    fn release_name(&mut self, old: &Arc<ChannelIdentity>) {
        let key = (old.kind, old.external_id.clone());
        if !self.by_name.get(&key).is_some_and(|cur| Arc::ptr_eq(cur, old)) {
            return;
        }
        let heir = match old.kind {
            IdentityKind::Group => self
                .by_channel
                .values()
                .filter(|g| {
                    g.kind == IdentityKind::Group
                        && g.external_id == old.external_id
                        && !Arc::ptr_eq(g, old)
                })
                .max_by_key(|g| g.channel_id)
                .cloned(),
            IdentityKind::User => None,
        };
        self.set_name(key, heir);
    }

    fn release_channel(&mut self, old: &Arc<ChannelIdentity>) {
        let key = (old.kind, old.channel_id);
        if self.by_channel.get(&key).is_some_and(|cur| Arc::ptr_eq(cur, old)) {
            self.set_channel(key, None);
        }
    }
}

/// Undo an `apply` whose log append failed.
fn rollback(
    by_name: &mut HashMap<NameKey, Arc<ChannelIdentity>>,
    by_channel: &mut HashMap<ChannelKey, Arc<ChannelIdentity>>,
    applied: Applied,
) {
    for (key, prev) in applied.names.into_iter().rev() {
        match prev {
            Some(record) => by_name.insert(key, record),
            None => by_name.remove(&key),
        };
    }
    for (key, prev) in applied.channels.into_iter().rev() {
        match prev {
            Some(record) => by_channel.insert(key, record),
            None => by_channel.remove(&key),
        };
    }
}
