//! Durable device snapshots.
//!
//! A sled database with three trees: `devices` (MAC → JSON record) plus
//! the secondary indexes `idx_mac` (ordered MAC scan; its value is the
//! back-pointer into the time index) and `idx_last_seen`
//! (`<rfc3339>\0<mac>` → MAC, supporting last-seen range scans). Every
//! upsert replaces the stale time-index entry for that MAC, so the
//! indexes never drift from the primary tree.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::device::DeviceInfo;
use crate::error::Result;

pub struct SnapshotStore {
    db: sled::Db,
    devices: sled::Tree,
    idx_mac: sled::Tree,
    idx_last_seen: sled::Tree,
}

impl SnapshotStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &str) -> Result<Self> {
        let db = sled::open(path)?;
        let devices = db.open_tree("devices")?;
        let idx_mac = db.open_tree("idx_mac")?;
        let idx_last_seen = db.open_tree("idx_last_seen")?;
        Ok(Self {
            db,
            devices,
            idx_mac,
            idx_last_seen,
        })
    }

    /// Fetch one device snapshot by MAC.
    pub fn get(&self, mac: &str) -> Result<Option<DeviceInfo>> {
        match self.devices.get(mac.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Write one device snapshot, maintaining both secondary indexes.
    pub fn upsert(&self, device: &DeviceInfo) -> Result<()> {
        let key = device.mac.as_bytes();
        let json = serde_json::to_vec(device)?;

        if let Some(old_ts_key) = self.idx_mac.get(key)? {
            self.idx_last_seen.remove(old_ts_key)?;
        }

        let ts_key = Self::time_key(device.last_seen, &device.mac);
        self.devices.insert(key, json)?;
        self.idx_last_seen.insert(ts_key.as_bytes(), key)?;
        self.idx_mac.insert(key, ts_key.as_bytes())?;
        Ok(())
    }

    /// All known MACs in lexicographic order.
    pub fn macs(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for entry in self.idx_mac.iter() {
            let (key, _) = entry?;
            out.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(out)
    }

    /// MACs of devices last seen at or after `since`, oldest first.
    pub fn macs_seen_since(&self, since: DateTime<Utc>) -> Result<Vec<String>> {
        let lower = Self::time_key(since, "");
        let mut out = Vec::new();
        for entry in self.idx_last_seen.range(lower.as_bytes()..) {
            let (_, mac) = entry?;
            out.push(String::from_utf8_lossy(&mac).into_owned());
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Flush all trees to disk. Called once per snapshot tick and at
    /// shutdown.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Nanosecond-precision RFC3339 keys are fixed-width, so the time
    /// index sorts lexicographically in time order.
    fn time_key(ts: DateTime<Utc>, mac: &str) -> String {
        format!(
            "{}\0{}",
            ts.to_rfc3339_opts(SecondsFormat::Nanos, true),
            mac
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn scratch_store() -> (tempfile::TempDir, SnapshotStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path().to_str().unwrap()).unwrap();
        (dir, store)
    }

    fn device(mac: &str, last_seen: DateTime<Utc>) -> DeviceInfo {
        let mut d = DeviceInfo::new(mac.into(), "192.168.0.2".into(), "Unknown".into(), last_seen);
        d.last_seen = last_seen;
        d
    }

    #[test]
    fn upsert_get_round_trip() {
        let (_dir, store) = scratch_store();
        let now = Utc::now();
        let mut d = device("aa:bb:cc:dd:ee:ff", now);
        d.tcp_connections = 7;
        store.upsert(&d).unwrap();

        let back = store.get("aa:bb:cc:dd:ee:ff").unwrap().unwrap();
        assert_eq!(back.mac, "aa:bb:cc:dd:ee:ff");
        assert_eq!(back.tcp_connections, 7);
        assert!(store.get("11:22:33:44:55:66").unwrap().is_none());
    }

    #[test]
    fn mac_index_is_ordered() {
        let (_dir, store) = scratch_store();
        let now = Utc::now();
        for mac in ["cc:00:00:00:00:01", "aa:00:00:00:00:01", "bb:00:00:00:00:01"] {
            store.upsert(&device(mac, now)).unwrap();
        }
        assert_eq!(
            store.macs().unwrap(),
            vec![
                "aa:00:00:00:00:01".to_string(),
                "bb:00:00:00:00:01".to_string(),
                "cc:00:00:00:00:01".to_string(),
            ]
        );
    }

    #[test]
    fn last_seen_index_replaces_stale_entries() {
        let (_dir, store) = scratch_store();
        let old = Utc::now() - Duration::hours(2);
        let recent = Utc::now();

        store.upsert(&device("aa:00:00:00:00:01", old)).unwrap();
        store.upsert(&device("bb:00:00:00:00:02", recent)).unwrap();
        // Re-observe the first device now; its old index entry must go.
        store.upsert(&device("aa:00:00:00:00:01", recent)).unwrap();

        let cutoff = Utc::now() - Duration::hours(1);
        let mut seen = store.macs_seen_since(cutoff).unwrap();
        seen.sort();
        assert_eq!(
            seen,
            vec!["aa:00:00:00:00:01".to_string(), "bb:00:00:00:00:02".to_string()]
        );
        // Two live index entries only: the stale one was removed.
        assert_eq!(store.macs_seen_since(old - Duration::hours(1)).unwrap().len(), 2);
    }

    #[test]
    fn reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap().to_string();
        let now = Utc::now();
        {
            let store = SnapshotStore::open(&path).unwrap();
            store.upsert(&device("aa:bb:cc:dd:ee:ff", now)).unwrap();
            store.flush().unwrap();
        }
        let store = SnapshotStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("aa:bb:cc:dd:ee:ff").unwrap().is_some());
    }
}
