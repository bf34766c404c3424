use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::RwLock;

/// Parsed `/etc/hosts`-style mapping, indexed for the three lookups the
/// synthesizer middleware needs: A, AAAA, and reverse PTR.
#[derive(Debug, Default, Clone)]
pub struct HostsMap {
    by_name_v4: HashMap<String, Vec<Ipv4Addr>>,
    by_name_v6: HashMap<String, Vec<Ipv6Addr>>,
    by_addr: HashMap<String, Vec<String>>,
}

impl HostsMap {
    pub fn parse(content: &str) -> Self {
        let mut map = Self::default();
        for line in content.lines() {
            let line = match line.split('#').next() {
                Some(l) => l.trim(),
                None => continue,
            };
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let Some(addr_str) = parts.next() else { continue };
            let Ok(addr) = addr_str.parse::<IpAddr>() else { continue };
            for name in parts {
                let name = name.to_ascii_lowercase();
                match addr {
                    IpAddr::V4(v4) => map.by_name_v4.entry(name.clone()).or_default().push(v4),
                    IpAddr::V6(v6) => map.by_name_v6.entry(name.clone()).or_default().push(v6),
                }
                map.by_addr.entry(addr_str.to_string()).or_default().push(name);
            }
        }
        map
    }

    /// Returns owned copies; callers must never be handed a reference
    /// into the live map since it can be swapped out mid-request.
    pub fn lookup_v4(&self, name: &str) -> Vec<Ipv4Addr> {
        self.by_name_v4
            .get(&name.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    pub fn lookup_v6(&self, name: &str) -> Vec<Ipv6Addr> {
        self.by_name_v6
            .get(&name.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    pub fn lookup_ptr(&self, addr: &str) -> Vec<String> {
        self.by_addr.get(addr).cloned().unwrap_or_default()
    }

    pub fn has_any(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.by_name_v4.contains_key(&name) || self.by_name_v6.contains_key(&name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    size: u64,
}

/// Owns the live `HostsMap` behind a reader-writer lock and refreshes it
/// whenever the backing file's mtime or size changes, without blocking
/// concurrent lookups while it reparses.
pub struct HostsFile {
    path: PathBuf,
    stamp: std::sync::Mutex<Option<FileStamp>>,
    map: RwLock<std::sync::Arc<HostsMap>>,
}

impl HostsFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            stamp: std::sync::Mutex::new(None),
            map: RwLock::new(std::sync::Arc::new(HostsMap::default())),
        }
    }

    /// Builds a `HostsFile` with no backing path, pre-seeded with `map`.
    /// `refresh_if_stale` is then a permanent no-op since the path is
    /// empty; useful for tests and for an empty/disabled `hostsfile`
    /// configuration that should still answer nothing gracefully.
    pub fn preloaded(map: HostsMap) -> Self {
        Self {
            path: PathBuf::new(),
            stamp: std::sync::Mutex::new(None),
            map: RwLock::new(std::sync::Arc::new(map)),
        }
    }

    fn stat(path: &Path) -> Option<FileStamp> {
        let meta = fs::metadata(path).ok()?;
        Some(FileStamp {
            modified: meta.modified().ok()?,
            size: meta.len(),
        })
    }

    /// Reparses the file if its mtime or size moved since the last
    /// refresh. Cheap no-op otherwise (a single `stat` call).
    pub async fn refresh_if_stale(&self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        let current = Self::stat(&self.path);
        let changed = {
            let mut guard = self.stamp.lock().unwrap();
            let changed = *guard != current;
            *guard = current;
            changed
        };
        if !changed {
            return;
        }
        let Ok(content) = fs::read_to_string(&self.path) else {
            return;
        };
        let parsed = std::sync::Arc::new(HostsMap::parse(&content));
        *self.map.write().await = parsed;
    }

    pub async fn snapshot(&self) -> std::sync::Arc<HostsMap> {
        self.map.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_entries() {
        let map = HostsMap::parse("127.0.0.1 localhost\n::1 localhost\n10.0.0.5 thor # comment\n");
        assert_eq!(map.lookup_v4("thor"), vec![Ipv4Addr::new(10, 0, 0, 5)]);
        assert_eq!(map.lookup_v4("localhost"), vec![Ipv4Addr::new(127, 0, 0, 1)]);
        assert_eq!(map.lookup_v6("localhost"), vec![Ipv6Addr::LOCALHOST]);
        assert_eq!(map.lookup_ptr("10.0.0.5"), vec!["thor".to_string()]);
    }

    #[test]
    fn ignores_comment_only_lines() {
        let map = HostsMap::parse("# just a comment\n\n");
        assert!(!map.has_any("anything"));
    }

    #[tokio::test]
    async fn refresh_is_noop_without_a_path() {
        let hosts = HostsFile::new(PathBuf::new());
        hosts.refresh_if_stale().await;
        assert!(!hosts.snapshot().await.has_any("thor"));
    }
}
