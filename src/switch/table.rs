use core::fmt;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use crate::packet::MacAddr;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LearnedEntry {
    pub iface: String,
    pub expires_at: Instant,
}

impl LearnedEntry {
    pub fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// MAC address to egress interface, with a lease per entry.
///
/// Every operation takes the one lock exactly once, so a learn and the
/// lookup that follows it are atomic with respect to sweeps.
pub struct LearningTable {
    lease: Duration,
    entries: Mutex<HashMap<MacAddr, LearnedEntry>>,
}

impl LearningTable {
    pub fn new(lease: Duration) -> Self {
        Self {
            lease,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<MacAddr, LearnedEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refresh `src` as reachable through `in_iface`, then resolve `dst`.
    pub fn learn_and_lookup(
        &self,
        src: MacAddr,
        dst: MacAddr,
        in_iface: &str,
        now: Instant,
    ) -> Option<String> {
        let mut entries = self.lock();
        Self::refresh(&mut entries, src, in_iface, now + self.lease);
        entries
            .get(&dst)
            .filter(|e| e.is_live(now))
            .map(|e| e.iface.clone())
    }

    pub fn learn(&self, mac: MacAddr, iface: &str, now: Instant) {
        let mut entries = self.lock();
        Self::refresh(&mut entries, mac, iface, now + self.lease);
    }

    fn refresh(
        entries: &mut HashMap<MacAddr, LearnedEntry>,
        mac: MacAddr,
        iface: &str,
        expires_at: Instant,
    ) {
        match entries.get_mut(&mac) {
            Some(entry) => {
                if entry.iface != iface {
                    log::debug!("{} moved from {} to {}", mac, entry.iface, iface);
                    entry.iface = iface.to_string();
                }
                entry.expires_at = expires_at;
            }
            None => {
                log::debug!("Learned {} on {}", mac, iface);
                entries.insert(
                    mac,
                    LearnedEntry {
                        iface: iface.to_string(),
                        expires_at,
                    },
                );
            }
        }
    }

    pub fn lookup(&self, mac: MacAddr, now: Instant) -> Option<String> {
        self.lock()
            .get(&mac)
            .filter(|e| e.is_live(now))
            .map(|e| e.iface.clone())
    }

    /// Remove every entry expired at `now`. Returns how many went.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        let removed = before - entries.len();

        if removed > 0 {
            log::debug!("Swept {} expired MAC entries", removed);
        }
        removed
    }

    /// Live entries ordered by MAC.
    pub fn entries(&self, now: Instant) -> Vec<(MacAddr, LearnedEntry)> {
        let mut live: Vec<(MacAddr, LearnedEntry)> = self
            .lock()
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .map(|(mac, e)| (*mac, e.clone()))
            .collect();
        live.sort_by_key(|(mac, _)| *mac);
        live
    }

    /// Number of entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl fmt::Display for LearningTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let now = Instant::now();
        writeln!(f, "MAC\t\t\tiface\texpires in")?;
        for (mac, entry) in self.entries(now) {
            let left = entry.expires_at.saturating_duration_since(now);
            writeln!(f, "{}\t{}\t{}ms", mac, entry.iface, left.as_millis())?;
        }
        Ok(())
    }
}

/// Periodically sweeps a [`LearningTable`] until stopped.
pub struct Sweeper {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Must be called from within a tokio runtime.
    pub fn spawn(table: Arc<LearningTable>, every: Duration) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        table.sweep(Instant::now());
                    }
                    _ = &mut stop_rx => {
                        break;
                    }
                }
            }

            log::debug!("MAC table sweeper stopped");
        });

        Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Signal the sweeper to stop and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log::warn!("MAC table sweeper did not stop cleanly: {}", e);
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }
}
