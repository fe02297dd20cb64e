//! Watch command implementation.
//!
//! Polls the manifests, fingerprints every namespace, and recompiles the
//! namespaces whose fingerprint changed.

use super::compile::write_processors;
use super::{load_manifests, log_conditions, OutputFormat};
use anyhow::Result;
use sampling_actions::{legacy_to_unified, ManifestSet};
use sampling_compiler::{CompilerConfig, MemoryStore, Reconciler};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use xxhash_rust::xxh64::xxh64;

/// Seed for namespace fingerprints.
const HASH_SEED: u64 = 0x0057_4154_4348; // "WATCH" in hex

/// Watch mode configuration.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Manifest file or directory.
    pub manifests: String,
    /// Only watch this namespace.
    pub namespace: Option<String>,
    /// Output directory for processor documents.
    pub output: PathBuf,
    /// Encoding of processor documents.
    pub format: OutputFormat,
    /// Poll interval in seconds.
    pub interval_secs: u64,
}

/// Events that can occur during watch mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The resources of a namespace changed.
    NamespaceChanged(String),
    /// Every resource of a namespace disappeared.
    NamespaceRemoved(String),
    /// Manifests could not be loaded.
    Error(String),
}

/// Watch mode state.
#[derive(Debug)]
pub struct WatchState {
    /// Last seen fingerprint per namespace.
    pub fingerprints: BTreeMap<String, String>,
    /// Latest successfully loaded manifests.
    pub manifests: ManifestSet,
    /// Successful reconciliations.
    pub cycles: u64,
    /// Failed reconciliations.
    pub failures: u64,
    /// Start time.
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl WatchState {
    fn new() -> Self {
        Self {
            fingerprints: BTreeMap::new(),
            manifests: ManifestSet::new(),
            cycles: 0,
            failures: 0,
            started_at: chrono::Utc::now(),
        }
    }
}

/// Fingerprint of one namespace's resources.
pub fn fingerprint(manifests: &ManifestSet) -> Result<String> {
    let mut input = String::new();
    for action in &manifests.actions {
        input.push_str(&serde_json::to_string(action)?);
        input.push('\n');
    }
    for legacy in &manifests.legacy {
        input.push_str(legacy.kind().slug());
        input.push_str(&serde_json::to_string(&legacy_to_unified(legacy))?);
        input.push('\n');
    }
    Ok(format!("{:016x}", xxh64(input.as_bytes(), HASH_SEED)))
}

/// Compares fingerprints and returns the events they imply.
pub fn diff(
    previous: &BTreeMap<String, String>,
    current: &BTreeMap<String, String>,
) -> Vec<WatchEvent> {
    let changed = current
        .iter()
        .filter(|(ns, hash)| previous.get(*ns) != Some(*hash))
        .map(|(ns, _)| WatchEvent::NamespaceChanged(ns.clone()));
    let removed = previous
        .keys()
        .filter(|ns| !current.contains_key(*ns))
        .map(|ns| WatchEvent::NamespaceRemoved(ns.clone()));
    changed.chain(removed).collect()
}

/// The main watcher for continuous recompilation.
pub struct Watcher {
    config: WatchConfig,
    compiler: CompilerConfig,
    store: MemoryStore,
    state: WatchState,
    running: Arc<AtomicBool>,
    event_tx: mpsc::Sender<WatchEvent>,
    event_rx: mpsc::Receiver<WatchEvent>,
}

impl Watcher {
    /// Creates a new watcher.
    pub fn new(config: WatchConfig, compiler: CompilerConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(1000);
        Self {
            config,
            compiler,
            store: MemoryStore::new(),
            state: WatchState::new(),
            running: Arc::new(AtomicBool::new(false)),
            event_tx,
            event_rx,
        }
    }

    /// Runs the watch loop until Ctrl+C.
    pub async fn run(&mut self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        info!("Starting watch mode...");
        info!("Manifests: {}", self.config.manifests);
        info!("Output: {}", self.config.output.display());
        if let Some(ref namespace) = self.config.namespace {
            info!("Namespace: {}", namespace);
        }

        let mut poll_interval = interval(Duration::from_secs(self.config.interval_secs.max(1)));

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                Some(event) = self.event_rx.recv() => {
                    self.handle_event(event);
                }

                _ = poll_interval.tick() => {
                    self.poll();
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    self.running.store(false, Ordering::SeqCst);
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Reloads the manifests and queues every namespace whose fingerprint changed.
    fn poll(&mut self) {
        debug!("Polling {}", self.config.manifests);
        let manifests = match load_manifests(&self.config.manifests) {
            Ok(manifests) => manifests,
            Err(e) => {
                self.send(WatchEvent::Error(format!("{e:#}")));
                return;
            }
        };

        let mut current = BTreeMap::new();
        for namespace in manifests.namespaces() {
            if self
                .config
                .namespace
                .as_ref()
                .is_some_and(|only| *only != namespace)
            {
                continue;
            }
            match fingerprint(&manifests.in_namespace(&namespace)) {
                Ok(hash) => {
                    current.insert(namespace, hash);
                }
                Err(e) => warn!("Failed to fingerprint namespace {}: {}", namespace, e),
            }
        }

        let events = diff(&self.state.fingerprints, &current);
        self.state.fingerprints = current;
        self.state.manifests = manifests;
        for event in events {
            self.send(event);
        }
    }

    fn send(&self, event: WatchEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("Dropped watch event: {}", e);
        }
    }

    /// Handles a watch event.
    fn handle_event(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::NamespaceChanged(namespace) | WatchEvent::NamespaceRemoved(namespace) => {
                self.reconcile(&namespace);
            }
            WatchEvent::Error(msg) => {
                error!("Watch error: {}", msg);
            }
        }
    }

    /// Syncs one namespace into the store, recompiles it, and writes its processors.
    fn reconcile(&mut self, namespace: &str) {
        let result = self
            .store
            .replace_namespace(namespace, &self.state.manifests)
            .map_err(anyhow::Error::from)
            .and_then(|()| {
                Reconciler::new(&self.store, self.compiler.clone())
                    .reconcile(namespace)
                    .map_err(anyhow::Error::from)
            })
            .and_then(|report| {
                log_conditions(&report);
                if report.changed() {
                    let processors = self.store.processors(namespace)?;
                    write_processors(&self.config.output, namespace, &processors, self.config.format)?;
                } else {
                    debug!("Namespace {} unchanged", namespace);
                }
                Ok(report)
            });

        match result {
            Ok(report) => {
                self.state.cycles += 1;
                info!(
                    "Namespace {} compiled ({} processors, {} deleted)",
                    namespace,
                    report.applied.len(),
                    report.deleted.len()
                );
            }
            Err(e) => {
                self.state.failures += 1;
                // Forget the fingerprint so the next poll retries.
                self.state.fingerprints.remove(namespace);
                error!("Failed to compile namespace {}: {:#}", namespace, e);
            }
        }
    }

    /// Performs cleanup on shutdown.
    fn shutdown(&self) {
        info!("Shutting down watch mode...");
        let uptime = chrono::Utc::now() - self.state.started_at;
        info!("Watch mode statistics:");
        info!("  Uptime: {}s", uptime.num_seconds());
        info!("  Namespaces: {}", self.state.fingerprints.len());
        info!("  Compilations: {}", self.state.cycles);
        info!("  Failures: {}", self.state.failures);
        info!("Watch mode stopped");
    }
}

/// Runs the watch command.
pub async fn run(
    compiler: CompilerConfig,
    manifests: &str,
    namespace: Option<String>,
    output: &str,
    format: &str,
    interval_secs: u64,
) -> Result<()> {
    let config = WatchConfig {
        manifests: manifests.to_string(),
        namespace,
        output: PathBuf::from(output),
        format: OutputFormat::parse(format)?,
        interval_secs,
    };

    let mut watcher = Watcher::new(config, compiler);
    watcher.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sampling_actions::{Action, DEFAULT_NAMESPACE};

    const MANIFESTS: &str = r"
apiVersion: sampling.io/v1alpha1
kind: Action
metadata:
  name: errors
  namespace: shop
spec:
  signals: [TRACES]
  samplers:
    errorSampler:
      fallback_sampling_ratio: 10
";

    fn hashes(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(ns, h)| ((*ns).to_string(), (*h).to_string()))
            .collect()
    }

    #[test]
    fn fingerprint_tracks_content() {
        let set = ManifestSet::parse_str(MANIFESTS, DEFAULT_NAMESPACE).unwrap();
        let a = fingerprint(&set).unwrap();
        assert_eq!(a, fingerprint(&set).unwrap());
        assert_eq!(a.len(), 16);

        let mut changed = set.clone();
        changed.actions.push(Action::new("shop", "more"));
        assert_ne!(a, fingerprint(&changed).unwrap());
    }

    #[test]
    fn diff_reports_changed_and_removed_namespaces() {
        let previous = hashes(&[("shop", "1"), ("billing", "2"), ("gone", "3")]);
        let current = hashes(&[("shop", "1"), ("billing", "9"), ("new", "4")]);
        assert_eq!(
            diff(&previous, &current),
            vec![
                WatchEvent::NamespaceChanged("billing".to_string()),
                WatchEvent::NamespaceChanged("new".to_string()),
                WatchEvent::NamespaceRemoved("gone".to_string()),
            ]
        );
    }

    #[test]
    fn removed_namespace_deletes_its_processors() {
        let dir = std::env::temp_dir().join(format!("samplerc-watch-{}", std::process::id()));
        let config = WatchConfig {
            manifests: String::new(),
            namespace: None,
            output: dir.clone(),
            format: OutputFormat::Yaml,
            interval_secs: 1,
        };
        let mut watcher = Watcher::new(config, CompilerConfig::default());

        watcher.state.manifests = ManifestSet::parse_str(MANIFESTS, DEFAULT_NAMESPACE).unwrap();
        watcher.handle_event(WatchEvent::NamespaceChanged("shop".to_string()));
        assert!(dir.join("shop").join("sampling-rules.yaml").exists());

        watcher.state.manifests = ManifestSet::new();
        watcher.handle_event(WatchEvent::NamespaceRemoved("shop".to_string()));
        assert!(!dir.join("shop").join("sampling-rules.yaml").exists());
        assert_eq!(watcher.state.cycles, 2);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
