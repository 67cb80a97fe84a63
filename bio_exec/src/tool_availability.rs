//! # Backend Probe
//!
//! Decides, per (execution mode, tool), whether that mode can run the tool on this host
//! right now, and records what it found (binary path, loadable module aliases, container
//! runtime plus image) so the invocation builder does not have to look again.
//!
//! Probes are bounded by the configured probe timeout, never raise, and report failures
//! as diagnostics on an unavailable [`BackendAvailability`]. Results are cached per
//! (mode, tool) in an [`AvailabilityCache`] until [`AvailabilityCache::clear`] is called.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::RwLock;

use crate::mode::ExecutionMode;
use crate::registry::ToolSpec;

mod builder;
mod engine;
mod types;

pub use engine::{ProbeEnvironment, SystemProbe};
pub(crate) use engine::is_executable;
pub use types::{BackendAvailability, BackendResource};

/// Something that can tell whether a mode can serve a tool.
///
/// [`SystemProbe`] inspects the real host; tests substitute fakes.
#[async_trait]
pub trait BackendProbe: Send + Sync {
    /// Probe one mode for one tool. Must not panic and must finish within the probe
    /// timeout; failures are reported through `BackendAvailability::detail`.
    async fn probe(&self, mode: ExecutionMode, spec: &ToolSpec) -> BackendAvailability;

    /// Best-effort version string for a native binary.
    async fn detect_version(&self, _binary: &Path) -> Option<String> {
        None
    }
}

/// Probe results keyed by (mode, tool name).
#[derive(Debug, Default)]
pub struct AvailabilityCache {
    entries: RwLock<HashMap<(ExecutionMode, String), BackendAvailability>>,
}

impl AvailabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, mode: ExecutionMode, tool: &str) -> Option<BackendAvailability> {
        self.entries
            .read()
            .await
            .get(&(mode, tool.to_string()))
            .cloned()
    }

    pub async fn insert(&self, tool: &str, availability: BackendAvailability) {
        self.entries
            .write()
            .await
            .insert((availability.mode, tool.to_string()), availability);
    }

    /// Forget every cached result.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Forget cached results for one tool.
    pub async fn clear_tool(&self, tool: &str) {
        self.entries.write().await.retain(|(_, name), _| name != tool);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Return the cached result for (mode, tool), probing and caching on a miss.
pub async fn probe_cached(
    probe: &dyn BackendProbe,
    cache: &AvailabilityCache,
    mode: ExecutionMode,
    spec: &ToolSpec,
) -> BackendAvailability {
    if let Some(hit) = cache.get(mode, &spec.name).await {
        return hit;
    }
    let availability = probe.probe(mode, spec).await;
    cache.insert(&spec.name, availability.clone()).await;
    availability
}

/// Probe every mode for `spec` concurrently, returning results in `modes` order.
pub async fn probe_modes(
    probe: &dyn BackendProbe,
    cache: &AvailabilityCache,
    modes: &[ExecutionMode],
    spec: &ToolSpec,
) -> Vec<BackendAvailability> {
    join_all(
        modes
            .iter()
            .map(|mode| probe_cached(probe, cache, *mode, spec)),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BackendProbe for CountingProbe {
        async fn probe(&self, mode: ExecutionMode, _spec: &ToolSpec) -> BackendAvailability {
            self.calls.fetch_add(1, Ordering::SeqCst);
            BackendAvailability::unavailable(mode, "not here")
        }
    }

    fn spec(name: &str) -> ToolSpec {
        ToolSpec {
            name: name.into(),
            binary: name.into(),
            module_aliases: vec![name.into()],
            container_image: None,
            singularity_image: None,
            native_path: None,
            bind_mounts: vec![],
            forced_mode: None,
            preferred_modes: None,
        }
    }

    #[tokio::test]
    async fn cached_probe_runs_once_until_cleared() {
        let probe = CountingProbe {
            calls: AtomicUsize::new(0),
        };
        let cache = AvailabilityCache::new();
        let blast = spec("blast");

        let first = probe_cached(&probe, &cache, ExecutionMode::Docker, &blast).await;
        let second = probe_cached(&probe, &cache, ExecutionMode::Docker, &blast).await;
        assert_eq!(first, second);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);

        cache.clear().await;
        probe_cached(&probe, &cache, ExecutionMode::Docker, &blast).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn clear_tool_keeps_other_tools() {
        let cache = AvailabilityCache::new();
        cache
            .insert("blast", BackendAvailability::unavailable(ExecutionMode::Native, "x"))
            .await;
        cache
            .insert("bwa", BackendAvailability::unavailable(ExecutionMode::Native, "y"))
            .await;
        cache.clear_tool("blast").await;
        assert!(cache.get(ExecutionMode::Native, "blast").await.is_none());
        assert!(cache.get(ExecutionMode::Native, "bwa").await.is_some());
        assert_eq!(cache.len().await, 1);
    }
}
