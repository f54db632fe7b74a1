//! Phase-aware dependency manager.
//!
//! For every node the manager keeps a counter of outstanding
//! prerequisites and, per phase, the list of dependers to notify when the
//! node reaches that phase. Waiting is asynchronous: each counter lives
//! in a watch channel, so `wait` suspends until the counter drains to
//! zero or the root context is cancelled. Graph edges stay inside the
//! manager; node records never carry back-pointers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use wirelab_core::error::{LabError, Result};
use wirelab_core::Phase;

#[derive(Default)]
struct Inner {
    /// Outstanding-prerequisite counter per node.
    counters: HashMap<String, watch::Sender<usize>>,
    /// Per node and phase, the nodes to notify when the phase is reached.
    dependers: HashMap<String, HashMap<Phase, Vec<String>>>,
}

/// Phase-aware DAG of node dependencies.
#[derive(Default)]
pub struct DependencyManager {
    inner: Mutex<Inner>,
}

impl DependencyManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node with a zero prerequisite counter and empty
    /// depender lists for every phase.
    pub fn add_node(&self, name: &str) {
        let mut inner = self.inner.lock().expect("dag lock poisoned");
        let (tx, _) = watch::channel(0usize);
        inner.counters.insert(name.to_string(), tx);
        inner.dependers.insert(
            name.to_string(),
            Phase::ALL.iter().map(|p| (*p, Vec::new())).collect(),
        );
    }

    /// Records that `depender` needs `dependee` to reach `phase` before
    /// it can start its own deploy work.
    pub fn add_dependency(&self, depender: &str, dependee: &str, phase: Phase) -> Result<()> {
        let mut inner = self.inner.lock().expect("dag lock poisoned");
        if !inner.counters.contains_key(depender) {
            return Err(LabError::config(format!(
                "node {:?} is not known to the dependency manager",
                depender
            )));
        }
        if !inner.dependers.contains_key(dependee) {
            return Err(LabError::config(format!(
                "node {:?} is not known to the dependency manager",
                dependee
            )));
        }

        inner
            .counters
            .get(depender)
            .expect("checked above")
            .send_modify(|count| *count += 1);
        inner
            .dependers
            .get_mut(dependee)
            .expect("checked above")
            .entry(phase)
            .or_default()
            .push(depender.to_string());
        Ok(())
    }

    /// Blocks until every prerequisite of `name` has been signalled, or
    /// the root context is cancelled.
    pub async fn wait(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        let mut rx = {
            let inner = self.inner.lock().expect("dag lock poisoned");
            inner
                .counters
                .get(name)
                .ok_or_else(|| {
                    LabError::config(format!(
                        "node {:?} is not known to the dependency manager",
                        name
                    ))
                })?
                .subscribe()
        };

        loop {
            if *rx.borrow_and_update() == 0 {
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(LabError::Cancelled),
                changed = rx.changed() => {
                    if changed.is_err() {
                        // sender dropped: the lab is being torn down
                        return Err(LabError::Cancelled);
                    }
                }
            }
        }
    }

    /// Signals that `name` reached `phase`, decrementing the counter of
    /// every depender registered for that phase.
    pub fn signal(&self, name: &str, phase: Phase) {
        let inner = self.inner.lock().expect("dag lock poisoned");
        let Some(phases) = inner.dependers.get(name) else {
            error!(node = %name, "signal for a node unknown to the dependency manager");
            return;
        };
        let dependers = phases.get(&phase).cloned().unwrap_or_default();
        debug!(node = %name, phase = %phase, dependers = dependers.len(), "phase signalled");
        for depender in dependers {
            if let Some(counter) = inner.counters.get(&depender) {
                counter.send_modify(|count| *count = count.saturating_sub(1));
            }
        }
    }

    /// Validates that the dependency graph is acyclic by repeatedly
    /// stripping nodes that no other node depends on, across all phases.
    /// If a round strips nothing while nodes remain, the graph is cyclic.
    pub fn check_acyclic(&self) -> Result<()> {
        // dependee -> dependers, phases merged
        let mut graph: HashMap<String, Vec<String>> = {
            let inner = self.inner.lock().expect("dag lock poisoned");
            inner
                .dependers
                .iter()
                .map(|(dependee, phases)| {
                    (
                        dependee.clone(),
                        phases.values().flatten().cloned().collect(),
                    )
                })
                .collect()
        };

        while !graph.is_empty() {
            let leaves: Vec<String> = graph
                .iter()
                .filter(|(_, dependers)| dependers.is_empty())
                .map(|(dependee, _)| dependee.clone())
                .collect();

            if leaves.is_empty() {
                return Err(LabError::cyclic(self.to_string()));
            }

            for leaf in &leaves {
                graph.remove(leaf);
            }
            for dependers in graph.values_mut() {
                dependers.retain(|d| !leaves.contains(d));
            }
        }

        debug!("dependency graph validated as acyclic");
        Ok(())
    }

    /// Returns true iff at least one node depends on `name` reaching the
    /// `healthy` phase.
    pub fn is_health_required(&self, name: &str) -> bool {
        let inner = self.inner.lock().expect("dag lock poisoned");
        inner
            .dependers
            .get(name)
            .and_then(|phases| phases.get(&Phase::Healthy))
            .map(|deps| !deps.is_empty())
            .unwrap_or(false)
    }
}

impl fmt::Display for DependencyManager {
    /// Renders `depender -> [dependees]` lines.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().expect("dag lock poisoned");

        let mut dependencies: HashMap<&str, Vec<&str>> = inner
            .counters
            .keys()
            .map(|name| (name.as_str(), Vec::new()))
            .collect();
        for (dependee, phases) in &inner.dependers {
            for dependers in phases.values() {
                for depender in dependers {
                    dependencies
                        .entry(depender.as_str())
                        .or_default()
                        .push(dependee.as_str());
                }
            }
        }

        let mut lines: Vec<String> = dependencies
            .into_iter()
            .map(|(name, mut deps)| {
                deps.sort_unstable();
                format!("{} -> [ {} ]", name, deps.join(", "))
            })
            .collect();
        lines.sort_unstable();
        write!(f, "{}", lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn manager(nodes: &[&str]) -> Arc<DependencyManager> {
        let dm = Arc::new(DependencyManager::new());
        for node in nodes {
            dm.add_node(node);
        }
        dm
    }

    #[test]
    fn test_add_dependency_unknown_node() {
        let dm = manager(&["a"]);
        assert!(dm.add_dependency("a", "ghost", Phase::Created).is_err());
        assert!(dm.add_dependency("ghost", "a", Phase::Created).is_err());
    }

    #[tokio::test]
    async fn test_wait_without_dependencies_returns_immediately() {
        let dm = manager(&["a"]);
        let cancel = CancellationToken::new();
        dm.wait("a", &cancel).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_blocks_until_signal() {
        let dm = manager(&["a", "b"]);
        dm.add_dependency("b", "a", Phase::Created).unwrap();

        let cancel = CancellationToken::new();
        let waiter = {
            let dm = dm.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { dm.wait("b", &cancel).await })
        };

        // give the waiter a chance to block
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        dm.signal("a", Phase::Created);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_counts_multiple_prerequisites() {
        let dm = manager(&["a", "b", "c"]);
        dm.add_dependency("c", "a", Phase::Created).unwrap();
        dm.add_dependency("c", "b", Phase::Created).unwrap();

        let cancel = CancellationToken::new();
        let waiter = {
            let dm = dm.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { dm.wait("c", &cancel).await })
        };

        dm.signal("a", Phase::Created);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        dm.signal("b", Phase::Created);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_cancellation() {
        let dm = manager(&["a", "b"]);
        dm.add_dependency("b", "a", Phase::Created).unwrap();

        let cancel = CancellationToken::new();
        let waiter = {
            let dm = dm.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { dm.wait("b", &cancel).await })
        };

        cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(LabError::Cancelled)));
    }

    #[test]
    fn test_signal_only_affects_matching_phase() {
        let dm = manager(&["a", "b"]);
        dm.add_dependency("b", "a", Phase::Healthy).unwrap();

        // created does not satisfy a healthy dependency
        dm.signal("a", Phase::Created);
        let inner = dm.inner.lock().unwrap();
        assert_eq!(*inner.counters["b"].subscribe().borrow(), 1);
    }

    #[test]
    fn test_check_acyclic_accepts_chains() {
        let dm = manager(&["a", "b", "c"]);
        dm.add_dependency("b", "a", Phase::Created).unwrap();
        dm.add_dependency("c", "b", Phase::Created).unwrap();
        dm.check_acyclic().unwrap();
    }

    #[test]
    fn test_check_acyclic_rejects_cycles() {
        let dm = manager(&["x", "y"]);
        dm.add_dependency("x", "y", Phase::Created).unwrap();
        dm.add_dependency("y", "x", Phase::Created).unwrap();
        let err = dm.check_acyclic().unwrap_err();
        assert!(matches!(err, LabError::Cyclic(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_check_acyclic_rejects_cross_phase_cycles() {
        let dm = manager(&["x", "y"]);
        dm.add_dependency("x", "y", Phase::Created).unwrap();
        dm.add_dependency("y", "x", Phase::Healthy).unwrap();
        assert!(dm.check_acyclic().is_err());
    }

    #[test]
    fn test_is_health_required() {
        let dm = manager(&["a", "b"]);
        assert!(!dm.is_health_required("a"));
        dm.add_dependency("b", "a", Phase::Healthy).unwrap();
        assert!(dm.is_health_required("a"));
        assert!(!dm.is_health_required("b"));
    }

    #[test]
    fn test_display_shape() {
        let dm = manager(&["a", "b"]);
        dm.add_dependency("b", "a", Phase::Created).unwrap();
        let rendered = dm.to_string();
        assert!(rendered.contains("b -> [ a ]"));
        assert!(rendered.contains("a -> [  ]"));
    }
}
