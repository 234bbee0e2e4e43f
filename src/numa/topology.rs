//! NUMA topology abstraction.
//!
//! The topology answers two questions: how many nodes the buffer pool should
//! shard over, and which node the calling thread is currently on. The
//! fallback implementation derives pseudo-nodes from the CPU number so that
//! sharding and routing behave consistently on non-NUMA machines.

use std::sync::Arc;

use super::NumaOptions;

pub trait NumaTopology: Send + Sync {
    fn node_count(&self) -> usize;
    fn current_node(&self) -> usize;
}

/// Pseudo-node topology: a fixed node count with `cpu % nodes` placement.
struct FixedTopology {
    nodes: usize,
}

impl NumaTopology for FixedTopology {
    fn node_count(&self) -> usize {
        self.nodes
    }

    fn current_node(&self) -> usize {
        current_cpu() % self.nodes
    }
}

/// Builds the topology for `preferred_nodes` (0 = use the environment default
/// or fall back to a single node).
pub fn detect_topology(preferred_nodes: usize, options: &NumaOptions) -> Arc<dyn NumaTopology> {
    let nodes = if preferred_nodes > 0 {
        preferred_nodes
    } else {
        options.default_nodes.unwrap_or(1)
    };
    Arc::new(FixedTopology {
        nodes: nodes.max(1),
    })
}

#[cfg(target_os = "linux")]
pub(crate) fn current_cpu() -> usize {
    // SAFETY: sched_getcpu takes no arguments and only returns the CPU the
    // calling thread is running on, or -1 on failure.
    let cpu = unsafe { libc::sched_getcpu() };
    if cpu < 0 {
        0
    } else {
        cpu as usize
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn current_cpu() -> usize {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferred_nodes_win() {
        let options = NumaOptions {
            default_nodes: Some(8),
            ..NumaOptions::default()
        };
        let topology = detect_topology(2, &options);
        assert_eq!(topology.node_count(), 2);
    }

    #[test]
    fn test_env_default_used_when_unset() {
        let options = NumaOptions {
            default_nodes: Some(4),
            ..NumaOptions::default()
        };
        let topology = detect_topology(0, &options);
        assert_eq!(topology.node_count(), 4);
    }

    #[test]
    fn test_single_node_fallback() {
        let topology = detect_topology(0, &NumaOptions::default());
        assert_eq!(topology.node_count(), 1);
        assert_eq!(topology.current_node(), 0);
    }

    #[test]
    fn test_current_node_in_range() {
        let topology = detect_topology(3, &NumaOptions::default());
        assert!(topology.current_node() < 3);
    }
}
