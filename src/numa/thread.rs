//! Worker thread placement.
//!
//! Executor workers bind themselves to their node before entering the task
//! loop. On Linux the fallback binds to the CPU set of the pseudo-node
//! (`cpu % node_count == node`), which matches how the fallback topology
//! assigns nodes. Binding is best-effort; callers log the error and keep the
//! worker running unbound.

use eyre::{bail, ensure, Result};

/// Binds the calling thread to the CPUs of `node` within a `node_count`-node
/// layout.
#[cfg(target_os = "linux")]
pub fn bind_current_thread(node: usize, node_count: usize) -> Result<()> {
    ensure!(node_count > 0, "node count must be positive");
    let node = node % node_count;

    let cpus = available_cpus();
    ensure!(cpus > 0, "cannot determine CPU count");

    // SAFETY: CPU_ZERO/CPU_SET only write into the local cpu_set_t, and
    // sched_setaffinity reads it for the calling thread (pid 0).
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        let mut any = false;
        for cpu in 0..cpus.min(libc::CPU_SETSIZE as usize) {
            if cpu % node_count == node {
                libc::CPU_SET(cpu, &mut set);
                any = true;
            }
        }
        ensure!(any, "no CPUs map to node {}", node);
        let rc = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
        if rc != 0 {
            bail!(
                "sched_setaffinity failed for node {}: {}",
                node,
                std::io::Error::last_os_error()
            );
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn bind_current_thread(_node: usize, node_count: usize) -> Result<()> {
    ensure!(node_count > 0, "node count must be positive");
    bail!("NUMA thread binding not available on this platform");
}

#[cfg(target_os = "linux")]
fn available_cpus() -> usize {
    // SAFETY: sysconf is a plain query with no side effects.
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if n <= 0 {
        0
    } else {
        n as usize
    }
}
