//! Per-child resource limits applied with `setrlimit` between fork and exec.

use tokio::process::Command;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    pub cpu_secs: Option<u64>,
    pub memory_mb: Option<u64>,
    pub file_size_mb: Option<u64>,
}

impl ResourceLimits {
    pub fn is_empty(&self) -> bool {
        self.cpu_secs.is_none() && self.memory_mb.is_none() && self.file_size_mb.is_none()
    }

    /// Install the limits on `command`; the child also gets its own process group
    #[cfg(unix)]
    pub fn apply(self, command: &mut Command) {
        command.process_group(0);
        if self.is_empty() {
            return;
        }
        // SAFETY: the closure only calls setrlimit, which is async-signal-safe, and
        // touches no allocator or lock.
        unsafe {
            command.pre_exec(move || self.set_all());
        }
    }

    #[cfg(not(unix))]
    pub fn apply(self, _command: &mut Command) {}

    #[cfg(unix)]
    fn set_all(&self) -> std::io::Result<()> {
        const MB: u64 = 1024 * 1024;
        if let Some(secs) = self.cpu_secs {
            set_limit(libc::RLIMIT_CPU, secs)?;
        }
        if let Some(mb) = self.memory_mb {
            set_limit(libc::RLIMIT_AS, mb.saturating_mul(MB))?;
        }
        if let Some(mb) = self.file_size_mb {
            set_limit(libc::RLIMIT_FSIZE, mb.saturating_mul(MB))?;
        }
        Ok(())
    }
}

#[cfg(all(unix, target_os = "linux", target_env = "gnu"))]
type Resource = libc::__rlimit_resource_t;

#[cfg(all(unix, not(all(target_os = "linux", target_env = "gnu"))))]
type Resource = libc::c_int;

#[cfg(unix)]
fn set_limit(resource: Resource, value: u64) -> std::io::Result<()> {
    let limit = libc::rlimit {
        rlim_cur: value as libc::rlim_t,
        rlim_max: value as libc::rlim_t,
    };
    // SAFETY: `limit` is a valid, initialized rlimit for the duration of the call.
    let rc = unsafe { libc::setrlimit(resource, &limit) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Send SIGKILL to every process in the child's group
#[cfg(unix)]
pub fn kill_group(pid: u32) {
    // SAFETY: plain syscall; a stale pid only yields ESRCH.
    unsafe {
        libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
pub fn kill_group(_pid: u32) {}
