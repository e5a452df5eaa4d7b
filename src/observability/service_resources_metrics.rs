use crate::observability::metrics::get_metrics;
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tokio::time::sleep;

const SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Memory figures of this process in bytes, as reported by the host.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct MemoryUsage {
    pub rss: u64,
    #[serde(rename = "virtual")]
    pub virtual_memory: u64,
}

/// One-off memory reading for `/health` and `/stats`. Zeroes when the host refuses.
pub fn sample_memory() -> MemoryUsage {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return MemoryUsage::default();
    };
    let mut sys = System::new();
    refresh_own_process(&mut sys, pid);
    sys.process(pid)
        .map(|proc| MemoryUsage { rss: proc.memory(), virtual_memory: proc.virtual_memory() })
        .unwrap_or_default()
}

fn refresh_own_process(sys: &mut System, pid: Pid) {
    let pids = [pid];
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&pids),
        false,
        ProcessRefreshKind::nothing()
            .with_cpu()
            .with_memory()
            .with_exe(UpdateKind::OnlyIfNotSet),
    );
}

pub async fn collect_process_metrics(is_metrics_enabled: bool) -> Result<()> {
    if !is_metrics_enabled {
        return Ok(());
    }
    let metrics = get_metrics().await;
    let mut sys = System::new();
    let pid = sysinfo::get_current_pid().map_err(|e| anyhow!("current pid unavailable: {}", e))?;

    let start_time_unix = unix_now_secs();
    metrics.process_start_time.set(start_time_unix);

    loop {
        // Refresh just our process
        refresh_own_process(&mut sys, pid);

        if let Some(proc) = sys.process(pid) {
            let cpu = proc.cpu_usage(); // % over last interval
            metrics.process_cpu_usage.set(cpu.into());
            metrics.process_memory_usage.set(proc.memory() as i64);
            metrics.process_virtual_memory.set(proc.virtual_memory() as i64);

            #[cfg(target_family = "unix")]
            {
                use std::fs;
                if let Ok(entries) = fs::read_dir(format!("/proc/{}/fd", pid.as_u32())) {
                    metrics.process_open_fds.set(entries.count() as i64);
                }
            }

            metrics.process_uptime.set(unix_now_secs() - start_time_unix);
        }

        sleep(SAMPLE_INTERVAL).await;
    }
}

fn unix_now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_usage_serializes_with_virtual_key() {
        let json = serde_json::to_value(MemoryUsage { rss: 1, virtual_memory: 2 }).unwrap();
        assert_eq!(json["rss"], 1);
        assert_eq!(json["virtual"], 2);
    }

    #[test]
    fn own_process_is_visible() {
        assert!(sample_memory().rss > 0);
    }
}
