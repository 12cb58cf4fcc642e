//! Host and process information.
//!
//! [`HostInfo`] is the only way the engine learns about the machine it runs
//! on. [`SysinfoHost`] reads the real system; [`StaticHost`] returns fixed
//! values so reports and samplers can be tested deterministically.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};

const BYTES_PER_MB: u64 = 1_048_576;

/// CPU description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuInfo {
    pub model: String,
    pub speed_mhz: u64,
    pub cores: usize,
}

/// Memory totals in megabytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInfo {
    pub total_mb: u64,
    pub free_mb: u64,
}

/// Environment snapshot captured at the start of a benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSnapshot {
    pub platform: String,
    pub arch: String,
    pub runtime_version: String,
    pub cpu_info: CpuInfo,
    pub memory_info: MemoryInfo,
}

/// Resource usage of the current process.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessUsage {
    pub cpu_percent: f64,
    pub rss_bytes: u64,
}

impl ProcessUsage {
    pub fn rss_mb(&self) -> f64 {
        self.rss_bytes as f64 / BYTES_PER_MB as f64
    }
}

/// Source of host and process information.
pub trait HostInfo: Send + Sync {
    fn snapshot(&self) -> HostSnapshot;

    fn process_usage(&self) -> ProcessUsage;
}

/// [`HostInfo`] backed by the `sysinfo` crate.
pub struct SysinfoHost {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SysinfoHost {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        system.refresh_memory();

        let pid = sysinfo::get_current_pid().ok();
        if let Some(pid) = pid {
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        }

        Self {
            system: Mutex::new(system),
            pid,
        }
    }
}

impl Default for SysinfoHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostInfo for SysinfoHost {
    fn snapshot(&self) -> HostSnapshot {
        let mut system = self
            .system
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        system.refresh_memory();

        let cpus = system.cpus();
        let (model, speed_mhz) = cpus
            .first()
            .map(|cpu| (cpu.brand().trim().to_string(), cpu.frequency()))
            .unwrap_or_else(|| ("unknown".to_string(), 0));

        HostSnapshot {
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            runtime_version: format!("perfscope {}", env!("CARGO_PKG_VERSION")),
            cpu_info: CpuInfo {
                model,
                speed_mhz,
                cores: cpus.len(),
            },
            memory_info: MemoryInfo {
                total_mb: system.total_memory() / BYTES_PER_MB,
                free_mb: system.available_memory() / BYTES_PER_MB,
            },
        }
    }

    fn process_usage(&self) -> ProcessUsage {
        let Some(pid) = self.pid else {
            return ProcessUsage::default();
        };

        let mut system = self
            .system
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

        system
            .process(pid)
            .map(|process| ProcessUsage {
                cpu_percent: f64::from(process.cpu_usage()),
                rss_bytes: process.memory(),
            })
            .unwrap_or_default()
    }
}

/// Fixed host description, for tests and reproducible reports.
#[derive(Debug, Clone)]
pub struct StaticHost {
    snapshot: HostSnapshot,
    usage: ProcessUsage,
}

impl StaticHost {
    pub fn new(snapshot: HostSnapshot, usage: ProcessUsage) -> Self {
        Self { snapshot, usage }
    }
}

impl Default for StaticHost {
    fn default() -> Self {
        Self {
            snapshot: HostSnapshot {
                platform: "linux".to_string(),
                arch: "x86_64".to_string(),
                runtime_version: "perfscope test".to_string(),
                cpu_info: CpuInfo {
                    model: "Test CPU".to_string(),
                    speed_mhz: 3000,
                    cores: 8,
                },
                memory_info: MemoryInfo {
                    total_mb: 16_384,
                    free_mb: 8_192,
                },
            },
            usage: ProcessUsage {
                cpu_percent: 12.5,
                rss_bytes: 64 * BYTES_PER_MB,
            },
        }
    }
}

impl HostInfo for StaticHost {
    fn snapshot(&self) -> HostSnapshot {
        self.snapshot.clone()
    }

    fn process_usage(&self) -> ProcessUsage {
        self.usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_host_reports_fixed_values() {
        let host = StaticHost::default();
        let snapshot = host.snapshot();

        assert_eq!(snapshot.cpu_info.cores, 8);
        assert_eq!(snapshot.memory_info.total_mb, 16_384);
        assert_eq!(host.process_usage().rss_mb(), 64.0);
    }

    #[test]
    fn test_sysinfo_host_snapshot_is_populated() {
        let host = SysinfoHost::new();
        let snapshot = host.snapshot();

        assert_eq!(snapshot.platform, std::env::consts::OS);
        assert!(snapshot.memory_info.total_mb >= snapshot.memory_info.free_mb);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let json = serde_json::to_string(&StaticHost::default().snapshot()).unwrap();
        assert!(json.contains("\"cpuInfo\""));
        assert!(json.contains("\"totalMb\""));
    }
}
