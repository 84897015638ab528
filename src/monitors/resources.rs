use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sysinfo::{Disks, ProcessesToUpdate, System};
use tracing::{debug, trace};

use crate::{MetricResult, MetricValue};

use super::Monitor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Cpu,
    Memory,
    Disk,
    Processes,
}

impl Resource {
    pub fn name(self) -> &'static str {
        match self {
            Resource::Cpu => "cpu_usage",
            Resource::Memory => "memory_usage",
            Resource::Disk => "disk_usage",
            Resource::Processes => "process_count",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Resource::Processes => "count",
            _ => "percent",
        }
    }
}

/// Local resource usage, queried synchronously on the blocking pool
#[derive(Debug)]
pub struct ResourceMonitor {
    resource: Resource,
    enabled: bool,
    /// Mount point looked up for [`Resource::Disk`]
    disk_path: PathBuf,
    running: AtomicBool,
}

impl ResourceMonitor {
    fn new(resource: Resource, enabled: bool, disk_path: PathBuf) -> Self {
        debug!("{} monitor initialized", resource.name());
        Self {
            resource,
            enabled,
            disk_path,
            running: AtomicBool::new(true),
        }
    }

    pub fn cpu(enabled: bool) -> Self {
        Self::new(Resource::Cpu, enabled, PathBuf::from("/"))
    }

    pub fn memory(enabled: bool) -> Self {
        Self::new(Resource::Memory, enabled, PathBuf::from("/"))
    }

    pub fn disk(enabled: bool, path: PathBuf) -> Self {
        Self::new(Resource::Disk, enabled, path)
    }

    pub fn processes(enabled: bool) -> Self {
        Self::new(Resource::Processes, enabled, PathBuf::from("/"))
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }
}

#[async_trait]
impl Monitor for ResourceMonitor {
    fn name(&self) -> &str {
        self.resource.name()
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn measure(&self) -> MetricResult {
        let resource = self.resource;
        let disk_path = self.disk_path.clone();

        let sampled = tokio::task::spawn_blocking(move || sample(resource, &disk_path)).await;

        match sampled {
            Ok(Ok(value)) => MetricResult::ok(value, resource.unit()),
            Ok(Err(e)) => MetricResult::failed(resource.unit(), format!("{e:#}")),
            Err(e) => MetricResult::failed(resource.unit(), format!("sampling task failed: {e}")),
        }
    }

    fn stop(&self) {
        debug!("stopping {} monitor", self.name());
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

fn sample(resource: Resource, disk_path: &Path) -> Result<MetricValue> {
    match resource {
        Resource::Cpu => {
            let mut sys = System::new();
            sys.refresh_cpu_usage();
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            sys.refresh_cpu_usage();
            Ok(round(sys.global_cpu_usage() as f64).into())
        }
        Resource::Memory => {
            let mut sys = System::new();
            sys.refresh_memory();
            usage_percent(sys.used_memory(), sys.total_memory())
                .map(MetricValue::from)
                .context("total memory reported as zero")
        }
        Resource::Disk => {
            let disks = Disks::new_with_refreshed_list();
            let mounts: Vec<&Path> = disks.iter().map(|disk| disk.mount_point()).collect();
            let mount = best_mount(&mounts, disk_path)
                .with_context(|| format!("no disk mounted at {}", disk_path.display()))?;
            trace!("{} resolved to mount point {}", disk_path.display(), mount.display());

            let disk = disks
                .iter()
                .find(|disk| disk.mount_point() == mount)
                .context("disk disappeared while sampling")?;
            let total = disk.total_space();
            usage_percent(total.saturating_sub(disk.available_space()), total)
                .map(MetricValue::from)
                .with_context(|| format!("disk at {} reports zero capacity", mount.display()))
        }
        Resource::Processes => {
            let mut sys = System::new();
            sys.refresh_processes(ProcessesToUpdate::All, true);
            Ok(sys.processes().len().into())
        }
    }
}

fn round(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn usage_percent(used: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| round(used as f64 / total as f64 * 100.0))
}

/// Longest mount point containing `target`
fn best_mount<'a>(mounts: &[&'a Path], target: &Path) -> Option<&'a Path> {
    mounts
        .iter()
        .copied()
        .filter(|mount| target.starts_with(mount))
        .max_by_key(|mount| mount.as_os_str().len())
}
