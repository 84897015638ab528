use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use sysinfo::System;

const COURIER_CONFIG: &str = "COURIER_CONFIG";

pub fn get_config_path() -> Option<PathBuf> {
    let path_from_env = std::env::var(COURIER_CONFIG);
    path_from_env.ok().filter(|path| !path.is_empty()).map(PathBuf::from)
}

/// Seconds since the unix epoch with sub-second precision
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since| since.as_secs_f64())
        .unwrap_or_default()
}

pub fn host_name() -> String {
    System::host_name().unwrap_or(String::from("unknown"))
}
