//! Remote probe contract
//!
//! The probe commands and the sample grammar are co-designed: the resource
//! probe prints one line in the exact token format the parser below accepts.
//! Both live here so a swapped probe strategy changes one file and never
//! touches session lifecycle logic.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// Log tail with layered fallbacks across heterogeneous pod images: the app
/// log path, then any log under /root/logs, then the system journal, else a
/// literal marker line.
const LOG_TAIL_CMD: &str = "tail -f /var/log/app.log 2>/dev/null || tail -f /root/logs/*.log 2>/dev/null || journalctl -f 2>/dev/null || echo \"No logs found\"";

/// Single-round-trip resource snapshot printing
/// `CPU:<float>% MEM:<float>%|<int>MB|<int>MB DISK:<used>|<total>`.
const RESOURCE_PROBE_CMD: &str = r#"echo "CPU:$(top -bn1 | grep "Cpu(s)" | awk '{print $2}')% MEM:$(free -m | awk '/Mem:/ {printf "%.1f%%|%dMB|%dMB", $3/$2*100, $3, $2}') DISK:$(df -h / | awk 'NR==2 {print $3"|"$2}')""#;

/// The remote commands a session runs over its transport
#[derive(Debug, Clone)]
pub struct ProbeSet {
    pub log_tail: String,
    pub resource: String,
}

impl Default for ProbeSet {
    fn default() -> Self {
        Self {
            log_tail: LOG_TAIL_CMD.to_string(),
            resource: RESOURCE_PROBE_CMD.to_string(),
        }
    }
}

/// One point-in-time CPU/memory/disk snapshot of a pod
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSample {
    pub cpu: f64,
    pub mem_percent: f64,
    pub mem_used: String,
    pub mem_total: String,
    pub disk_used: String,
    pub disk_total: String,
}

fn cpu_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"CPU:(\d+\.?\d*)%").expect("static regex"))
}

fn mem_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"MEM:(\d+\.?\d*)%\|(\d+)MB\|(\d+)MB").expect("static regex"))
}

fn disk_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"DISK:(\S+)\|(\S+)").expect("static regex"))
}

/// Parse one probe output line.
///
/// All three segments are required; anything else (unexpected shell output,
/// locale differences, missing tools on the image) yields `None` and the
/// sample is dropped.
pub fn parse_resource_sample(output: &str) -> Option<ResourceSample> {
    let cpu = cpu_re().captures(output)?;
    let mem = mem_re().captures(output)?;
    let disk = disk_re().captures(output)?;

    Some(ResourceSample {
        cpu: cpu[1].parse().ok()?,
        mem_percent: mem[1].parse().ok()?,
        mem_used: format!("{}MB", &mem[2]),
        mem_total: format!("{}MB", &mem[3]),
        disk_used: disk[1].to_string(),
        disk_total: disk[2].to_string(),
    })
}
