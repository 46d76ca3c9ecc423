//! Per-cycle snapshot and its flat exports

use crate::error::NoUsableEndpoint;
use crate::netinfo::NetworkInfo;
use crate::proxy::models::ScoredEndpoint;
use crate::proxy::selector::ActiveSet;
use crate::Result;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

/// Version recorded in every snapshot
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Value written where a latency is undefined
const LATENCY_SENTINEL: &str = "-1";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportMetadata {
    pub cycle_id: Uuid,
    pub version: String,
    pub platform: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub relay_available: bool,
}

/// Everything one cycle produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub metadata: ReportMetadata,
    pub network: NetworkInfo,
    /// Every scored endpoint, in completion order
    pub endpoints: Vec<ScoredEndpoint>,
    pub active: ActiveSet,
    pub selected: Option<ScoredEndpoint>,
}

impl CycleReport {
    pub fn new(
        started_at: DateTime<Local>,
        relay_available: bool,
        network: NetworkInfo,
        endpoints: Vec<ScoredEndpoint>,
    ) -> Self {
        let active = ActiveSet::from_scored(&endpoints);
        let selected = active.selected().cloned();
        Self {
            metadata: ReportMetadata {
                cycle_id: Uuid::new_v4(),
                version: VERSION.to_string(),
                platform: std::env::consts::OS.to_string(),
                started_at,
                finished_at: Local::now(),
                relay_available,
            },
            network,
            endpoints,
            active,
            selected,
        }
    }

    /// The chosen endpoint, or an explicit "no usable endpoint" condition
    pub fn require_selected(&self) -> std::result::Result<&ScoredEndpoint, NoUsableEndpoint> {
        self.selected.as_ref().ok_or(NoUsableEndpoint)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Active endpoints as `IP:PORT` lines, fastest first
    pub fn active_list_text(&self) -> String {
        let mut out = format!(
            "# Active Proxy List - Generated on {}\n\n",
            self.metadata.finished_at.format("%Y-%m-%d %H:%M:%S")
        );
        for endpoint in self.active.by_latency() {
            out.push_str(&endpoint.endpoint.address());
            out.push('\n');
        }
        out
    }

    /// Every scored endpoint as CSV
    pub fn to_csv(&self) -> String {
        let mut out =
            String::from("IP,Port,Country,Anonymity,HTTPS,Success Rate,Response Time,Status,Error\n");
        for scored in &self.endpoints {
            let p = &scored.endpoint.provenance;
            let https = match p.https {
                Some(true) => "yes",
                Some(false) => "no",
                None => "",
            };
            let latency = scored
                .mean_latency_ms
                .map(|ms| format!("{:.2}", ms / 1000.0))
                .unwrap_or_else(|| LATENCY_SENTINEL.to_string());
            out.push_str(&format!(
                "{},{},{},{},{},{:.1},{},{},\"{}\"\n",
                scored.endpoint.host,
                scored.endpoint.port,
                csv_field(p.country.as_deref().unwrap_or("")),
                csv_field(p.anonymity.as_deref().unwrap_or("")),
                https,
                scored.success_rate(),
                latency,
                scored.status,
                scored.error.replace('"', "\"\""),
            ));
        }
        out
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn save_active_list<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.active_list_text())?;
        Ok(())
    }

    pub fn save_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_csv())?;
        Ok(())
    }
}

/// Quote a field when it would break the row
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
