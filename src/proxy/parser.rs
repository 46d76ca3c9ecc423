//! Candidate parser for plain-text proxy lists

use crate::proxy::models::{CandidateEndpoint, Provenance, ProxyType};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static URL_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(https?|socks[45])://([^:/@\s]+):(\d+)/?$").expect("Invalid URL format regex")
});

/// Parser turning list lines into candidate endpoints
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a single candidate line
    ///
    /// Supports formats:
    /// - IP:PORT
    /// - scheme://IP:PORT
    ///
    /// Lines carrying credentials are skipped.
    pub fn parse_line(line: &str, default_type: ProxyType, source: &str) -> Option<CandidateEndpoint> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.contains('@') {
            return None;
        }

        let (host, port, proxy_type) = match URL_FORMAT.captures(line) {
            Some(caps) => {
                let proxy_type = caps[1].parse::<ProxyType>().ok()?;
                (caps[2].to_string(), caps[3].to_string(), proxy_type)
            }
            None => {
                let (host, port) = line.split_once(':')?;
                if port.contains(':') {
                    return None;
                }
                (host.to_string(), port.to_string(), default_type)
            }
        };

        CandidateEndpoint::from_raw(&host, &port, proxy_type, Provenance::from_source(source)).ok()
    }

    /// Parse candidates from a string (multiple lines)
    pub fn parse_string(content: &str, default_type: ProxyType, source: &str) -> Vec<CandidateEndpoint> {
        content
            .lines()
            .filter_map(|line| Self::parse_line(line, default_type, source))
            .collect()
    }

    /// Remove duplicate host:port pairs, keeping the first occurrence
    pub fn dedup(candidates: Vec<CandidateEndpoint>) -> Vec<CandidateEndpoint> {
        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|c| seen.insert((c.host.clone(), c.port)))
            .collect()
    }
}
