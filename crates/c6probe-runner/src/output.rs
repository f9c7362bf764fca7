//! Rendering of run outcomes, catalogs and port lists.
//!
//! Text output is for people; JSON and YAML carry the same data for scripts.

use std::fmt::Write as _;

use c6probe_device::{RunOutcome, SerialPortInfo};
use c6probe_model::{ConfigValue, KeyCatalog};
use chrono::SecondsFormat;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Output format for everything printed to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Aligned plain text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
    /// YAML.
    Yaml,
}

fn structured<T: Serialize>(value: &T, format: OutputFormat) -> Result<Option<String>> {
    Ok(match format {
        OutputFormat::Text => None,
        OutputFormat::Json => Some(serde_json::to_string_pretty(value)? + "\n"),
        OutputFormat::Yaml => Some(serde_yaml::to_string(value)?),
    })
}

/// Render the outcome of a run.
pub fn render_outcome(outcome: &RunOutcome, format: OutputFormat) -> Result<String> {
    if let Some(out) = structured(outcome, format)? {
        return Ok(out);
    }

    let mut out = String::new();
    let _ = writeln!(out, "endpoint:  {}", outcome.endpoint);
    match (&outcome.device.version, &outcome.device.build_date) {
        (Some(version), Some(date)) => {
            let _ = writeln!(out, "firmware:  {} (built {})", version, date);
        }
        (Some(version), None) => {
            let _ = writeln!(out, "firmware:  {}", version);
        }
        _ => {}
    }
    if let Some(board) = &outcome.device.board {
        let _ = writeln!(out, "board:     {}", board);
    }
    let _ = writeln!(out, "catalog:   v{}", outcome.catalog_version);
    let _ = writeln!(
        out,
        "captured:  {}",
        outcome.before.captured_at().to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    out.push('\n');
    out.push_str(&outcome.report.render_text());

    if !outcome.changes.is_empty() {
        out.push_str("\nchanged:\n");
        for change in &outcome.changes {
            let _ = writeln!(
                out,
                "  {}: {} -> {}",
                change.key,
                show(&change.before),
                show(&change.after)
            );
        }
    }
    Ok(out)
}

fn show(value: &Option<ConfigValue>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_else(|| "-".to_string())
}

/// Render a key catalog.
pub fn render_catalog(catalog: &KeyCatalog, format: OutputFormat) -> Result<String> {
    if let Some(out) = structured(catalog, format)? {
        return Ok(out);
    }

    let width = catalog.names().map(str::len).max().unwrap_or(3).max(3);
    let mut out = format!("catalog v{} ({} keys)\n", catalog.version(), catalog.len());
    for key in catalog.keys() {
        let mut line = format!(
            "  {:<width$}  {}  {}",
            key.name(),
            key.access(),
            key.domain(),
            width = width
        );
        if !key.prerequisites().is_empty() {
            let _ = write!(line, "  (requires {})", key.prerequisites().join(", "));
        }
        if !key.description().is_empty() {
            let _ = write!(line, "  {}", key.description());
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    Ok(out)
}

/// Render a list of serial ports.
pub fn render_ports(ports: &[SerialPortInfo], format: OutputFormat) -> Result<String> {
    if let Some(out) = structured(&ports, format)? {
        return Ok(out);
    }
    if ports.is_empty() {
        return Ok("no serial ports found\n".to_string());
    }

    let mut out = String::new();
    for port in ports {
        let _ = write!(out, "{}", port.port_name);
        if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            let _ = write!(out, "  {:04x}:{:04x}", vid, pid);
        }
        if let Some(product) = &port.product {
            let _ = write!(out, "  {}", product);
        }
        if port.is_espressif() {
            out.push_str("  [espressif]");
        }
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_text_lists_every_key() {
        let catalog = KeyCatalog::esp32c6();
        let text = render_catalog(&catalog, OutputFormat::Text).unwrap();
        assert!(text.starts_with("catalog v1 (12 keys)"));
        assert_eq!(text.lines().count(), 13);
        let gap = text.lines().find(|l| l.trim_start().starts_with("gap_name")).unwrap();
        assert!(gap.contains("requires ble.active"));
        let mac = text.lines().find(|l| l.trim_start().starts_with("mac")).unwrap();
        assert!(mac.contains(" ro "));
    }

    #[test]
    fn test_outcome_text_header() {
        use c6probe_device::{DeviceInfo, Report};
        use c6probe_model::ConfigSnapshot;
        use chrono::{TimeZone, Utc};

        let catalog = KeyCatalog::esp32c6();
        let at = Utc.with_ymd_and_hms(2024, 11, 29, 8, 30, 5).unwrap();
        let before = ConfigSnapshot::capture_at(
            at,
            catalog.keys(),
            vec![("channel".to_string(), ConfigValue::Integer(3))],
        )
        .unwrap();
        let outcome = RunOutcome {
            endpoint: "simulated".to_string(),
            catalog_version: 1,
            device: DeviceInfo {
                version: Some("v1.24.1".to_string()),
                build_date: Some("2024-11-29".to_string()),
                board: None,
            },
            before,
            after: None,
            changes: Vec::new(),
            report: Report::default(),
        };

        let text = render_outcome(&outcome, OutputFormat::Text).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "endpoint:  simulated");
        assert_eq!(lines[1], "firmware:  v1.24.1 (built 2024-11-29)");
        assert_eq!(lines[2], "catalog:   v1");
        assert_eq!(lines[3], "captured:  2024-11-29T08:30:05Z");
    }

    #[test]
    fn test_catalog_yaml_reloads() {
        let catalog = KeyCatalog::esp32c6();
        let yaml = render_catalog(&catalog, OutputFormat::Yaml).unwrap();
        assert_eq!(KeyCatalog::from_yaml_str(&yaml).unwrap(), catalog);
    }

    #[test]
    fn test_ports() {
        let ports = vec![
            SerialPortInfo {
                port_name: "/dev/ttyACM0".to_string(),
                vid: Some(0x303a),
                pid: Some(0x1001),
                serial_number: None,
                manufacturer: Some("Espressif".to_string()),
                product: Some("USB JTAG/serial debug unit".to_string()),
            },
            SerialPortInfo {
                port_name: "/dev/ttyS0".to_string(),
                vid: None,
                pid: None,
                serial_number: None,
                manufacturer: None,
                product: None,
            },
        ];
        let text = render_ports(&ports, OutputFormat::Text).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "/dev/ttyACM0  303a:1001  USB JTAG/serial debug unit  [espressif]");
        assert_eq!(lines[1], "/dev/ttyS0");

        assert_eq!(render_ports(&[], OutputFormat::Text).unwrap(), "no serial ports found\n");
        let json = render_ports(&ports, OutputFormat::Json).unwrap();
        assert!(json.contains("\"port_name\": \"/dev/ttyACM0\""));
    }
}
