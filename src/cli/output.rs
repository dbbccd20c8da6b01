//! Output formatting utilities
//!
//! Provides table and JSON output formatting for CLI commands.

use crate::cli::args::OutputFormat;
use crate::domain::{
    AcousticLimits, DecisionEvent, FanConstraints, GpuInfo, PowerConstraints, PowerLimit,
};
use crate::services::TickReport;
use serde::Serialize;
use std::io::{self, Write};

/// Format and print output based on the selected format
pub fn print_output<T: Serialize + TableDisplay>(data: &T, format: OutputFormat) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();

    match format {
        OutputFormat::Table => {
            writeln!(handle, "{}", data.to_table())?;
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
            writeln!(handle, "{}", json)?;
        }
        OutputFormat::Compact => {
            writeln!(handle, "{}", data.to_compact())?;
        }
    }

    Ok(())
}

/// Trait for types that can be displayed as a table
pub trait TableDisplay {
    /// Format as a table string
    fn to_table(&self) -> String;

    /// Format as a compact single line
    fn to_compact(&self) -> String {
        self.to_table().trim_end().replace('\n', " | ")
    }
}

/// GPU list entry for display
#[derive(Debug, Clone, Serialize)]
pub struct GpuListEntry {
    pub index: u32,
    pub name: String,
    pub uuid: String,
    pub fans: u32,
}

impl From<&GpuInfo> for GpuListEntry {
    fn from(info: &GpuInfo) -> Self {
        Self {
            index: info.index,
            name: info.name.clone(),
            uuid: info.uuid.clone(),
            fans: info.fan_count,
        }
    }
}

impl TableDisplay for GpuListEntry {
    fn to_table(&self) -> String {
        format!(
            "[{}] {} (Fans: {}, UUID: {})",
            self.index, self.name, self.fans, self.uuid
        )
    }

    fn to_compact(&self) -> String {
        format!("{}:{}", self.index, self.name)
    }
}

/// GPU list for display
#[derive(Debug, Clone, Serialize)]
pub struct GpuList {
    pub gpus: Vec<GpuListEntry>,
    pub driver_version: String,
}

impl TableDisplay for GpuList {
    fn to_table(&self) -> String {
        let mut output = format!("Driver Version: {}\n", self.driver_version);
        output.push_str(&format!("GPUs Found: {}\n\n", self.gpus.len()));

        for gpu in &self.gpus {
            output.push_str(&gpu.to_table());
            output.push('\n');
        }

        output
    }

    fn to_compact(&self) -> String {
        self.gpus
            .iter()
            .map(|g| g.to_compact())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Fan section of a GPU report
#[derive(Debug, Clone, Serialize)]
pub struct FanStatus {
    /// Speed the driver reports for the device as a whole
    pub aggregate_speed: u8,
    pub min_speed: Option<u8>,
    pub max_speed: Option<u8>,
    pub fans: Vec<FanInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FanInfo {
    pub index: u32,
    pub speed: u8,
    pub policy: String,
}

impl FanStatus {
    pub fn with_constraints(mut self, constraints: Option<FanConstraints>) -> Self {
        self.min_speed = constraints.map(|c| c.min.as_percentage());
        self.max_speed = constraints.map(|c| c.max.as_percentage());
        self
    }
}

impl TableDisplay for FanStatus {
    fn to_table(&self) -> String {
        let mut output = format!("  Fan Speed: {}%\n", self.aggregate_speed);

        if let (Some(min), Some(max)) = (self.min_speed, self.max_speed) {
            output.push_str(&format!("  Range: {}% - {}%\n", min, max));
        }

        for fan in &self.fans {
            output.push_str(&format!(
                "  Fan {}: {}% ({})\n",
                fan.index, fan.speed, fan.policy
            ));
        }

        output
    }
}

/// Power section of a GPU report
#[derive(Debug, Clone, Serialize)]
pub struct PowerStatus {
    pub limit_watts: u32,
    pub enforced_watts: u32,
    pub min_limit_watts: u32,
    pub max_limit_watts: u32,
}

impl PowerStatus {
    pub fn new(limit: PowerLimit, enforced: PowerLimit, constraints: PowerConstraints) -> Self {
        Self {
            limit_watts: limit.as_watts(),
            enforced_watts: enforced.as_watts(),
            min_limit_watts: constraints.min.as_watts(),
            max_limit_watts: constraints.max.as_watts(),
        }
    }
}

impl TableDisplay for PowerStatus {
    fn to_table(&self) -> String {
        format!(
            "  Power Limit: {}W\n  Enforced Limit: {}W\n  Range: {}W - {}W\n",
            self.limit_watts, self.enforced_watts, self.min_limit_watts, self.max_limit_watts
        )
    }
}

/// Acoustic threshold section of a GPU report
#[derive(Debug, Clone, Serialize)]
pub struct AcousticStatus {
    pub acoustic_current: i32,
    pub acoustic_min: i32,
    pub acoustic_max: i32,
}

impl From<AcousticLimits> for AcousticStatus {
    fn from(limits: AcousticLimits) -> Self {
        Self {
            acoustic_current: limits.current.as_celsius(),
            acoustic_min: limits.min.as_celsius(),
            acoustic_max: limits.max.as_celsius(),
        }
    }
}

impl TableDisplay for AcousticStatus {
    fn to_table(&self) -> String {
        format!(
            "  Acoustic Temperature Limit: {}°C\n    Range: {}°C - {}°C\n",
            self.acoustic_current, self.acoustic_min, self.acoustic_max
        )
    }
}

/// One GPU with the requested sections
///
/// A requested section the device does not support is reported as
/// unsupported rather than failing the whole report.
#[derive(Debug, Clone, Serialize)]
pub struct GpuReport {
    pub index: u32,
    pub name: String,
    pub uuid: String,
    pub temperature: i32,
    #[serde(skip_serializing_if = "Section::is_skipped")]
    pub fan: Section<FanStatus>,
    #[serde(skip_serializing_if = "Section::is_skipped")]
    pub power: Section<PowerStatus>,
    #[serde(skip_serializing_if = "Section::is_skipped")]
    pub thermal: Section<AcousticStatus>,
}

/// A report section
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Section<T> {
    /// Not requested
    Skipped,
    /// Requested but not available on this device
    Unsupported,
    Shown(T),
}

impl<T> Section<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Section::Skipped)
    }
}

impl<T: TableDisplay> Section<T> {
    fn render(&self, title: &str, output: &mut String) {
        match self {
            Section::Skipped => {}
            Section::Unsupported => output.push_str(&format!("  {}: Not supported\n", title)),
            Section::Shown(section) => output.push_str(&section.to_table()),
        }
    }
}

impl TableDisplay for GpuReport {
    fn to_table(&self) -> String {
        let mut output = format!("[{}] {} ({})\n", self.index, self.name, self.uuid);
        output.push_str(&format!("  Temperature: {}°C\n", self.temperature));

        self.fan.render("Fans", &mut output);
        self.power.render("Power", &mut output);
        self.thermal.render("Acoustic Limit", &mut output);

        output
    }
}

/// Decisions from one control tick
#[derive(Debug, Clone, Serialize)]
pub struct TickOutput {
    pub device: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<i32>,
    pub events: Vec<DecisionEvent>,
}

impl From<&TickReport> for TickOutput {
    fn from(report: &TickReport) -> Self {
        Self {
            device: report
                .events
                .first()
                .map(|e| e.device.clone())
                .unwrap_or_default(),
            temperature: report.snapshot.temperature.map(|t| t.as_celsius()),
            events: report.events.clone(),
        }
    }
}

impl TableDisplay for TickOutput {
    fn to_table(&self) -> String {
        let mut output = match self.temperature {
            Some(temperature) => format!("{} at {}°C\n", self.device, temperature),
            None => format!("{}\n", self.device),
        };
        for event in &self.events {
            output.push_str(&format!(
                "  {}: {} ({})\n",
                event.domain, event.decision, event.mode
            ));
            if let Some(warning) = &event.warning {
                output.push_str(&format!("    warning: {}\n", warning));
            }
        }
        output
    }
}

/// Simple message output
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub message: String,
    pub success: bool,
}

impl TableDisplay for Message {
    fn to_table(&self) -> String {
        if self.success {
            format!("✓ {}", self.message)
        } else {
            format!("✗ {}", self.message)
        }
    }
}
