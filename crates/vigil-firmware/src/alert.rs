//! Rider alerts.
//!
//! Alerts are rendered as one JSON object per line on the log channel, with
//! the field names the monitoring backend expects (`userId`, `alertType`,
//! `lastBPM`, ...). Delivery beyond the channel is not handled here.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Urgency of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertLevel {
    #[serde(rename = "SOS")]
    Sos,
    #[serde(rename = "Non-Critical")]
    NonCritical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Sos => "SOS",
            AlertLevel::NonCritical => "Non-Critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertKind {
    HeartBeatAnomaly {
        last_bpm: f32,
        avg_bpm: f32,
        message: Option<String>,
    },
    Collision { severity: String },
    ModuleFailure { module_name: String },
}

impl AlertKind {
    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::HeartBeatAnomaly { .. } => "Heart Beat Anomaly",
            AlertKind::Collision { .. } => "Collision",
            AlertKind::ModuleFailure { .. } => "Module Failure",
        }
    }

    fn message(&self) -> String {
        match self {
            AlertKind::HeartBeatAnomaly { message, .. } => message
                .clone()
                .unwrap_or_else(|| "Heart rate anomaly detected.".to_string()),
            AlertKind::Collision { .. } => "Severe collision detected!".to_string(),
            AlertKind::ModuleFailure { module_name } => format!("Module issue detected in {}.", module_name),
        }
    }
}

/// Who and where the alert is about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub user_id: String,
    pub gps_location: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            user_id: "unassigned".to_string(),
            gps_location: "unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub level: AlertLevel,
    pub kind: AlertKind,
    pub user_id: String,
    pub gps_location: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl Alert {
    pub fn new(level: AlertLevel, kind: AlertKind, device: &DeviceInfo, timestamp: DateTime<Utc>) -> Self {
        let message = kind.message();
        Self {
            level,
            kind,
            user_id: device.user_id.clone(),
            gps_location: device.gps_location.clone(),
            timestamp,
            message,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut value = json!({
            "type": self.level,
            "userId": self.user_id,
            "gpsLocation": self.gps_location,
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            "alertType": self.kind.label(),
            "message": self.message,
        });
        let extra = match &self.kind {
            AlertKind::HeartBeatAnomaly { last_bpm, avg_bpm, .. } => {
                json!({ "lastBPM": last_bpm, "avgBPM": avg_bpm })
            }
            AlertKind::Collision { severity } => json!({ "collisionSeverity": severity }),
            AlertKind::ModuleFailure { module_name } => json!({ "moduleName": module_name }),
        };
        if let (Some(obj), Value::Object(extra)) = (value.as_object_mut(), extra) {
            obj.extend(extra);
        }
        value
    }

    /// Single-line JSON for the log channel.
    pub fn to_json_line(&self) -> String {
        self.to_json().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartRateStatus {
    Low,
    Normal,
    High,
}

/// Flags heart rates outside `[low, high]` bpm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartRateMonitor {
    pub low: f32,
    pub high: f32,
}

impl Default for HeartRateMonitor {
    fn default() -> Self {
        Self { low: 40.0, high: 150.0 }
    }
}

impl HeartRateMonitor {
    pub fn new(low: f32, high: f32) -> Self {
        Self { low, high }
    }

    pub fn classify(&self, bpm: f32) -> HeartRateStatus {
        if bpm < self.low {
            HeartRateStatus::Low
        } else if bpm > self.high {
            HeartRateStatus::High
        } else {
            HeartRateStatus::Normal
        }
    }

    /// An anomaly for `last_bpm`, if any.
    pub fn check(&self, last_bpm: f32, avg_bpm: f32) -> Option<AlertKind> {
        let message = match self.classify(last_bpm) {
            HeartRateStatus::Normal => return None,
            HeartRateStatus::Low => format!("Heart rate below {} bpm.", self.low),
            HeartRateStatus::High => format!("Heart rate above {} bpm.", self.high),
        };
        Some(AlertKind::HeartBeatAnomaly {
            last_bpm,
            avg_bpm,
            message: Some(message),
        })
    }
}
