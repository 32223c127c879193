use crate::core_modules::sop_plan::SopPlan;
use crate::core_modules::source::FrameGeometry;
use crate::core_modules::verifier::VerificationStateMachine;
use crate::core_modules::zone::{Bounds, Zone, ZoneRegistry};
use crate::error::ConfigurationError;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides, e.g. `SOP_ALERT_COOLDOWN_MS=1500`.
const ENV_PREFIX: &str = "SOP";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    pub top_left: [f64; 2],
    pub bottom_right: [f64; 2],
}

impl ZoneConfig {
    fn new(name: &str, top_left: [f64; 2], bottom_right: [f64; 2]) -> Self {
        Self {
            name: name.to_string(),
            top_left,
            bottom_right,
        }
    }
}

impl From<&ZoneConfig> for Zone {
    fn from(zone: &ZoneConfig) -> Self {
        Zone::new(
            zone.name.clone(),
            Bounds::new(
                (zone.top_left[0], zone.top_left[1]),
                (zone.bottom_right[0], zone.bottom_right[1]),
            ),
        )
    }
}

/// Static description of one work station: its zones, its procedure and tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Zones in display order.
    pub zones: Vec<ZoneConfig>,
    /// Each step lists the zones that must all be touched.
    pub steps: Vec<Vec<String>>,
    /// Minimum time between two out-of-sequence alerts.
    pub alert_cooldown_ms: u64,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Capacity of the observation queue in front of the state machine.
    pub queue_capacity: usize,
    /// Operator instructions shown next to the status board.
    pub instructions: Vec<String>,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            zones: vec![
                ZoneConfig::new("box1", [50.0, 50.0], [250.0, 250.0]),
                ZoneConfig::new("box2", [50.0, 300.0], [250.0, 500.0]),
                ZoneConfig::new("box3", [300.0, 50.0], [500.0, 250.0]),
                ZoneConfig::new("box4", [300.0, 300.0], [500.0, 500.0]),
            ],
            steps: vec![
                vec!["box1".to_string()],
                vec!["box2".to_string(), "box3".to_string()],
                vec!["box4".to_string()],
            ],
            alert_cooldown_ms: 1000,
            frame_width: 640,
            frame_height: 480,
            queue_capacity: 64,
            instructions: vec![
                "Place the oilcooler in the designated area.".to_string(),
                "Position the gasket correctly.".to_string(),
                "Ensure the casing is aligned properly.".to_string(),
                "Click 'Start Verification' to begin the process.".to_string(),
            ],
        }
    }
}

impl StationConfig {
    /// Loads a station file (TOML, JSON, YAML...) and applies `SOP_*` environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigurationError> {
        let settings = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn zone_registry(&self) -> Result<ZoneRegistry, ConfigurationError> {
        ZoneRegistry::new(self.zones.iter().map(Zone::from))
    }

    pub fn sop_plan(&self, registry: &ZoneRegistry) -> Result<SopPlan, ConfigurationError> {
        SopPlan::new(registry, &self.steps)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_millis(self.alert_cooldown_ms)
    }

    pub fn frame_geometry(&self) -> Result<FrameGeometry, ConfigurationError> {
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ConfigurationError::InvalidFrame {
                width: self.frame_width,
                height: self.frame_height,
            });
        }
        Ok(FrameGeometry::new(self.frame_width, self.frame_height))
    }

    /// Validates the registry and plan and builds an idle state machine.
    pub fn build_state_machine(&self) -> Result<VerificationStateMachine, ConfigurationError> {
        let registry = self.zone_registry()?;
        let plan = self.sop_plan(&registry)?;
        VerificationStateMachine::new(registry, plan, self.alert_cooldown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_station_builds() {
        let machine = StationConfig::default().build_state_machine().expect("reference station");
        assert_eq!(machine.registry().len(), 4);
        assert_eq!(machine.plan().step_count(), 3);
        assert_eq!(machine.alert_cooldown(), Duration::from_secs(1));
    }

    #[test]
    fn loads_station_from_toml() {
        let config = StationConfig::from_toml_str(
            r#"
            alert_cooldown_ms = 1500
            frame_width = 1280
            frame_height = 720
            steps = [["bin"], ["press", "jig"]]

            [[zones]]
            name = "bin"
            top_left = [0, 0]
            bottom_right = [100.5, 100]

            [[zones]]
            name = "press"
            top_left = [200, 0]
            bottom_right = [300, 100]

            [[zones]]
            name = "jig"
            top_left = [400, 0]
            bottom_right = [500, 100]
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.alert_cooldown(), Duration::from_millis(1500));
        assert_eq!(config.frame_geometry().unwrap(), FrameGeometry::new(1280, 720));
        assert_eq!(config.zones[0].bottom_right, [100.5, 100.0]);
        assert_eq!(config.queue_capacity, StationConfig::default().queue_capacity);

        let machine = config.build_state_machine().unwrap();
        assert_eq!(machine.registry().names().collect::<Vec<_>>(), vec!["bin", "press", "jig"]);
    }

    #[test]
    fn unknown_zone_in_steps_fails_construction() {
        let mut config = StationConfig::default();
        config.steps.push(vec!["box9".to_string()]);
        assert!(matches!(config.build_state_machine(), Err(ConfigurationError::InvalidPlan(_))));
    }

    #[test]
    fn zero_sized_frame_is_rejected() {
        let config = StationConfig {
            frame_width: 0,
            ..StationConfig::default()
        };
        assert!(matches!(config.frame_geometry(), Err(ConfigurationError::InvalidFrame { .. })));
    }

    #[test]
    fn malformed_toml_is_a_load_error() {
        let result = StationConfig::from_toml_str("alert_cooldown_ms = \"soon\"");
        assert!(matches!(result, Err(ConfigurationError::Load(_))));
    }
}
