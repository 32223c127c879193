// THEORY:
// The `SopPlan` is the written procedure turned into data: an ordered list of steps,
// each one a set of zones that must all be touched before the operator may move on.
//
// Key architectural principles:
// 1.  **Fail Fast**: A plan is validated against its `ZoneRegistry` when it is built.
//     An empty plan, an empty step or a name the registry does not know about makes
//     construction fail with `InvalidPlan`, so the state machine never has to cope
//     with a bad reference at runtime.
// 2.  **One Visit per Cycle**: A zone's touched flag only ever goes from false to true
//     within a cycle. A zone listed in two different steps would leave the later step
//     satisfied the moment it became current, so such plans are rejected too.
// 3.  **Set Semantics**: Within a step the order of zones is irrelevant and repeated
//     names collapse into one requirement.

use crate::core_modules::zone::{ZoneId, ZoneRegistry};
use crate::error::ConfigurationError;
use std::collections::HashMap;

/// A single mandatory step: every zone in `required_zones` must be touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SopStep {
    /// Sorted by registry order, no duplicates.
    required_zones: Vec<ZoneId>,
}

impl SopStep {
    pub fn required_zones(&self) -> &[ZoneId] {
        &self.required_zones
    }

    pub fn requires(&self, zone: ZoneId) -> bool {
        self.required_zones.binary_search(&zone).is_ok()
    }
}

/// The immutable, validated sequence of steps for one station.
#[derive(Debug, Clone)]
pub struct SopPlan {
    steps: Vec<SopStep>,
}

impl SopPlan {
    pub fn new<S: AsRef<str>>(registry: &ZoneRegistry, steps: &[Vec<S>]) -> Result<Self, ConfigurationError> {
        if steps.is_empty() {
            return Err(ConfigurationError::InvalidPlan("the plan has no steps".to_string()));
        }

        let mut first_use: HashMap<ZoneId, usize> = HashMap::new();
        let mut validated = Vec::with_capacity(steps.len());

        for (step_index, names) in steps.iter().enumerate() {
            if names.is_empty() {
                return Err(ConfigurationError::InvalidPlan(format!(
                    "step {step_index} requires no zones"
                )));
            }

            let mut required_zones = Vec::with_capacity(names.len());
            for name in names {
                let name = name.as_ref();
                let id = registry.lookup(name).map_err(|_| {
                    ConfigurationError::InvalidPlan(format!(
                        "step {step_index} references unknown zone `{name}`"
                    ))
                })?;
                required_zones.push(id);
            }
            required_zones.sort_unstable();
            required_zones.dedup();

            for &id in &required_zones {
                if let Some(earlier) = first_use.insert(id, step_index) {
                    return Err(ConfigurationError::InvalidPlan(format!(
                        "zone `{}` is required by both step {earlier} and step {step_index}",
                        registry.name(id)
                    )));
                }
            }

            validated.push(SopStep { required_zones });
        }

        Ok(Self { steps: validated })
    }

    pub fn step_at(&self, index: usize) -> Result<&SopStep, ConfigurationError> {
        self.steps.get(index).ok_or(ConfigurationError::StepIndexOutOfRange {
            index,
            len: self.steps.len(),
        })
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn steps(&self) -> &[SopStep] {
        &self.steps
    }
}
