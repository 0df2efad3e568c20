#![forbid(unsafe_code)]

//! Tour scripts: steps, triggers, and the validated [`TourConfig`].

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use nostour_core::geometry::Placement;

use crate::progress;

/// Default spotlight padding in CSS pixels.
pub const DEFAULT_SPOTLIGHT_PADDING: f64 = 8.0;

/// Predicate that must hold before a step may be left.
pub type StepValidator = Arc<dyn Fn() -> bool>;

/// Callback run when a step's expected action fires.
pub type ActionCallback = Arc<dyn Fn(&str, Option<&serde_json::Value>)>;

/// How a step advances.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Trigger {
    /// The user clicks Next or presses a key.
    #[default]
    Manual,
    /// A named action reported by the simulator.
    Action { action_type: String },
}

impl Trigger {
    /// The expected action type, if any.
    pub fn action_type(&self) -> Option<&str> {
        match self {
            Trigger::Manual => None,
            Trigger::Action { action_type } => Some(action_type),
        }
    }

    /// Whether this trigger waits for an action.
    pub fn is_action(&self) -> bool {
        matches!(self, Trigger::Action { .. })
    }
}

/// One stop in a tour.
#[derive(Clone)]
pub struct TourStep {
    pub id: String,
    /// CSS selector of the anchor element.
    pub target: String,
    pub title: String,
    pub content: String,
    pub placement: Placement,
    pub spotlight_padding: f64,
    pub trigger: Trigger,
    validate: Option<StepValidator>,
    on_action: Option<ActionCallback>,
}

impl TourStep {
    /// A manual step with default placement and padding.
    pub fn new(
        id: impl Into<String>,
        target: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            title: title.into(),
            content: content.into(),
            placement: Placement::default(),
            spotlight_padding: DEFAULT_SPOTLIGHT_PADDING,
            trigger: Trigger::Manual,
            validate: None,
            on_action: None,
        }
    }

    #[must_use]
    pub fn placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    #[must_use]
    pub fn padding(mut self, padding: f64) -> Self {
        self.spotlight_padding = padding.max(0.0);
        self
    }

    /// Make the step wait for `action_type`.
    #[must_use]
    pub fn on_action_type(mut self, action_type: impl Into<String>) -> Self {
        self.trigger = Trigger::Action {
            action_type: action_type.into(),
        };
        self
    }

    /// Require `validate` to return true before leaving the step.
    #[must_use]
    pub fn validate(mut self, validate: impl Fn() -> bool + 'static) -> Self {
        self.validate = Some(Arc::new(validate));
        self
    }

    /// Run `callback` when the expected action fires.
    #[must_use]
    pub fn on_action(
        mut self,
        callback: impl Fn(&str, Option<&serde_json::Value>) + 'static,
    ) -> Self {
        self.on_action = Some(Arc::new(callback));
        self
    }

    /// Evaluate the validator; steps without one always pass.
    pub fn is_valid(&self) -> bool {
        self.validate.as_ref().is_none_or(|validate| validate())
    }

    pub(crate) fn fire_on_action(&self, action_type: &str, data: Option<&serde_json::Value>) {
        if let Some(callback) = &self.on_action {
            callback(action_type, data);
        }
    }
}

impl fmt::Debug for TourStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TourStep")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("placement", &self.placement)
            .field("trigger", &self.trigger)
            .field("validate", &self.validate.is_some())
            .field("on_action", &self.on_action.is_some())
            .finish()
    }
}

/// Rejected tour script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The tour id is empty or whitespace.
    BlankTourId,
    /// The tour has no steps.
    NoSteps { tour_id: String },
    /// Two steps share an id.
    DuplicateStepId { tour_id: String, step_id: String },
    /// An action step names no action.
    BlankActionType { tour_id: String, step_id: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::BlankTourId => write!(f, "tour id must not be blank"),
            ConfigError::NoSteps { tour_id } => write!(f, "tour '{tour_id}' has no steps"),
            ConfigError::DuplicateStepId { tour_id, step_id } => {
                write!(f, "tour '{tour_id}' has duplicate step id '{step_id}'")
            }
            ConfigError::BlankActionType { tour_id, step_id } => {
                write!(f, "step '{step_id}' of tour '{tour_id}' has a blank action type")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// An immutable, validated tour. Cloning shares the steps.
#[derive(Debug, Clone)]
pub struct TourConfig {
    id: String,
    steps: Arc<[TourStep]>,
}

impl TourConfig {
    /// Start building a tour with the given id.
    pub fn builder(id: impl Into<String>) -> TourConfigBuilder {
        TourConfigBuilder {
            id: id.into(),
            steps: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Key under which this tour's progress is stored.
    pub fn storage_key(&self) -> String {
        progress::storage_key(&self.id)
    }

    pub fn steps(&self) -> &[TourStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&TourStep> {
        self.steps.get(index)
    }

    /// Number of steps, never zero.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false: a built config has at least one step.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Index of the step with `id`.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }
}

/// Builder for [`TourConfig`].
#[derive(Debug)]
pub struct TourConfigBuilder {
    id: String,
    steps: Vec<TourStep>,
}

impl TourConfigBuilder {
    #[must_use]
    pub fn step(mut self, step: TourStep) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn steps(mut self, steps: impl IntoIterator<Item = TourStep>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Validate and freeze the script.
    pub fn build(self) -> Result<TourConfig, ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::BlankTourId);
        }
        if self.steps.is_empty() {
            return Err(ConfigError::NoSteps { tour_id: self.id });
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(ConfigError::DuplicateStepId {
                    tour_id: self.id.clone(),
                    step_id: step.id.clone(),
                });
            }
            if step.trigger.action_type().is_some_and(|a| a.trim().is_empty()) {
                return Err(ConfigError::BlankActionType {
                    tour_id: self.id.clone(),
                    step_id: step.id.clone(),
                });
            }
        }
        Ok(TourConfig {
            id: self.id,
            steps: self.steps.into(),
        })
    }
}
