use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    /// Occupants may leave or stay
    #[default]
    Transient,
    /// Occupants never leave (death)
    Absorbing,
    /// Occupants stay a fixed number of cycles, then must exit
    Tunnel,
}

fn default_utility() -> f64 {
    1.0
}

/// A declared health state. Costs and utilities are per cycle and per
/// occupant; `one_time_cost` is charged on entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthState {
    pub name: String,
    #[serde(default, alias = "state_type")]
    pub kind: StateKind,
    #[serde(default)]
    pub cost: f64,
    #[serde(default = "default_utility")]
    pub utility: f64,
    #[serde(default)]
    pub one_time_cost: f64,
    /// Number of cycles spent in a tunnel state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel_length: Option<u32>,
}

impl HealthState {
    pub fn transient(name: impl Into<String>, cost: f64, utility: f64) -> Self {
        Self {
            name: name.into(),
            kind: StateKind::Transient,
            cost,
            utility,
            one_time_cost: 0.0,
            tunnel_length: None,
        }
    }

    pub fn absorbing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StateKind::Absorbing,
            cost: 0.0,
            utility: 0.0,
            one_time_cost: 0.0,
            tunnel_length: None,
        }
    }

    pub fn tunnel(name: impl Into<String>, length: u32, cost: f64, utility: f64) -> Self {
        Self {
            name: name.into(),
            kind: StateKind::Tunnel,
            cost,
            utility,
            one_time_cost: 0.0,
            tunnel_length: Some(length),
        }
    }

    #[must_use]
    pub fn with_one_time_cost(mut self, cost: f64) -> Self {
        self.one_time_cost = cost;
        self
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.kind != StateKind::Absorbing
    }

    /// Internal sub-states the engine allocates for this state
    #[must_use]
    pub fn span(&self) -> usize {
        match self.kind {
            StateKind::Tunnel => self.tunnel_length.unwrap_or(1).max(1) as usize,
            _ => 1,
        }
    }
}
