//! The model engine collaborator surface.
//!
//! An engine is the concrete simulation implementation wrapped by the
//! adapter. The adapter is a pure consumer of this surface and performs no
//! computation of its own beyond bookkeeping and validation. Concrete
//! engines live outside this crate; they are resolved at initialize time by
//! matching a discriminator in the configuration against the closed set of
//! [`EngineKind`] variants and constructed through an [`EngineRegistry`].

use crate::array::ModelArray;
use crate::config::AdapterConfig;
use crate::errors::{BmiError, BmiResult};
use crate::grid::{CoordinateAxis, GridDimensions, GridType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Role of a variable relative to the engine's computation.
///
/// The numeric codes mirror the engine-side convention: 0 = input,
/// 1 = output, 2 = input/output (state), 3 = model parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarRole {
    Input,
    Output,
    State,
    Parameter,
}

impl VarRole {
    pub fn from_code(code: u8) -> Option<VarRole> {
        match code {
            0 => Some(VarRole::Input),
            1 => Some(VarRole::Output),
            2 => Some(VarRole::State),
            3 => Some(VarRole::Parameter),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            VarRole::Input => 0,
            VarRole::Output => 1,
            VarRole::State => 2,
            VarRole::Parameter => 3,
        }
    }

    /// State variables are read at the start of a step, so they count as
    /// inputs alongside forcing variables.
    pub fn is_input(&self) -> bool {
        matches!(self, VarRole::Input | VarRole::State)
    }

    /// State variables are written across a step, so they count as outputs
    /// as well.
    pub fn is_output(&self) -> bool {
        matches!(self, VarRole::Output | VarRole::State)
    }
}

/// Capability interface implemented by concrete model engines.
///
/// Step counting is 1-based and `run_steps` is inclusive on both ends:
/// `run_steps(n, n)` executes exactly one step.
pub trait ModelEngine {
    /// Run the engine's startup phase (initial section of the model).
    fn startup(&mut self) -> BmiResult<()>;

    /// Resume from a previously suspended state where one exists.
    fn resume(&mut self) -> BmiResult<()>;

    /// Advance the model from `from_step` to `to_step` inclusive.
    fn run_steps(&mut self, from_step: u64, to_step: u64) -> BmiResult<()>;

    /// Persist a complete, self-sufficient checkpoint into `directory` in
    /// the engine's native on-disk representation.
    fn suspend(&mut self, directory: &Path) -> BmiResult<()>;

    /// Persist a checkpoint to the engine's own configured state location.
    fn suspend_default(&mut self) -> BmiResult<()>;

    /// Release all engine resources.
    fn shutdown(&mut self) -> BmiResult<()>;

    /// The (name, role) pairs for every variable the engine exposes.
    fn variables(&self) -> Vec<(String, VarRole)>;

    /// The current values for a variable, in the engine's canonical
    /// ordering.
    fn array(&self, name: &str) -> BmiResult<ModelArray>;

    /// Replace the values for a variable.
    fn set_array(&mut self, name: &str, values: ModelArray) -> BmiResult<()>;

    /// UDUNITS-style time units/epoch string, fixed per engine instance.
    fn epoch(&self) -> String;

    fn start_time(&self) -> f64;
    fn current_time(&self) -> f64;
    fn end_time(&self) -> f64;

    /// Fixed duration of one engine step, in the units of [`epoch`].
    ///
    /// [`epoch`]: ModelEngine::epoch
    fn time_step(&self) -> f64;

    /// Declared grid classification for a variable.
    fn grid_type(&self, name: &str) -> GridType;

    /// Dimensions of the model grid.
    fn grid_dimensions(&self) -> BmiResult<GridDimensions>;

    /// Cell-center coordinates along one axis, index-aligned with the
    /// canonical value ordering of [`array`].
    ///
    /// [`array`]: ModelEngine::array
    fn grid_coordinates(&self, axis: CoordinateAxis) -> BmiResult<Vec<f64>>;
}

impl std::fmt::Debug for dyn ModelEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelEngine").finish_non_exhaustive()
    }
}

/// The closed set of known engine variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineKind {
    /// Soil-moisture based rainfall-runoff concept
    Sbm,
    /// HBV rainfall-runoff concept
    Hbv,
    /// Kinematic-wave river routing
    Routing,
}

impl EngineKind {
    /// Resolve the engine kind from the configuration file basename.
    ///
    /// Matching is by substring, so `sbm.ini`, `case_sbm.toml` and the like
    /// all resolve to [`EngineKind::Sbm`]. `routing` is tested before `hbv`
    /// and `sbm` so a more specific name cannot be shadowed by an engine
    /// variant embedded in a case name.
    pub fn from_config(config: &AdapterConfig) -> BmiResult<EngineKind> {
        let file_name = config.file_name()?;
        if file_name.contains("routing") {
            Ok(EngineKind::Routing)
        } else if file_name.contains("sbm") {
            Ok(EngineKind::Sbm)
        } else if file_name.contains("hbv") {
            Ok(EngineKind::Hbv)
        } else {
            Err(BmiError::Configuration(format!(
                "cannot resolve an engine variant from configuration file '{}'",
                file_name
            )))
        }
    }

    /// Model identifier reported as the adapter's component name.
    pub fn model_name(&self) -> &'static str {
        match self {
            EngineKind::Sbm => "sbm",
            EngineKind::Hbv => "hbv",
            EngineKind::Routing => "routing",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.model_name())
    }
}

/// Constructor closure producing a fresh engine instance from a
/// configuration.
pub type EngineConstructor = Box<dyn Fn(&AdapterConfig) -> BmiResult<Box<dyn ModelEngine>>>;

/// Maps engine kinds to the constructors for their concrete
/// implementations.
///
/// Concrete engines are external to this crate, so the driving application
/// registers one constructor per kind it supports before creating adapters.
#[derive(Default)]
pub struct EngineRegistry {
    constructors: HashMap<EngineKind, EngineConstructor>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the constructor for an engine kind.
    ///
    /// Registering the same kind twice is rejected so a later registration
    /// cannot silently replace an earlier one.
    pub fn register(&mut self, kind: EngineKind, constructor: EngineConstructor) -> BmiResult<()> {
        if self.constructors.contains_key(&kind) {
            return Err(BmiError::Configuration(format!(
                "engine kind '{}' is already registered",
                kind
            )));
        }
        self.constructors.insert(kind, constructor);
        Ok(())
    }

    /// Construct an engine of the given kind.
    pub fn construct(
        &self,
        kind: EngineKind,
        config: &AdapterConfig,
    ) -> BmiResult<Box<dyn ModelEngine>> {
        let constructor = self.constructors.get(&kind).ok_or_else(|| {
            BmiError::Configuration(format!("no engine registered for kind '{}'", kind))
        })?;
        constructor(config)
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("kinds", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}
