//! The model adapter: a standardized lifecycle/query/value surface over a
//! model engine.
//!
//! An external driver constructs a [`ModelAdapter`], calls
//! [`initialize`](Bmi::initialize) once, repeatedly advances the engine with
//! [`update`](Bmi::update) / [`update_until`](Bmi::update_until), optionally
//! queries metadata and values between steps, and finally calls
//! [`finalize`](Bmi::finalize). The engine handle exists exactly between a
//! successful initialize and finalize; every other operation outside that
//! window fails with [`BmiError::NotInitialized`].
//!
//! The adapter performs no local recovery: every precondition violation
//! surfaces immediately to the caller as a typed failure and nothing is
//! retried.

use crate::array::{ElementType, ModelArray};
use crate::config::AdapterConfig;
use crate::engine::{EngineKind, EngineRegistry, ModelEngine};
use crate::errors::{BmiError, BmiResult};
use crate::grid::{ensure_applicable, CoordinateAxis, GridType};
use is_close::is_close;
use log::{debug, info};
use std::path::Path;

/// The Basic Model Interface contract.
///
/// A single consolidated surface: lifecycle control, variable and time
/// metadata queries, value access with index-based partial reads/writes, and
/// grid geometry queries. All metadata and value operations are valid only
/// between `initialize` and `finalize`.
pub trait Bmi {
    /// Resolve and construct the engine, run its startup and resume phases
    /// and enter the initialized state.
    ///
    /// Must be called exactly once before any other operation.
    fn initialize(&mut self, config: &AdapterConfig) -> BmiResult<()>;

    /// Advance the engine by exactly one timestep.
    fn update(&mut self) -> BmiResult<()>;

    /// Advance the engine until its time reaches `time`.
    ///
    /// Advances by `floor((time - current_time) / time_step)` whole steps;
    /// a fractional remainder within one step is accepted silently. Moving
    /// backward in time fails with [`BmiError::InvalidTime`] and leaves the
    /// model unchanged.
    fn update_until(&mut self, time: f64) -> BmiResult<()>;

    /// Reserved for sub-step advancement; no engine variant supports it.
    fn update_frac(&mut self, fraction: f64) -> BmiResult<()>;

    /// Ask the engine to persist a complete checkpoint into `directory`
    /// using its native on-disk representation.
    fn save_state(&mut self, directory: &Path) -> BmiResult<()>;

    /// Persist state to the engine's own configured location, shut the
    /// engine down and release the handle. Terminal: a finalized adapter
    /// cannot be re-initialized.
    fn finalize(&mut self) -> BmiResult<()>;

    /// Identifier of the wrapped model.
    fn component_name(&self) -> BmiResult<&str>;

    /// Names of all variables read by the engine: forcing (input) and state
    /// variables. State variables appear here *and* in
    /// [`output_var_names`](Bmi::output_var_names) since they are both read
    /// and written across a step; parameters appear in neither list.
    fn input_var_names(&self) -> BmiResult<Vec<String>>;

    /// Names of all variables written by the engine: output and state
    /// variables.
    fn output_var_names(&self) -> BmiResult<Vec<String>>;

    /// Total number of variables the engine reports, in every role.
    fn var_count(&self) -> BmiResult<usize>;

    /// Name of the variable at `index` in the engine's reported ordering.
    ///
    /// Unlike the role-partitioned name lists this enumerates every
    /// variable, parameters included; `index` ranges over
    /// `0..var_count()`.
    fn var_name(&self, index: usize) -> BmiResult<String>;

    fn var_type(&self, name: &str) -> BmiResult<ElementType>;
    fn var_rank(&self, name: &str) -> BmiResult<usize>;
    fn var_shape(&self, name: &str) -> BmiResult<Vec<usize>>;
    fn var_size(&self, name: &str) -> BmiResult<usize>;
    fn var_nbytes(&self, name: &str) -> BmiResult<usize>;

    /// Unit string for a variable. Not implemented by any engine variant.
    fn var_units(&self, name: &str) -> BmiResult<String>;

    fn start_time(&self) -> BmiResult<f64>;
    fn current_time(&self) -> BmiResult<f64>;
    fn end_time(&self) -> BmiResult<f64>;

    /// Fixed duration of one engine step, in [`time_units`](Bmi::time_units).
    fn time_step(&self) -> BmiResult<f64>;

    /// UDUNITS-style units/epoch string, fixed for the lifetime of one
    /// engine instance.
    fn time_units(&self) -> BmiResult<String>;

    /// Full current array of values for a variable, in the engine's
    /// canonical ordering.
    fn get_value(&self, name: &str) -> BmiResult<ModelArray>;

    /// Values at the given multi-dimensional indices, one per index tuple,
    /// in request order. Each tuple must have exactly
    /// [`var_rank`](Bmi::var_rank) components.
    fn get_value_at_indices(&self, name: &str, indices: &[Vec<usize>]) -> BmiResult<ModelArray>;

    /// Replace the entire variable. `values` must match the variable's
    /// element type and shape.
    ///
    /// Setting a parameter or pure-output variable is permitted; whether it
    /// has any observable effect before the next update is engine-defined.
    fn set_value(&mut self, name: &str, values: ModelArray) -> BmiResult<()>;

    /// Scatter-write: overwrite the elements at `indices` with `values`.
    ///
    /// Implemented as read-modify-write of the full array; not atomic with
    /// respect to concurrent access.
    fn set_value_at_indices(
        &mut self,
        name: &str,
        indices: &[Vec<usize>],
        values: &ModelArray,
    ) -> BmiResult<()>;

    /// Overwrite a contiguous range of the flattened canonical ordering,
    /// starting at `start`.
    fn set_value_slice(&mut self, name: &str, start: usize, values: &ModelArray) -> BmiResult<()>;

    /// Grid classification for a variable; a pure function of the
    /// variable's declared grid.
    fn grid_type(&self, name: &str) -> BmiResult<GridType>;

    /// Dimension sizes `[rows, cols]`. Uniform, rectilinear and structured
    /// grids only.
    fn grid_shape(&self, name: &str) -> BmiResult<[usize; 2]>;

    /// Cell size per dimension. Uniform grids only.
    fn grid_spacing(&self, name: &str) -> BmiResult<[f64; 2]>;

    /// Lower-left corner `[x, y]`. Uniform grids only.
    fn grid_origin(&self, name: &str) -> BmiResult<[f64; 2]>;

    /// Cell-center x coordinates, index-aligned with
    /// [`get_value`](Bmi::get_value) ordering. Rectilinear, structured and
    /// unstructured grids only.
    fn grid_x(&self, name: &str) -> BmiResult<Vec<f64>>;
    fn grid_y(&self, name: &str) -> BmiResult<Vec<f64>>;
    fn grid_z(&self, name: &str) -> BmiResult<Vec<f64>>;

    /// Cell connectivity. Not implemented by any engine variant.
    fn grid_connectivity(&self, name: &str) -> BmiResult<Vec<usize>>;

    /// Cell offsets. Not implemented by any engine variant.
    fn grid_offset(&self, name: &str) -> BmiResult<Vec<usize>>;
}

/// Adapter over a single model engine.
///
/// Owns exactly one engine handle, created during `initialize` and released
/// during `finalize`, plus the current-timestep counter. One logical caller
/// drives one adapter sequentially; the adapter provides no locking of its
/// own.
pub struct ModelAdapter {
    name: String,
    current_timestep: u64,
    engine: Option<Box<dyn ModelEngine>>,
    registry: EngineRegistry,
    finalized: bool,
}

impl ModelAdapter {
    /// Create an uninitialized adapter with the given engine registry.
    pub fn new(registry: EngineRegistry) -> Self {
        Self {
            name: "undefined".to_string(),
            current_timestep: 0,
            engine: None,
            registry,
            finalized: false,
        }
    }

    /// The 1-based timestep counter: 1 after initialize, incremented by each
    /// completed step.
    pub fn current_timestep(&self) -> u64 {
        self.current_timestep
    }

    fn engine(&self) -> BmiResult<&dyn ModelEngine> {
        self.engine.as_deref().ok_or(BmiError::NotInitialized)
    }

    fn engine_mut(&mut self) -> BmiResult<&mut dyn ModelEngine> {
        match self.engine.as_deref_mut() {
            Some(engine) => Ok(engine),
            None => Err(BmiError::NotInitialized),
        }
    }

    /// Fail with [`BmiError::UnknownVariable`] unless the engine reports
    /// `name`.
    fn known_variable(&self, name: &str) -> BmiResult<()> {
        let engine = self.engine()?;
        if engine.variables().iter().any(|(n, _)| n == name) {
            Ok(())
        } else {
            Err(BmiError::UnknownVariable(name.to_string()))
        }
    }

    fn var_array(&self, name: &str) -> BmiResult<ModelArray> {
        self.known_variable(name)?;
        self.engine()?.array(name)
    }

    fn declared_grid_type(&self, name: &str) -> BmiResult<GridType> {
        self.known_variable(name)?;
        Ok(self.engine()?.grid_type(name))
    }

    fn grid_coordinates(&self, name: &str, axis: CoordinateAxis) -> BmiResult<Vec<f64>> {
        let grid_type = self.declared_grid_type(name)?;
        ensure_applicable(
            "get_grid_coordinates",
            grid_type,
            grid_type.has_coordinate_arrays(),
        )?;
        self.engine()?.grid_coordinates(axis)
    }
}

impl Bmi for ModelAdapter {
    fn initialize(&mut self, config: &AdapterConfig) -> BmiResult<()> {
        if self.finalized {
            // Finalized is terminal; a fresh adapter must be constructed.
            return Err(BmiError::NotInitialized);
        }
        if self.engine.is_some() {
            return Err(BmiError::Configuration(
                "adapter is already initialized".to_string(),
            ));
        }

        let kind = EngineKind::from_config(config)?;
        info!(
            "initializing '{}' from {} (verbosity {})",
            kind,
            config.config_path.display(),
            config.verbosity
        );

        // The engine stays a local until startup and resume have succeeded,
        // so a failing initialize cannot leak a half-started handle.
        let mut engine = self.registry.construct(kind, config)?;
        engine.startup()?;
        engine.resume()?;

        self.name = kind.model_name().to_string();
        self.engine = Some(engine);
        self.current_timestep = 1;
        Ok(())
    }

    fn update(&mut self) -> BmiResult<()> {
        let step = self.current_timestep;
        self.engine_mut()?.run_steps(step, step)?;
        self.current_timestep += 1;
        debug!("advanced to timestep {}", self.current_timestep);
        Ok(())
    }

    fn update_until(&mut self, time: f64) -> BmiResult<()> {
        let engine = self.engine()?;
        let current = engine.current_time();
        if time < current {
            return Err(BmiError::InvalidTime {
                target: time,
                current,
            });
        }

        let span = (time - current) / engine.time_step();
        let mut whole_steps = span.floor();
        // A target a rounding error below an exact step boundary still
        // counts as the full number of steps.
        if is_close!(span, whole_steps + 1.0) {
            whole_steps += 1.0;
        }
        let steps = whole_steps as u64;
        if steps == 0 {
            return Ok(());
        }

        let from = self.current_timestep;
        self.engine_mut()?.run_steps(from, from + steps - 1)?;
        self.current_timestep += steps;
        debug!("advanced {} steps to timestep {}", steps, self.current_timestep);
        Ok(())
    }

    fn update_frac(&mut self, _fraction: f64) -> BmiResult<()> {
        self.engine()?;
        Err(BmiError::NotImplemented("update_frac"))
    }

    fn save_state(&mut self, directory: &Path) -> BmiResult<()> {
        debug!("saving state to {}", directory.display());
        self.engine_mut()?.suspend(directory)
    }

    fn finalize(&mut self) -> BmiResult<()> {
        // Take the handle out first so it is released on every exit path,
        // including a failing suspend.
        let mut engine = self.engine.take().ok_or(BmiError::NotInitialized)?;
        self.finalized = true;
        info!("finalizing '{}'", self.name);
        engine.suspend_default()?;
        engine.shutdown()?;
        Ok(())
    }

    fn component_name(&self) -> BmiResult<&str> {
        self.engine()?;
        Ok(&self.name)
    }

    fn input_var_names(&self) -> BmiResult<Vec<String>> {
        Ok(self
            .engine()?
            .variables()
            .into_iter()
            .filter(|(_, role)| role.is_input())
            .map(|(name, _)| name)
            .collect())
    }

    fn output_var_names(&self) -> BmiResult<Vec<String>> {
        Ok(self
            .engine()?
            .variables()
            .into_iter()
            .filter(|(_, role)| role.is_output())
            .map(|(name, _)| name)
            .collect())
    }

    fn var_count(&self) -> BmiResult<usize> {
        Ok(self.engine()?.variables().len())
    }

    fn var_name(&self, index: usize) -> BmiResult<String> {
        let variables = self.engine()?.variables();
        variables
            .get(index)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| BmiError::IndexOutOfRange {
                index: vec![index],
                shape: vec![variables.len()],
            })
    }

    fn var_type(&self, name: &str) -> BmiResult<ElementType> {
        Ok(self.var_array(name)?.element_type())
    }

    fn var_rank(&self, name: &str) -> BmiResult<usize> {
        Ok(self.var_array(name)?.rank())
    }

    fn var_shape(&self, name: &str) -> BmiResult<Vec<usize>> {
        Ok(self.var_array(name)?.shape().to_vec())
    }

    fn var_size(&self, name: &str) -> BmiResult<usize> {
        Ok(self.var_array(name)?.len())
    }

    fn var_nbytes(&self, name: &str) -> BmiResult<usize> {
        Ok(self.var_array(name)?.nbytes())
    }

    fn var_units(&self, _name: &str) -> BmiResult<String> {
        self.engine()?;
        Err(BmiError::NotImplemented("get_var_units"))
    }

    fn start_time(&self) -> BmiResult<f64> {
        Ok(self.engine()?.start_time())
    }

    fn current_time(&self) -> BmiResult<f64> {
        Ok(self.engine()?.current_time())
    }

    fn end_time(&self) -> BmiResult<f64> {
        Ok(self.engine()?.end_time())
    }

    fn time_step(&self) -> BmiResult<f64> {
        Ok(self.engine()?.time_step())
    }

    fn time_units(&self) -> BmiResult<String> {
        Ok(self.engine()?.epoch())
    }

    fn get_value(&self, name: &str) -> BmiResult<ModelArray> {
        self.var_array(name)
    }

    fn get_value_at_indices(&self, name: &str, indices: &[Vec<usize>]) -> BmiResult<ModelArray> {
        self.var_array(name)?.gather(indices)
    }

    fn set_value(&mut self, name: &str, values: ModelArray) -> BmiResult<()> {
        self.var_array(name)?.validate_replacement(name, &values)?;
        self.engine_mut()?.set_array(name, values)
    }

    fn set_value_at_indices(
        &mut self,
        name: &str,
        indices: &[Vec<usize>],
        values: &ModelArray,
    ) -> BmiResult<()> {
        let mut array = self.var_array(name)?;
        array.scatter(name, indices, values)?;
        self.engine_mut()?.set_array(name, array)
    }

    fn set_value_slice(&mut self, name: &str, start: usize, values: &ModelArray) -> BmiResult<()> {
        let mut array = self.var_array(name)?;
        array.write_flat(name, start, values)?;
        self.engine_mut()?.set_array(name, array)
    }

    fn grid_type(&self, name: &str) -> BmiResult<GridType> {
        self.declared_grid_type(name)
    }

    fn grid_shape(&self, name: &str) -> BmiResult<[usize; 2]> {
        let grid_type = self.declared_grid_type(name)?;
        ensure_applicable("get_grid_shape", grid_type, grid_type.has_shape())?;
        Ok(self.engine()?.grid_dimensions()?.shape())
    }

    fn grid_spacing(&self, name: &str) -> BmiResult<[f64; 2]> {
        let grid_type = self.declared_grid_type(name)?;
        ensure_applicable(
            "get_grid_spacing",
            grid_type,
            grid_type.has_regular_spacing(),
        )?;
        Ok(self.engine()?.grid_dimensions()?.spacing())
    }

    fn grid_origin(&self, name: &str) -> BmiResult<[f64; 2]> {
        let grid_type = self.declared_grid_type(name)?;
        ensure_applicable(
            "get_grid_origin",
            grid_type,
            grid_type.has_regular_spacing(),
        )?;
        Ok(self.engine()?.grid_dimensions()?.origin())
    }

    fn grid_x(&self, name: &str) -> BmiResult<Vec<f64>> {
        self.grid_coordinates(name, CoordinateAxis::X)
    }

    fn grid_y(&self, name: &str) -> BmiResult<Vec<f64>> {
        self.grid_coordinates(name, CoordinateAxis::Y)
    }

    fn grid_z(&self, name: &str) -> BmiResult<Vec<f64>> {
        self.grid_coordinates(name, CoordinateAxis::Z)
    }

    fn grid_connectivity(&self, _name: &str) -> BmiResult<Vec<usize>> {
        self.engine()?;
        Err(BmiError::NotImplemented("get_grid_connectivity"))
    }

    fn grid_offset(&self, _name: &str) -> BmiResult<Vec<usize>> {
        self.engine()?;
        Err(BmiError::NotImplemented("get_grid_offset"))
    }
}

impl std::fmt::Debug for ModelAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelAdapter")
            .field("name", &self.name)
            .field("current_timestep", &self.current_timestep)
            .field("initialized", &self.engine.is_some())
            .field("finalized", &self.finalized)
            .finish()
    }
}
