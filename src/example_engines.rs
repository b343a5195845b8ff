//! A reference engine used by the test suite.
//!
//! [`UniformGridEngine`] is a small in-memory engine with a uniform 2-D grid
//! and a handful of variables covering every role and element type. It
//! implements the whole
//! [`ModelEngine`] surface, including TOML checkpoints, and doubles as a
//! template for wiring real engines into an [`EngineRegistry`].
//!
//! [`EngineRegistry`]: crate::engine::EngineRegistry

use crate::array::ModelArray;
use crate::config::AdapterConfig;
use crate::engine::{ModelEngine, VarRole};
use crate::errors::{BmiError, BmiResult};
use crate::grid::{CoordinateAxis, GridDimensions, GridType};
use log::{debug, info};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const CHECKPOINT_FILE: &str = "checkpoint.toml";
const STEP_SECONDS: f64 = 86400.0;
const TOTAL_STEPS: u64 = 30;

/// On-disk checkpoint representation.
///
/// A checkpoint is self-sufficient: the completed step count plus every
/// variable's values and role.
#[derive(Debug, Serialize, Deserialize)]
struct Checkpoint {
    completed_steps: u64,
    variables: BTreeMap<String, SavedVariable>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedVariable {
    role: VarRole,
    values: ModelArray,
}

/// In-memory engine on a uniform 2-D grid.
///
/// The "physics" is a deliberately trivial water balance: each step moves a
/// fraction of precipitation into soil moisture and drains a fraction of
/// soil moisture into discharge. It exists to give the adapter something
/// deterministic to drive, not to model anything.
pub struct UniformGridEngine {
    dims: GridDimensions,
    /// Insertion order fixes the reported variable order.
    names: Vec<String>,
    variables: BTreeMap<String, (VarRole, ModelArray)>,
    grid_types: BTreeMap<String, GridType>,
    completed_steps: u64,
    /// Default location for suspend-on-finalize, derived from the
    /// configuration's data directory.
    state_dir: PathBuf,
}

impl UniformGridEngine {
    pub fn new(config: &AdapterConfig) -> Self {
        let dims = GridDimensions {
            x_upper_left: 5.0,
            y_upper_left: 52.0,
            x_size: 0.1,
            y_size: 0.1,
            rows: 2,
            cols: 3,
        };

        let mut engine = Self {
            dims,
            names: Vec::new(),
            variables: BTreeMap::new(),
            grid_types: BTreeMap::new(),
            completed_steps: 0,
            state_dir: config.data_dir().to_path_buf(),
        };

        let cells = dims.cell_count();
        engine.add_variable(
            "precipitation",
            VarRole::Input,
            ModelArray::F64(
                ArrayD::from_shape_vec(
                    IxDyn(&[dims.rows, dims.cols]),
                    (0..cells).map(|i| 1.0 + i as f64).collect(),
                )
                .unwrap(),
            ),
        );
        engine.add_variable(
            "temperature",
            VarRole::Input,
            ModelArray::F32(ArrayD::from_elem(IxDyn(&[dims.rows, dims.cols]), 18.5)),
        );
        engine.add_variable(
            "discharge",
            VarRole::Output,
            ModelArray::F64(ArrayD::zeros(IxDyn(&[dims.rows, dims.cols]))),
        );
        engine.add_variable(
            "soil_moisture",
            VarRole::State,
            ModelArray::F64(ArrayD::from_elem(IxDyn(&[dims.rows, dims.cols]), 10.0)),
        );
        engine.add_variable(
            "ksat",
            VarRole::Parameter,
            ModelArray::F64(ArrayD::from_elem(IxDyn(&[dims.rows, dims.cols]), 0.3)),
        );
        engine.add_variable(
            "land_use",
            VarRole::Parameter,
            ModelArray::I32(
                ArrayD::from_shape_vec(
                    IxDyn(&[dims.rows, dims.cols]),
                    (0..cells).map(|i| i as i32).collect(),
                )
                .unwrap(),
            ),
        );

        engine
    }

    fn add_variable(&mut self, name: &str, role: VarRole, values: ModelArray) {
        self.names.push(name.to_string());
        self.variables.insert(name.to_string(), (role, values));
        self.grid_types.insert(name.to_string(), GridType::Uniform);
    }

    /// Override the declared grid type for one variable.
    ///
    /// The shipped variables are all uniform; tests use this to exercise the
    /// adapter's grid applicability rules for other grid types.
    pub fn declare_grid_type(&mut self, name: &str, grid_type: GridType) {
        self.grid_types.insert(name.to_string(), grid_type);
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            completed_steps: self.completed_steps,
            variables: self
                .variables
                .iter()
                .map(|(name, (role, values))| {
                    (
                        name.clone(),
                        SavedVariable {
                            role: *role,
                            values: values.clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    fn write_checkpoint(&self, directory: &Path) -> BmiResult<()> {
        std::fs::create_dir_all(directory)
            .map_err(|e| BmiError::Engine(format!("cannot create state directory: {}", e)))?;
        let serialised = toml::to_string(&self.checkpoint())
            .map_err(|e| BmiError::Engine(format!("cannot serialise checkpoint: {}", e)))?;
        std::fs::write(directory.join(CHECKPOINT_FILE), serialised)
            .map_err(|e| BmiError::Engine(format!("cannot write checkpoint: {}", e)))?;
        debug!("wrote checkpoint to {}", directory.display());
        Ok(())
    }

    fn run_one_step(&mut self) {
        let precipitation = self.values("precipitation").clone();
        let ksat = self.values("ksat").clone();
        let soil = self.values("soil_moisture").clone();

        let updated = &soil + &precipitation - &soil * &ksat;
        let discharge = &updated * &ksat;
        *self.values_mut("soil_moisture") = updated;
        *self.values_mut("discharge") = discharge;
    }

    fn values(&self, name: &str) -> &ArrayD<f64> {
        match &self.variables[name].1 {
            ModelArray::F64(a) => a,
            _ => unreachable!("water balance variables are float64"),
        }
    }

    fn values_mut(&mut self, name: &str) -> &mut ArrayD<f64> {
        match &mut self.variables.get_mut(name).unwrap().1 {
            ModelArray::F64(a) => a,
            _ => unreachable!("water balance variables are float64"),
        }
    }
}

impl ModelEngine for UniformGridEngine {
    fn startup(&mut self) -> BmiResult<()> {
        info!("uniform grid engine starting up");
        self.completed_steps = 0;
        Ok(())
    }

    fn resume(&mut self) -> BmiResult<()> {
        let path = self.state_dir.join(CHECKPOINT_FILE);
        if !path.exists() {
            debug!("no checkpoint at {}, cold start", path.display());
            return Ok(());
        }

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| BmiError::Engine(format!("cannot read checkpoint: {}", e)))?;
        let checkpoint: Checkpoint = toml::from_str(&contents)
            .map_err(|e| BmiError::Engine(format!("invalid checkpoint: {}", e)))?;

        self.completed_steps = checkpoint.completed_steps;
        for (name, saved) in checkpoint.variables {
            self.variables.insert(name, (saved.role, saved.values));
        }
        info!(
            "resumed from {} at step {}",
            path.display(),
            self.completed_steps
        );
        Ok(())
    }

    fn run_steps(&mut self, from_step: u64, to_step: u64) -> BmiResult<()> {
        if from_step > to_step {
            return Err(BmiError::Engine(format!(
                "invalid step range {}..={}",
                from_step, to_step
            )));
        }
        for _ in from_step..=to_step {
            self.run_one_step();
            self.completed_steps += 1;
        }
        Ok(())
    }

    fn suspend(&mut self, directory: &Path) -> BmiResult<()> {
        self.write_checkpoint(directory)
    }

    fn suspend_default(&mut self) -> BmiResult<()> {
        let directory = self.state_dir.clone();
        self.write_checkpoint(&directory)
    }

    fn shutdown(&mut self) -> BmiResult<()> {
        info!("uniform grid engine shutting down");
        Ok(())
    }

    fn variables(&self) -> Vec<(String, VarRole)> {
        self.names
            .iter()
            .map(|name| (name.clone(), self.variables[name].0))
            .collect()
    }

    fn array(&self, name: &str) -> BmiResult<ModelArray> {
        self.variables
            .get(name)
            .map(|(_, values)| values.clone())
            .ok_or_else(|| BmiError::UnknownVariable(name.to_string()))
    }

    fn set_array(&mut self, name: &str, values: ModelArray) -> BmiResult<()> {
        match self.variables.get_mut(name) {
            Some((_, slot)) => {
                *slot = values;
                Ok(())
            }
            None => Err(BmiError::UnknownVariable(name.to_string())),
        }
    }

    fn epoch(&self) -> String {
        "seconds since 1970-01-01 00:00:00".to_string()
    }

    fn start_time(&self) -> f64 {
        0.0
    }

    fn current_time(&self) -> f64 {
        self.completed_steps as f64 * STEP_SECONDS
    }

    fn end_time(&self) -> f64 {
        TOTAL_STEPS as f64 * STEP_SECONDS
    }

    fn time_step(&self) -> f64 {
        STEP_SECONDS
    }

    fn grid_type(&self, name: &str) -> GridType {
        self.grid_types
            .get(name)
            .copied()
            .unwrap_or(GridType::Unknown)
    }

    fn grid_dimensions(&self) -> BmiResult<GridDimensions> {
        Ok(self.dims)
    }

    fn grid_coordinates(&self, axis: CoordinateAxis) -> BmiResult<Vec<f64>> {
        let mut coords = Vec::with_capacity(self.dims.cell_count());
        for row in 0..self.dims.rows {
            for col in 0..self.dims.cols {
                coords.push(match axis {
                    CoordinateAxis::X => {
                        self.dims.x_upper_left + (col as f64 + 0.5) * self.dims.x_size
                    }
                    CoordinateAxis::Y => {
                        self.dims.y_upper_left - (row as f64 + 0.5) * self.dims.y_size
                    }
                    CoordinateAxis::Z => 0.0,
                });
            }
        }
        Ok(coords)
    }
}
