/*
    Nyx, blazing fast astrodynamics
    Copyright (C) 2018-onwards Christopher Rabotin <christopher.rabotin@gmail.com>

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use snafu::prelude::*;
use typed_builder::TypedBuilder;

use super::{
    check_index, InvalidResultSnafu, InvalidStateSnafu, NoVariablesOrGoalsSnafu,
    NotInitializedSnafu, ResultSpec, Solver, SolverAction, SolverError, SolverKind, SolverState,
    VariableSpec,
};
use crate::linalg::{DMatrix, DVector};

#[derive(Clone, Debug, PartialEq)]
struct Goal {
    name: String,
    value: f64,
    tolerance: f64,
}

/// Newton-Raphson targeter with a finite difference Jacobian.
///
/// Each iteration runs the loop body once with the current variables (NOMINAL), checks the
/// goals (CHECKINGRUN), then runs one pass per variable with that variable perturbed
/// (PERTURBING) before computing the correction (CALCULATING).
#[derive(Clone, Debug, TypedBuilder)]
#[builder(doc)]
pub struct DifferentialCorrector {
    #[builder(default = 25)]
    pub max_iterations: usize,
    #[builder(default, setter(skip))]
    variables: Vec<VariableSpec>,
    #[builder(default, setter(skip))]
    values: Vec<f64>,
    #[builder(default, setter(skip))]
    goals: Vec<Goal>,
    #[builder(default, setter(skip))]
    nominal: Vec<f64>,
    /// Achieved goal values for each perturbed variable
    #[builder(default, setter(skip))]
    achieved: Vec<Vec<f64>>,
    /// Sign of the perturbation applied to each variable
    #[builder(default, setter(skip))]
    direction: Vec<f64>,
    #[builder(default, setter(skip))]
    pert_index: usize,
    #[builder(default, setter(skip))]
    state: SolverState,
    #[builder(default, setter(skip))]
    iterations: usize,
    #[builder(default, setter(skip))]
    converged: bool,
    #[builder(default, setter(skip))]
    initialized: bool,
    #[builder(default, setter(skip))]
    instance_count: usize,
}

impl Default for DifferentialCorrector {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl DifferentialCorrector {
    const NAME: &'static str = "DifferentialCorrector";

    fn ensure_initialized(&self) -> Result<(), SolverError> {
        ensure!(self.initialized, NotInitializedSnafu { solver: Self::NAME });
        Ok(())
    }

    /// Distance of each goal to its desired value, computed from the nominal pass
    pub fn goal_errors(&self) -> Vec<f64> {
        self.goals
            .iter()
            .zip(&self.nominal)
            .map(|(goal, achieved)| goal.value - achieved)
            .collect()
    }

    fn check_completion(&mut self) {
        self.converged = self
            .goals
            .iter()
            .zip(&self.nominal)
            .all(|(goal, achieved)| (achieved - goal.value).abs() <= goal.tolerance);

        if self.converged {
            info!(
                "{} -- CONVERGED after {} iteration(s)",
                Self::NAME,
                self.iterations
            );
            self.state = SolverState::Finished;
            return;
        }

        self.iterations += 1;
        if self.iterations >= self.max_iterations {
            warn!(
                "{} -- did not converge in {} iterations, errors: {:?}",
                Self::NAME,
                self.max_iterations,
                self.goal_errors()
            );
            self.state = SolverState::Finished;
        } else {
            info!("{} -- iteration #{}", Self::NAME, self.iterations);
            self.pert_index = 0;
            self.apply_perturbation();
            self.state = SolverState::Perturbing;
        }
    }

    fn apply_perturbation(&mut self) {
        let i = self.pert_index;
        let var = &self.variables[i];
        // Perturb away from the upper bound if stepping up would cross it
        self.direction[i] = if self.values[i] + var.perturbation > var.upper {
            -1.0
        } else {
            1.0
        };
        self.values[i] += self.direction[i] * var.perturbation;
    }

    fn run_perturbation(&mut self) {
        let i = self.pert_index;
        self.values[i] -= self.direction[i] * self.variables[i].perturbation;
        self.pert_index += 1;
        if self.pert_index == self.variables.len() {
            self.state = SolverState::Calculating;
        } else {
            self.apply_perturbation();
        }
    }

    fn calculate_parameters(&mut self) -> Result<(), SolverError> {
        let n_goals = self.goals.len();
        let n_vars = self.variables.len();
        let mut jac = DMatrix::<f64>::zeros(n_goals, n_vars);
        for (i, var) in self.variables.iter().enumerate() {
            let step = self.direction[i] * var.perturbation;
            for j in 0..n_goals {
                jac[(j, i)] = (self.achieved[i][j] - self.nominal[j]) / step;
            }
        }
        debug!("Jacobian {}", jac);

        let jac_inv = if n_goals == n_vars {
            jac.clone().try_inverse().ok_or(SolverError::SingularJacobian)?
        } else {
            jac.clone()
                .pseudo_inverse(1e-12)
                .map_err(|_| SolverError::SingularJacobian)?
        };
        ensure!(
            jac_inv.iter().all(|v| v.is_finite()),
            super::SingularJacobianSnafu
        );

        let err = DVector::from_vec(self.goal_errors());
        let delta = jac_inv * err;
        debug!("Raw correction: {}", delta);

        for (i, var) in self.variables.iter().enumerate() {
            let step = var.apply_max_step(delta[i]);
            self.values[i] = var.apply_bounds(self.values[i] + step);
        }
        Ok(())
    }
}

impl Solver for DifferentialCorrector {
    fn clone_box(&self) -> Box<dyn Solver> {
        Box::new(self.clone())
    }

    fn type_name(&self) -> &'static str {
        Self::NAME
    }

    fn kind(&self) -> SolverKind {
        SolverKind::Targeter
    }

    fn state(&self) -> SolverState {
        self.state
    }

    fn register_variable(&mut self, spec: VariableSpec) -> Result<usize, SolverError> {
        spec.valid()?;
        if let Some(idx) = self.variables.iter().position(|v| v.name == spec.name) {
            self.variables[idx] = spec;
            return Ok(idx);
        }
        self.variables.push(spec);
        self.initialized = false;
        Ok(self.variables.len() - 1)
    }

    fn register_result(&mut self, spec: ResultSpec) -> Result<usize, SolverError> {
        match spec {
            ResultSpec::Goal {
                name,
                value,
                tolerance,
            } => {
                let goal = Goal {
                    name,
                    value,
                    tolerance,
                };
                if let Some(idx) = self.goals.iter().position(|g| g.name == goal.name) {
                    self.goals[idx] = goal;
                    return Ok(idx);
                }
                self.goals.push(goal);
                self.initialized = false;
                Ok(self.goals.len() - 1)
            }
            other => InvalidResultSnafu {
                solver: Self::NAME,
                result: other.to_string(),
            }
            .fail(),
        }
    }

    fn variable_count(&self) -> usize {
        self.variables.len()
    }

    fn result_count(&self) -> usize {
        self.goals.len()
    }

    fn initialize(&mut self) -> Result<(), SolverError> {
        ensure!(
            !self.variables.is_empty() && !self.goals.is_empty(),
            NoVariablesOrGoalsSnafu {
                solver: Self::NAME,
                variables: self.variables.len(),
                results: self.goals.len(),
            }
        );
        ensure!(
            self.goals.len() <= self.variables.len(),
            super::MoreGoalsThanVariablesSnafu {
                goals: self.goals.len(),
                variables: self.variables.len(),
            }
        );
        self.values = self.variables.iter().map(|v| v.initial).collect();
        self.nominal = vec![0.0; self.goals.len()];
        self.achieved = vec![vec![0.0; self.goals.len()]; self.variables.len()];
        self.direction = vec![1.0; self.variables.len()];
        self.pert_index = 0;
        self.iterations = 0;
        self.converged = false;
        self.state = SolverState::Initializing;
        self.initialized = true;
        Ok(())
    }

    fn take_action(&mut self, action: SolverAction) -> Result<(), SolverError> {
        match action {
            SolverAction::Reset => {
                self.ensure_initialized()?;
                self.state = SolverState::Initializing;
                self.iterations = 0;
                self.pert_index = 0;
                self.converged = false;
                // Force a retarget even if the goals were met at the end of the previous run
                for (nominal, goal) in self.nominal.iter_mut().zip(&self.goals) {
                    *nominal = goal.value + 10.0 * goal.tolerance;
                }
            }
            SolverAction::IncrementInstanceCount => self.instance_count += 1,
        }
        Ok(())
    }

    fn advance_state(&mut self) -> Result<SolverState, SolverError> {
        self.ensure_initialized()?;
        match self.state {
            SolverState::Initializing => self.state = SolverState::Nominal,
            SolverState::Nominal => self.state = SolverState::CheckingRun,
            SolverState::CheckingRun => self.check_completion(),
            SolverState::Perturbing => self.run_perturbation(),
            SolverState::Calculating => {
                self.calculate_parameters()?;
                self.state = SolverState::Nominal;
            }
            SolverState::Finished => {}
            SolverState::Iterating => {
                return InvalidStateSnafu {
                    solver: Self::NAME,
                    operation: "advance",
                    state: self.state,
                }
                .fail()
            }
        }
        debug!("{} -> {}", Self::NAME, self.state);
        Ok(self.state)
    }

    fn set_variable_initial(&mut self, index: usize, value: f64) -> Result<(), SolverError> {
        check_index(index, self.variables.len(), true)?;
        self.variables[index].initial = value;
        if let Some(current) = self.values.get_mut(index) {
            *current = value;
        }
        Ok(())
    }

    fn variable_value(&self, index: usize) -> Result<f64, SolverError> {
        check_index(index, self.variables.len(), true)?;
        Ok(self
            .values
            .get(index)
            .copied()
            .unwrap_or(self.variables[index].initial))
    }

    fn variable_values(&self) -> Vec<f64> {
        self.values.clone()
    }

    fn set_result_goal(&mut self, index: usize, value: f64) -> Result<(), SolverError> {
        check_index(index, self.goals.len(), false)?;
        self.goals[index].value = value;
        if self.state == SolverState::Initializing {
            if let Some(nominal) = self.nominal.get_mut(index) {
                *nominal = value + 10.0 * self.goals[index].tolerance;
            }
        }
        Ok(())
    }

    fn set_result_value(&mut self, index: usize, value: f64) -> Result<(), SolverError> {
        check_index(index, self.goals.len(), false)?;
        self.ensure_initialized()?;
        match self.state {
            SolverState::Nominal => self.nominal[index] = value,
            SolverState::Perturbing => self.achieved[self.pert_index][index] = value,
            _ => {}
        }
        Ok(())
    }

    fn converged(&self) -> bool {
        self.converged
    }

    fn iterations(&self) -> usize {
        self.iterations
    }

    fn finalize(&mut self) -> Result<(), SolverError> {
        info!("{}", self.progress());
        Ok(())
    }

    fn progress(&self) -> String {
        let vars = self
            .variables
            .iter()
            .zip(&self.values)
            .map(|(var, value)| format!("{} = {value}", var.name))
            .collect::<Vec<_>>()
            .join(", ");
        let goals = self
            .goals
            .iter()
            .zip(&self.nominal)
            .map(|(goal, achieved)| format!("{}: {achieved} (desired {})", goal.name, goal.value))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{} {} after {} iteration(s) -- {vars} -- {goals}",
            Self::NAME,
            if self.converged { "converged" } else { "not converged" },
            self.iterations
        )
    }
}
