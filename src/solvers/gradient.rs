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
    check_index, ConstraintKind, InvalidResultSnafu, NoVariablesOrGoalsSnafu, NotInitializedSnafu,
    ResultSpec, Solver, SolverAction, SolverError, SolverKind, SolverState, VariableSpec,
};

#[derive(Clone, Debug, PartialEq)]
struct Constraint {
    name: String,
    kind: ConstraintKind,
    value: f64,
    tolerance: f64,
}

impl Constraint {
    /// Amount by which `achieved` violates the constraint, zero when satisfied
    fn violation(&self, achieved: f64) -> f64 {
        let diff = achieved - self.value;
        let violation = match self.kind {
            ConstraintKind::Equality => diff.abs(),
            ConstraintKind::LessThan => diff.max(0.0),
            ConstraintKind::GreaterThan => (-diff).max(0.0),
        };
        if violation <= self.tolerance {
            0.0
        } else {
            violation
        }
    }
}

/// Penalty method steepest descent optimizer.
///
/// The merit function is the objective plus `penalty_weight` times the sum of the squared
/// constraint violations. The gradient is estimated by forward differences, one loop body
/// pass per variable.
#[derive(Clone, Debug, TypedBuilder)]
#[builder(doc)]
pub struct GradientDescent {
    #[builder(default = 200)]
    pub max_iterations: usize,
    #[builder(default = 0.1)]
    pub learning_rate: f64,
    /// Convergence threshold on the change of the merit function between iterations
    #[builder(default = 1e-8)]
    pub tolerance: f64,
    #[builder(default = 1e3)]
    pub penalty_weight: f64,
    /// Report ITERATING while the loop body must run, as an external optimizer would
    #[builder(default = false)]
    pub use_callbacks: bool,
    #[builder(default, setter(skip))]
    variables: Vec<VariableSpec>,
    #[builder(default, setter(skip))]
    values: Vec<f64>,
    #[builder(default, setter(skip))]
    objective: Option<String>,
    #[builder(default, setter(skip))]
    constraints: Vec<Constraint>,
    /// Results of the current pass, objective first
    #[builder(default, setter(skip))]
    pass_results: Vec<f64>,
    #[builder(default, setter(skip))]
    nominal_merit: f64,
    #[builder(default, setter(skip))]
    previous_merit: Option<f64>,
    #[builder(default, setter(skip))]
    gradient: Vec<f64>,
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
}

impl Default for GradientDescent {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl GradientDescent {
    const NAME: &'static str = "GradientDescent";

    fn ensure_initialized(&self) -> Result<(), SolverError> {
        ensure!(self.initialized, NotInitializedSnafu { solver: Self::NAME });
        Ok(())
    }

    fn result_total(&self) -> usize {
        usize::from(self.objective.is_some()) + self.constraints.len()
    }

    /// Result indices: the objective always owns index 0, constraints follow
    fn result_slots(&self) -> usize {
        1 + self.constraints.len()
    }

    fn merit(&self) -> f64 {
        let objective = if self.objective.is_some() {
            self.pass_results[0]
        } else {
            0.0
        };
        let penalty: f64 = self
            .constraints
            .iter()
            .zip(&self.pass_results[1..])
            .map(|(con, achieved)| con.violation(*achieved).powi(2))
            .sum();
        objective + self.penalty_weight * penalty
    }

    fn constraints_satisfied(&self) -> bool {
        self.constraints
            .iter()
            .zip(&self.pass_results[1..])
            .all(|(con, achieved)| con.violation(*achieved) == 0.0)
    }

    fn check_completion(&mut self) {
        self.nominal_merit = self.merit();
        let settled = self
            .previous_merit
            .map_or(false, |prev| (self.nominal_merit - prev).abs() < self.tolerance);
        if settled && self.constraints_satisfied() {
            info!(
                "{} -- CONVERGED after {} iteration(s), merit = {}",
                Self::NAME,
                self.iterations,
                self.nominal_merit
            );
            self.converged = true;
            self.state = SolverState::Finished;
        } else if self.iterations >= self.max_iterations {
            warn!(
                "{} -- did not converge in {} iterations, merit = {}",
                Self::NAME,
                self.max_iterations,
                self.nominal_merit
            );
            self.state = SolverState::Finished;
        } else {
            self.previous_merit = Some(self.nominal_merit);
            self.pert_index = 0;
            self.values[0] += self.variables[0].perturbation;
            self.state = SolverState::Perturbing;
        }
    }

    fn run_perturbation(&mut self) {
        let i = self.pert_index;
        let pert = self.variables[i].perturbation;
        self.gradient[i] = (self.merit() - self.nominal_merit) / pert;
        self.values[i] -= pert;
        self.pert_index += 1;
        if self.pert_index == self.variables.len() {
            self.state = SolverState::Calculating;
        } else {
            self.values[self.pert_index] += self.variables[self.pert_index].perturbation;
        }
    }

    fn take_step(&mut self) {
        debug!("{} gradient {:?}", Self::NAME, self.gradient);
        for (i, var) in self.variables.iter().enumerate() {
            let step = var.apply_max_step(-self.learning_rate * self.gradient[i]);
            self.values[i] = var.apply_bounds(self.values[i] + step);
        }
        self.iterations += 1;
        self.state = SolverState::Nominal;
    }
}

impl Solver for GradientDescent {
    fn clone_box(&self) -> Box<dyn Solver> {
        Box::new(self.clone())
    }

    fn type_name(&self) -> &'static str {
        Self::NAME
    }

    fn kind(&self) -> SolverKind {
        SolverKind::Optimizer
    }

    fn state(&self) -> SolverState {
        match self.state {
            SolverState::Nominal | SolverState::Perturbing if self.use_callbacks => {
                SolverState::Iterating
            }
            state => state,
        }
    }

    fn requires_callback(&self) -> bool {
        self.use_callbacks
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
            ResultSpec::Objective { name } => {
                if self.objective.as_ref().map_or(false, |obj| *obj != name) {
                    return InvalidResultSnafu {
                        solver: Self::NAME,
                        result: format!("second objective {name}"),
                    }
                    .fail();
                }
                if self.objective.is_none() {
                    self.initialized = false;
                }
                self.objective = Some(name);
                Ok(0)
            }
            ResultSpec::Constraint {
                name,
                kind,
                value,
                tolerance,
            } => {
                let con = Constraint {
                    name,
                    kind,
                    value,
                    tolerance,
                };
                if let Some(idx) = self.constraints.iter().position(|c| c.name == con.name) {
                    self.constraints[idx] = con;
                    return Ok(idx + 1);
                }
                self.constraints.push(con);
                self.initialized = false;
                Ok(self.constraints.len())
            }
            goal => InvalidResultSnafu {
                solver: Self::NAME,
                result: goal.to_string(),
            }
            .fail(),
        }
    }

    fn variable_count(&self) -> usize {
        self.variables.len()
    }

    fn result_count(&self) -> usize {
        self.result_total()
    }

    fn initialize(&mut self) -> Result<(), SolverError> {
        ensure!(
            !self.variables.is_empty() && self.result_total() > 0,
            NoVariablesOrGoalsSnafu {
                solver: Self::NAME,
                variables: self.variables.len(),
                results: self.result_total(),
            }
        );
        self.values = self.variables.iter().map(|v| v.initial).collect();
        self.gradient = vec![0.0; self.variables.len()];
        self.pass_results = vec![0.0; self.result_slots()];
        self.previous_merit = None;
        self.pert_index = 0;
        self.iterations = 0;
        self.converged = false;
        self.state = SolverState::Initializing;
        self.initialized = true;
        Ok(())
    }

    fn take_action(&mut self, action: SolverAction) -> Result<(), SolverError> {
        if action == SolverAction::Reset {
            self.ensure_initialized()?;
            self.state = SolverState::Initializing;
            self.previous_merit = None;
            self.pert_index = 0;
            self.iterations = 0;
            self.converged = false;
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
            SolverState::Calculating => self.take_step(),
            SolverState::Finished | SolverState::Iterating => {}
        }
        // Callback driven runs do not stop on the bookkeeping states
        if self.use_callbacks
            && matches!(
                self.state,
                SolverState::CheckingRun | SolverState::Calculating
            )
        {
            return self.advance_state();
        }
        debug!("{} -> {}", Self::NAME, self.state);
        Ok(self.state())
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
        check_index(index, self.result_slots(), false)?;
        // The objective has no desired value
        if index > 0 {
            self.constraints[index - 1].value = value;
        }
        Ok(())
    }

    fn set_result_value(&mut self, index: usize, value: f64) -> Result<(), SolverError> {
        check_index(index, self.result_slots(), false)?;
        self.ensure_initialized()?;
        if matches!(self.state, SolverState::Nominal | SolverState::Perturbing) {
            self.pass_results[index] = value;
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
        format!(
            "{} {} after {} iteration(s) -- {vars} -- merit = {}",
            Self::NAME,
            if self.converged { "converged" } else { "not converged" },
            self.iterations,
            self.nominal_merit
        )
    }
}
