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

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// What the run is doing when data is published.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    /// A solver loop is running trial passes
    Solving,
    /// A solver loop is running the pass of its solution
    SolvedPass,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Running => write!(f, "RUNNING"),
            Self::Solving => write!(f, "SOLVING"),
            Self::SolvedPass => write!(f, "SOLVEDPASS"),
        }
    }
}

/// Telemetry sink the commands report to.
pub trait Publisher: fmt::Debug {
    fn set_run_state(&mut self, state: RunState);

    fn run_state(&self) -> RunState;

    /// Registers a data provider and the labels of the values it publishes, returning its id.
    /// Registering the same owner again returns the same id.
    fn register_published_data(&mut self, owner: &str, labels: &[String]) -> usize;

    fn publish(&mut self, provider: usize, data: &[f64]);

    fn notify_end_of_run(&mut self);
}

pub type SharedPublisher = Rc<RefCell<dyn Publisher>>;

/// One call to `publish`.
#[derive(Clone, Debug, PartialEq)]
pub struct PublishedRecord {
    pub provider: usize,
    pub owner: String,
    pub run_state: RunState,
    pub data: Vec<f64>,
}

/// A publisher that keeps everything in memory.
#[derive(Clone, Debug, Default)]
pub struct RecordingPublisher {
    providers: Vec<(String, Vec<String>)>,
    records: Vec<PublishedRecord>,
    state: RunState,
    state_history: Vec<RunState>,
    runs_ended: usize,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(self))
    }

    pub fn records(&self) -> &[PublishedRecord] {
        &self.records
    }

    /// Records published while the run was in the provided state
    pub fn records_in(&self, state: RunState) -> impl Iterator<Item = &PublishedRecord> {
        self.records.iter().filter(move |rec| rec.run_state == state)
    }

    pub fn labels(&self, provider: usize) -> Option<&[String]> {
        self.providers
            .get(provider)
            .map(|(_, labels)| labels.as_slice())
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Every run state change, in order, skipping repeated states
    pub fn state_history(&self) -> &[RunState] {
        &self.state_history
    }

    pub fn runs_ended(&self) -> usize {
        self.runs_ended
    }
}

impl Publisher for RecordingPublisher {
    fn set_run_state(&mut self, state: RunState) {
        if self.state_history.last() != Some(&state) {
            self.state_history.push(state);
        }
        self.state = state;
    }

    fn run_state(&self) -> RunState {
        self.state
    }

    fn register_published_data(&mut self, owner: &str, labels: &[String]) -> usize {
        if let Some(idx) = self.providers.iter().position(|(name, _)| name == owner) {
            self.providers[idx].1 = labels.to_vec();
            return idx;
        }
        self.providers.push((owner.to_string(), labels.to_vec()));
        self.providers.len() - 1
    }

    fn publish(&mut self, provider: usize, data: &[f64]) {
        let owner = match self.providers.get(provider) {
            Some((owner, _)) => owner.clone(),
            None => {
                warn!("dropping data published by unregistered provider #{provider}");
                return;
            }
        };
        self.records.push(PublishedRecord {
            provider,
            owner,
            run_state: self.state,
            data: data.to_vec(),
        });
    }

    fn notify_end_of_run(&mut self) {
        self.runs_ended += 1;
    }
}
