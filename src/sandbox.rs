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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use snafu::prelude::*;

use crate::command::{Command, CommandId, MissionSequence};
use crate::cosmic::{SharedSolarSystem, SolarSystem};
use crate::errors::{
    CommandError, IncompleteSnafu, InterruptedSnafu, StructuralSnafu, TypeMismatchSnafu,
};
use crate::io::{ConfigError, InvalidConfigSnafu, ResourcesRepr};
use crate::publisher::{RecordingPublisher, RunState, SharedPublisher};
use crate::store::{insert_into_object_store, ObjectRef, ObjectStore, Scope, SharedStore, SimObject};
use crate::time::{Duration, Unit};

/// Outcome of a complete run of the mission sequence.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RunReport {
    /// Number of top level executions, a branch command counts once per tick
    pub ticks: usize,
    /// Wall clock duration of the run
    pub elapsed: Duration,
}

/// Owns the object stores and the mission sequence, and drives the run.
///
/// The stores are injected in every command before initialization. The run then ticks the
/// main chain: the current command executes, and the command it names as next runs after it.
/// Branch commands name themselves while their branches are executing.
#[derive(Debug)]
pub struct Sandbox {
    los: SharedStore,
    gos: SharedStore,
    solar_system: SharedSolarSystem,
    publisher: SharedPublisher,
    sequence: MissionSequence,
    interrupt: Arc<AtomicBool>,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Sandbox {
    /// A sandbox with empty stores, the default solar system and an in-memory publisher.
    pub fn new() -> Self {
        Self::with_publisher(RecordingPublisher::new().shared())
    }

    pub fn with_publisher(publisher: SharedPublisher) -> Self {
        Self {
            los: ObjectStore::new().shared(),
            gos: ObjectStore::new().shared(),
            solar_system: SolarSystem::default().shared(),
            publisher,
            sequence: MissionSequence::new(),
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_solar_system(mut self, solar_system: SolarSystem) -> Self {
        self.solar_system = solar_system.shared();
        self
    }

    pub fn local_store(&self) -> &SharedStore {
        &self.los
    }

    pub fn global_store(&self) -> &SharedStore {
        &self.gos
    }

    pub fn solar_system(&self) -> &SharedSolarSystem {
        &self.solar_system
    }

    /// The stores as every command of this sandbox sees them
    pub fn scope(&self) -> Scope {
        Scope::new(
            self.los.clone(),
            self.gos.clone(),
            self.solar_system.clone(),
        )
    }

    pub fn sequence(&self) -> &MissionSequence {
        &self.sequence
    }

    pub fn sequence_mut(&mut self) -> &mut MissionSequence {
        &mut self.sequence
    }

    pub fn publisher(&self) -> &SharedPublisher {
        &self.publisher
    }

    /// Flag polled between ticks; setting it interrupts the run before the next interruptible command.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    /// Adds a resource to the local store, or to the global store if it is flagged global.
    pub fn add_object(&mut self, obj: SimObject) -> Result<ObjectRef, CommandError> {
        let inserted = insert_into_object_store(&self.los, &self.gos, obj)
            .context(TypeMismatchSnafu { command: "Sandbox" })?;
        Ok(inserted.object().clone())
    }

    /// Adds every resource of the configuration, returning how many objects were added.
    pub fn add_resources(&mut self, resources: ResourcesRepr) -> Result<usize, ConfigError> {
        let objects = resources.into_objects()?;
        let count = objects.len();
        for obj in objects {
            let name = obj.name.clone();
            self.add_object(obj).map_err(|e| {
                InvalidConfigSnafu {
                    msg: format!("resource `{name}`: {e}"),
                }
                .build()
            })?;
        }
        debug!("added {count} resources");
        Ok(count)
    }

    /// Appends a command to the mission sequence.
    pub fn append(&mut self, cmd: Command) -> Result<CommandId, CommandError> {
        self.sequence.append(cmd)
    }

    /// Empties the stores and the mission sequence.
    pub fn clear(&mut self) {
        self.los.borrow_mut().clear();
        self.gos.borrow_mut().clear();
        self.sequence.clear();
    }

    /// Injects the stores and the publisher, then initializes the whole sequence.
    pub fn initialize(&mut self) -> Result<(), CommandError> {
        let open = self.sequence.open_branch_ends();
        if !open.is_empty() {
            let missing = open
                .iter()
                .map(|end| end.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            error!("mission sequence is missing {missing}");
            return StructuralSnafu {
                details: format!("unterminated branch commands, missing {missing}"),
            }
            .fail();
        }
        let scope = self.scope();
        self.sequence.set_scope(&scope);
        self.sequence.set_publisher(&self.publisher);
        self.sequence.initialize_all()?;
        self.sequence.configuration_changed(false);
        Ok(())
    }

    /// Initializes then runs the mission sequence to its end.
    ///
    /// Whatever the outcome, every command is notified that the run completed and the
    /// publisher is told the run ended.
    pub fn execute(&mut self) -> Result<RunReport, CommandError> {
        self.initialize()?;
        let start = Instant::now();
        info!("running mission sequence of {} commands", self.sequence.len());
        self.publisher.borrow_mut().set_run_state(RunState::Running);

        let mut ticks = 0;
        let rslt = self.run(&mut ticks);

        self.sequence.run_complete_all();
        {
            let mut publisher = self.publisher.borrow_mut();
            publisher.set_run_state(RunState::Idle);
            publisher.notify_end_of_run();
        }
        let elapsed = Unit::Second * start.elapsed().as_secs_f64();
        match rslt {
            Ok(()) => {
                info!("mission sequence completed in {ticks} ticks ({elapsed})");
                Ok(RunReport { ticks, elapsed })
            }
            Err(e) => {
                error!("mission sequence failed after {ticks} ticks: {e}");
                Err(e)
            }
        }
    }

    fn run(&mut self, ticks: &mut usize) -> Result<(), CommandError> {
        let mut cur = self.sequence.head();
        while let Some(id) = cur {
            if !self.sequence.skip_interrupt(id) && self.interrupt.swap(false, Ordering::SeqCst) {
                let command = self
                    .sequence
                    .command(id)
                    .map(|cmd| cmd.generating_string())
                    .unwrap_or_default();
                warn!("user interrupt before `{command}`");
                return InterruptedSnafu { command }.fail();
            }
            let done = self.sequence.execute(id)?;
            *ticks += 1;
            if !done {
                let generating = self
                    .sequence
                    .command(id)
                    .map(|cmd| cmd.generating_string())
                    .unwrap_or_default();
                return IncompleteSnafu { generating }.fail();
            }
            cur = self.sequence.get_next(id)?;
        }
        Ok(())
    }
}
