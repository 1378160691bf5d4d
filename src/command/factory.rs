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

use std::collections::BTreeMap;
use std::fmt;

use super::{
    Achieve, Assignment, BranchEnd, CallFunction, Command, CommandKind, Create, CustomCommand,
    EndKind, For, Global, If, Minimize, NoOp, NonlinearConstraint, SolverLoop, SolverLoopKind,
    Vary, While,
};
use crate::errors::CommandError;

/// Builds a fresh instance of a custom command.
pub type CustomCommandBuilder = Box<dyn Fn() -> Box<dyn CustomCommand>>;

/// Creates commands from their script type name.
///
/// Built-in commands come with their default settings, custom commands are created by
/// the builder they were registered with. A custom registration shadows the built-in
/// command of the same name.
pub struct CommandFactory {
    custom: BTreeMap<String, CustomCommandBuilder>,
}

impl fmt::Debug for CommandFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandFactory")
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for CommandFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandFactory {
    pub const BUILT_IN: [&'static str; 20] = [
        "NoOp",
        "Create",
        "Global",
        "Assignment",
        "CallFunction",
        "Vary",
        "Achieve",
        "Minimize",
        "NonlinearConstraint",
        "If",
        "Else",
        "EndIf",
        "For",
        "EndFor",
        "While",
        "EndWhile",
        "Target",
        "EndTarget",
        "Optimize",
        "EndOptimize",
    ];

    pub fn new() -> Self {
        Self {
            custom: BTreeMap::new(),
        }
    }

    /// Registers a custom command, returns false if a custom command of that name was replaced.
    pub fn register(&mut self, type_name: &str, builder: CustomCommandBuilder) -> bool {
        let replaced = self.custom.insert(type_name.to_string(), builder).is_some();
        if replaced {
            warn!("custom command `{type_name}` registered twice, keeping the latest");
        } else if Self::BUILT_IN.contains(&type_name) {
            warn!("custom command `{type_name}` shadows the built-in command");
        }
        !replaced
    }

    /// Every type name this factory can create
    pub fn type_names(&self) -> Vec<String> {
        let mut names = Self::BUILT_IN
            .iter()
            .map(|name| name.to_string())
            .filter(|name| !self.custom.contains_key(name))
            .collect::<Vec<_>>();
        names.extend(self.custom.keys().cloned());
        names
    }

    pub fn create(&self, type_name: &str) -> Result<Command, CommandError> {
        if let Some(builder) = self.custom.get(type_name) {
            return Ok(Command::custom(builder()));
        }
        let kind: CommandKind = match type_name {
            "NoOp" => NoOp.into(),
            "Create" => Create::default().into(),
            "Global" => Global::default().into(),
            "Assignment" => Assignment::default().into(),
            "CallFunction" => CallFunction::default().into(),
            "Vary" => Vary::default().into(),
            "Achieve" => Achieve::default().into(),
            "Minimize" => Minimize::default().into(),
            "NonlinearConstraint" => NonlinearConstraint::default().into(),
            "If" => If::default().into(),
            "Else" => BranchEnd::new(EndKind::Else).into(),
            "EndIf" => BranchEnd::new(EndKind::EndIf).into(),
            "For" => For::default().into(),
            "EndFor" => BranchEnd::new(EndKind::EndFor).into(),
            "While" => While::default().into(),
            "EndWhile" => BranchEnd::new(EndKind::EndWhile).into(),
            "Target" => SolverLoop::new(SolverLoopKind::Target, "").into(),
            "EndTarget" => BranchEnd::new(EndKind::EndTarget).into(),
            "Optimize" => SolverLoop::new(SolverLoopKind::Optimize, "").into(),
            "EndOptimize" => BranchEnd::new(EndKind::EndOptimize).into(),
            _ => {
                return Err(CommandError::UnknownCommand {
                    type_name: type_name.to_string(),
                })
            }
        };
        Ok(Command::new(kind))
    }
}

#[cfg(test)]
mod ut_factory {
    use super::*;
    use crate::command::{Context, Executable, Initializable, Renameable, Serializable};
    use crate::store::ObjectType;

    #[derive(Debug, Default)]
    struct Report;

    impl Initializable for Report {
        fn initialize(&mut self, _ctx: &mut Context<'_>) -> Result<bool, CommandError> {
            Ok(true)
        }
    }

    impl Executable for Report {
        fn execute(&mut self, _ctx: &mut Context<'_>) -> Result<bool, CommandError> {
            Ok(true)
        }
    }

    impl Renameable for Report {
        fn rename_ref_object(&mut self, _: ObjectType, _: &str, _: &str) -> bool {
            true
        }
    }

    impl Serializable for Report {
        fn type_name(&self) -> &str {
            "Report"
        }

        fn generating_string(&self) -> String {
            "Report;".to_string()
        }
    }

    #[test]
    fn built_in_names_round_trip() {
        let factory = CommandFactory::new();
        for name in CommandFactory::BUILT_IN {
            let cmd = factory.create(name).unwrap();
            assert_eq!(cmd.type_name(), name);
        }
        assert!(matches!(
            factory.create("Propagate"),
            Err(CommandError::UnknownCommand { .. })
        ));
    }

    #[test]
    fn custom_commands() {
        let mut factory = CommandFactory::new();
        assert!(factory.register("Report", Box::new(|| Box::new(Report) as Box<dyn CustomCommand>)));
        assert!(!factory.register("Report", Box::new(|| Box::new(Report) as Box<dyn CustomCommand>)));
        let cmd = factory.create("Report").unwrap();
        assert_eq!(cmd.generating_string(), "Report;");
        assert_eq!(factory.type_names().len(), CommandFactory::BUILT_IN.len() + 1);
    }
}
