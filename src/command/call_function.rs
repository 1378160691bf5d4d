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

use std::rc::Rc;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use snafu::prelude::*;

use super::{Context, Executable, Initializable, MissionSequence, Renameable, Serializable};
use crate::errors::{
    CommandError, IncompleteSnafu, InvalidCommandSnafu, MissingContextSnafu, StructuralSnafu,
    TypeMismatchSnafu, UnresolvedReferenceSnafu,
};
use crate::md::ParamError;
use crate::store::ObjectType;

lazy_static! {
    static ref CALL_RE: Regex = Regex::new(
        r"^\s*(?:\[\s*(?P<outputs>[^\]]*)\]\s*=\s*)?(?P<name>[A-Za-z_]\w*)\s*(?:\((?P<inputs>[^)]*)\))?\s*;?\s*$"
    )
    .unwrap();
}

fn split_names(list: Option<&str>) -> Vec<String> {
    list.map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

/// A script function: its formal parameters and the sequence it runs.
#[derive(Debug)]
pub struct ScriptFunction {
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub body: MissionSequence,
}

impl ScriptFunction {
    pub fn new(name: &str, inputs: &[&str], outputs: &[&str], body: MissionSequence) -> Self {
        Self {
            name: name.to_string(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            body,
        }
    }
}

/// `[out1, out2] = Name(in1, in2)` runs a function in its own local store.
///
/// Inputs are copied into the fresh local store under the names of the formal parameters,
/// the global store and the solar system are shared with the caller. Once the body ran,
/// the formal outputs are copied back into the caller's objects.
#[derive(Debug, Default)]
pub struct CallFunction {
    pub function_name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    function: Option<ScriptFunction>,
}

impl CallFunction {
    pub fn new(function: ScriptFunction, inputs: &[&str], outputs: &[&str]) -> Self {
        Self {
            function_name: function.name.clone(),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
            function: Some(function),
        }
    }

    /// Attaches the definition of the called function, returning the previous one
    pub fn attach(&mut self, function: ScriptFunction) -> Option<ScriptFunction> {
        self.function.replace(function)
    }

    pub fn function(&self) -> Option<&ScriptFunction> {
        self.function.as_ref()
    }
}

impl FromStr for CallFunction {
    type Err = ParamError;

    /// Parses `[a, b] = Name(x, y)`, `Name(x)` or `Name`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cap = CALL_RE.captures(s).ok_or_else(|| ParamError::Parse {
            text: s.to_string(),
            reason: "expected `[outputs] = Function(inputs)`".to_string(),
        })?;
        Ok(Self {
            function_name: cap["name"].to_string(),
            inputs: split_names(cap.name("inputs").map(|m| m.as_str())),
            outputs: split_names(cap.name("outputs").map(|m| m.as_str())),
            function: None,
        })
    }
}

fn run_body(body: &mut MissionSequence) -> Result<(), CommandError> {
    let mut cur = body.head();
    while let Some(id) = cur {
        if !body.execute(id)? {
            let generating = body
                .command(id)
                .map(|cmd| cmd.generating_string())
                .unwrap_or_default();
            return IncompleteSnafu { generating }.fail();
        }
        cur = body.get_next(id)?;
    }
    Ok(())
}

impl Initializable for CallFunction {
    fn initialize(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        let function = self.function.as_ref().context(MissingContextSnafu {
            command: "CallFunction",
            missing: format!("definition of `{}`", self.function_name),
        })?;
        ensure!(
            function.name == self.function_name,
            InvalidCommandSnafu {
                command: "CallFunction",
                details: format!(
                    "calls `{}` but `{}` is attached",
                    self.function_name, function.name
                ),
            }
        );
        ensure!(
            self.inputs.len() == function.inputs.len() && self.outputs.len() == function.outputs.len(),
            InvalidCommandSnafu {
                command: "CallFunction",
                details: format!(
                    "`{}` takes {} inputs and {} outputs, called with {} and {}",
                    function.name,
                    function.inputs.len(),
                    function.outputs.len(),
                    self.inputs.len(),
                    self.outputs.len()
                ),
            }
        );
        ensure!(
            function.body.open_branch_ends().is_empty(),
            StructuralSnafu {
                details: format!("function `{}` has unterminated branch commands", function.name),
            }
        );
        for name in self.inputs.iter().chain(&self.outputs) {
            ctx.scope().resolve("CallFunction", name)?;
        }
        Ok(true)
    }
}

impl Executable for CallFunction {
    fn execute(&mut self, ctx: &mut Context<'_>) -> Result<bool, CommandError> {
        let function = self.function.as_mut().context(MissingContextSnafu {
            command: "CallFunction",
            missing: format!("definition of `{}`", self.function_name),
        })?;
        let caller = ctx.scope().clone();
        let callee = caller.function_scope();
        let (los, _) = callee.stores("CallFunction")?;
        for (arg, param) in self.inputs.iter().zip(&function.inputs) {
            let mut copy = caller.resolve("CallFunction", arg)?.borrow().clone();
            copy.name = param.clone();
            copy.is_global = false;
            los.borrow_mut().insert(copy.shared());
        }

        debug!("calling `{}` with {} inputs", function.name, self.inputs.len());
        function.body.set_scope(&callee);
        if let Some(publisher) = ctx.publisher() {
            function.body.set_publisher(&publisher);
        }
        let rslt = function
            .body
            .initialize_all()
            .and_then(|_| run_body(&mut function.body));
        function.body.run_complete_all();
        rslt?;

        for (param, arg) in function.outputs.iter().zip(&self.outputs) {
            let result = callee.find_object(param).context(UnresolvedReferenceSnafu {
                command: format!("CallFunction {}", function.name),
                name: param,
            })?;
            let target = caller.resolve("CallFunction", arg)?;
            // A global output is already shared with the caller
            if Rc::ptr_eq(&result, &target) {
                continue;
            }
            let value = result.borrow();
            let mut dest = target.borrow_mut();
            dest.check_compatible(&value)
                .context(TypeMismatchSnafu {
                    command: "CallFunction",
                })?;
            dest.kind = value.kind.clone();
        }
        Ok(true)
    }
}

impl Renameable for CallFunction {
    fn rename_ref_object(&mut self, _: ObjectType, old_name: &str, new_name: &str) -> bool {
        for name in self
            .inputs
            .iter_mut()
            .chain(self.outputs.iter_mut())
            .filter(|name| *name == old_name)
        {
            *name = new_name.to_string();
        }
        true
    }
}

impl Serializable for CallFunction {
    fn type_name(&self) -> &str {
        "CallFunction"
    }

    fn generating_string(&self) -> String {
        let call = if self.inputs.is_empty() {
            self.function_name.clone()
        } else {
            format!("{}({})", self.function_name, self.inputs.join(", "))
        };
        if self.outputs.is_empty() {
            format!("{call};")
        } else {
            format!("[{}] = {call};", self.outputs.join(", "))
        }
    }
}
