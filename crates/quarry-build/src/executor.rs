//! Dependency executor: memoizing, cycle-detecting command runner.
//!
//! All execution flows through [`Deps::demand`]: the requested commands are
//! turned into one top-level demand, and every command may recursively demand
//! further commands through the handle it receives. Commands run strictly
//! sequentially, each one (including its transitive demands) to completion
//! before the next starts, which yields a deterministic depth-first
//! post-order traversal of the demand graph.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::registry::{CommandFn, CommandKey, Registry};

const MAX_STACK: usize = 100;

/// Handle through which a running command demands prerequisite commands.
pub struct Deps<'a> {
    ctx: &'a Context,
    state: RefCell<State>,
}

#[derive(Default)]
struct State {
    executed: HashSet<CommandKey>,
    stack: HashSet<CommandKey>,
}

impl<'a> Deps<'a> {
    fn new(ctx: &'a Context) -> Self {
        Self {
            ctx,
            state: RefCell::new(State::default()),
        }
    }

    /// Run the given commands in order, each to completion (including its
    /// own transitive demands) before the next one starts.
    ///
    /// A command that already completed within this invocation is skipped.
    /// A command that is currently in progress is a dependency cycle. The
    /// first error aborts the whole invocation; cancellation is observed
    /// between commands.
    pub fn demand(&self, commands: &[CommandFn]) -> Result<()> {
        for command in commands {
            self.ctx.check_cancelled()?;

            let key = command.key();
            {
                let mut state = self.state.borrow_mut();
                if state.executed.contains(&key) {
                    continue;
                }
                if state.stack.contains(&key) {
                    return Err(Error::DependencyCycle);
                }
                if state.stack.len() >= MAX_STACK {
                    return Err(Error::StackOverflow);
                }
                state.stack.insert(key);
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| command.call(self.ctx, self)));

            self.state.borrow_mut().stack.remove(&key);
            match outcome {
                Ok(Ok(())) => {
                    self.state.borrow_mut().executed.insert(key);
                }
                Ok(Err(err)) => return Err(err),
                Err(payload) => return Err(Error::CommandPanicked(panic_message(payload))),
            }
        }
        Ok(())
    }
}

/// Execute the commands registered under `paths`.
///
/// Every path is resolved against the registry before anything runs, so a
/// missing path fails the invocation without side effects. Panics raised by
/// command functions never escape this function; they come back as
/// [`Error::CommandPanicked`].
pub fn execute<S: AsRef<str>>(ctx: &Context, registry: &Registry, paths: &[S]) -> Result<()> {
    let mut init = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let command = registry
            .get(path)
            .ok_or_else(|| Error::CommandNotFound(path.to_string()))?;
        init.push(command.handler.clone());
    }
    Deps::new(ctx).demand(&init)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
