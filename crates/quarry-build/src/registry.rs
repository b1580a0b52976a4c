//! Command registry: the mapping from slash-separated paths to commands.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::executor::Deps;

/// Shared handle to a command function.
///
/// Command functions receive the context and a [`Deps`] handle through which
/// they may demand other commands as prerequisites. The executor identifies a
/// command by the address of the shared allocation, so a cloned handle
/// registered under several paths is still a single node in the memoization
/// table, while wrapping the same closure twice produces two distinct nodes.
#[derive(Clone)]
pub struct CommandFn(Arc<dyn Fn(&Context, &Deps) -> Result<()> + Send + Sync>);

impl CommandFn {
    /// Wrap a closure into a command function handle.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Context, &Deps) -> Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub(crate) fn key(&self) -> CommandKey {
        CommandKey(Arc::as_ptr(&self.0) as *const () as usize)
    }

    pub(crate) fn call(&self, ctx: &Context, deps: &Deps) -> Result<()> {
        (self.0)(ctx, deps)
    }
}

/// Identity of a command function within one executor invocation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CommandKey(usize);

/// A registered command: a description shown in listings plus the function
/// executed when the command's path is requested.
pub struct Command {
    pub description: String,
    pub handler: CommandFn,
}

impl Command {
    /// Build a command from a fresh closure.
    pub fn new<F>(description: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Context, &Deps) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            handler: CommandFn::new(f),
        }
    }

    /// Build a command from an existing handle. Use this when the same
    /// function participates in dependency demands elsewhere, so that the
    /// registered command and the demanded one share their identity.
    pub fn from_fn(description: impl Into<String>, handler: CommandFn) -> Self {
        Self {
            description: description.into(),
            handler,
        }
    }
}

/// Mapping from command path to command.
///
/// Paths are non-empty, slash-separated and opaque; the slashes only group
/// commands for autocompletion. Each path may be registered once.
#[derive(Default)]
pub struct Registry {
    commands: BTreeMap<String, Command>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a set of commands. Fails on the first path that already
    /// exists; the registry keeps the entries added before the clash.
    pub fn register<I>(&mut self, commands: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, Command)>,
    {
        for (path, command) in commands {
            if self.commands.contains_key(&path) {
                return Err(Error::CommandAlreadyRegistered(path));
            }
            self.commands.insert(path, command);
        }
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&Command> {
        self.commands.get(path)
    }

    /// All registered paths, sorted.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Command)> {
        self.commands.iter().map(|(path, cmd)| (path.as_str(), cmd))
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
