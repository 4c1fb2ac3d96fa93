//! The plugin contract between the host and a loaded game.
//!
//! Every hook is an optional slot. The host checks for presence before each
//! call and never reassigns a slot once the module is built.

use std::fmt;
use std::future::Future;
use std::rc::Rc;

use anyhow::Result;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::capabilities::Capabilities;
use crate::input::Controller;

pub type InitHook = Box<dyn FnMut(&Capabilities) -> Result<()>>;
pub type LoadHook = Box<dyn FnMut() -> LocalBoxFuture<'static, Result<()>>>;
pub type SaveStateHook = Box<dyn FnMut() -> Result<Value>>;
pub type LoadStateHook = Box<dyn FnMut(&Value) -> Result<()>>;
pub type AgentStateHook = Box<dyn FnMut() -> Result<Value>>;
pub type TickHook = Box<dyn FnMut(&[Controller], f64, bool) -> Result<()>>;

/// Names of the hooks a game may export, in call-site order.
pub const HOOK_NAMES: [&str; 6] = [
    "init",
    "load",
    "saveState",
    "loadState",
    "getStateForAgent",
    "tick",
];

/// A loaded game: a fixed set of optional hooks.
#[derive(Default)]
pub struct GameModule {
    init: Option<InitHook>,
    load: Option<LoadHook>,
    save_state: Option<SaveStateHook>,
    load_state: Option<LoadStateHook>,
    state_for_agent: Option<AgentStateHook>,
    tick: Option<TickHook>,
}

impl GameModule {
    pub fn builder() -> GameModuleBuilder {
        GameModuleBuilder::default()
    }

    /// Module without any hooks; it loads, ticks and renders nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Names of the hooks this module provides.
    pub fn hook_names(&self) -> Vec<&'static str> {
        let present = [
            self.init.is_some(),
            self.load.is_some(),
            self.save_state.is_some(),
            self.load_state.is_some(),
            self.state_for_agent.is_some(),
            self.tick.is_some(),
        ];
        HOOK_NAMES
            .iter()
            .zip(present)
            .filter_map(|(name, present)| present.then_some(*name))
            .collect()
    }

    pub fn has_tick(&self) -> bool {
        self.tick.is_some()
    }

    pub(crate) fn call_init(&mut self, capabilities: &Capabilities) -> Option<Result<()>> {
        self.init.as_mut().map(|hook| hook(capabilities))
    }

    pub(crate) fn call_load(&mut self) -> Option<LocalBoxFuture<'static, Result<()>>> {
        self.load.as_mut().map(|hook| hook())
    }

    pub(crate) fn call_save_state(&mut self) -> Option<Result<Value>> {
        self.save_state.as_mut().map(|hook| hook())
    }

    pub(crate) fn call_load_state(&mut self, state: &Value) -> Option<Result<()>> {
        self.load_state.as_mut().map(|hook| hook(state))
    }

    pub(crate) fn call_state_for_agent(&mut self) -> Option<Result<Value>> {
        self.state_for_agent.as_mut().map(|hook| hook())
    }

    pub(crate) fn call_tick(
        &mut self,
        controllers: &[Controller],
        delta: f64,
        render: bool,
    ) -> Option<Result<()>> {
        self.tick
            .as_mut()
            .map(|hook| hook(controllers, delta, render))
    }
}

impl fmt::Debug for GameModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameModule")
            .field("hooks", &self.hook_names())
            .finish()
    }
}

/// Assembles a [`GameModule`]; slots left unset stay absent.
#[derive(Default)]
pub struct GameModuleBuilder {
    module: GameModule,
}

impl GameModuleBuilder {
    pub fn init<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&Capabilities) -> Result<()> + 'static,
    {
        self.module.init = Some(Box::new(hook));
        self
    }

    pub fn load<F, Fut>(mut self, mut hook: F) -> Self
    where
        F: FnMut() -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        self.module.load = Some(Box::new(move || hook().boxed_local()));
        self
    }

    pub fn save_state<F>(mut self, hook: F) -> Self
    where
        F: FnMut() -> Result<Value> + 'static,
    {
        self.module.save_state = Some(Box::new(hook));
        self
    }

    pub fn load_state<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&Value) -> Result<()> + 'static,
    {
        self.module.load_state = Some(Box::new(hook));
        self
    }

    pub fn state_for_agent<F>(mut self, hook: F) -> Self
    where
        F: FnMut() -> Result<Value> + 'static,
    {
        self.module.state_for_agent = Some(Box::new(hook));
        self
    }

    pub fn tick<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&[Controller], f64, bool) -> Result<()> + 'static,
    {
        self.module.tick = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> GameModule {
        self.module
    }
}

pub type EntrypointFuture = LocalBoxFuture<'static, Result<GameModule>>;

/// Host-side constructor for a game, invoked with the capability surface.
#[derive(Clone)]
pub struct InlineEntrypoint(Rc<dyn Fn(Capabilities) -> EntrypointFuture>);

impl InlineEntrypoint {
    pub fn new<F, Fut>(entry: F) -> Self
    where
        F: Fn(Capabilities) -> Fut + 'static,
        Fut: Future<Output = Result<GameModule>> + 'static,
    {
        Self(Rc::new(move |capabilities| entry(capabilities).boxed_local()))
    }

    /// Wraps a synchronous constructor.
    pub fn from_fn<F>(entry: F) -> Self
    where
        F: Fn(&Capabilities) -> Result<GameModule> + 'static,
    {
        Self::new(move |capabilities| futures::future::ready(entry(&capabilities)))
    }

    pub(crate) fn invoke(&self, capabilities: Capabilities) -> EntrypointFuture {
        (self.0)(capabilities)
    }
}

impl fmt::Debug for InlineEntrypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InlineEntrypoint(..)")
    }
}
