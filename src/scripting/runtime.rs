use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use log::debug;
use mlua::{
    Function, HookTriggers, Lua, LuaOptions, LuaSerdeExt, RegistryKey, StdLib, Table,
    Thread, Value as LuaValue,
};
use serde_json::Value;

use crate::capabilities::Capabilities;
use crate::game::{GameModule, HOOK_NAMES};
use crate::input::Controller;

use super::bindings::{build_environment, LuaCapabilities};

/// Instructions between two budget checks.
const BUDGET_STEP: u32 = 1000;

/// `coroutine.wrap` on top of a metered `create`.
const WRAP_SOURCE: &str = r#"
local create, resume = ...
return function(body)
    local co = create(body)
    return function(...)
        local results = table.pack(resume(co, ...))
        if not results[1] then
            error(results[2], 0)
        end
        return table.unpack(results, 2, results.n)
    end
end
"#;

/// Per-call instruction allowance; `0` disables the check.
#[derive(Debug, Clone)]
struct InstructionBudget {
    limit: u64,
    used: Rc<Cell<u64>>,
}

impl InstructionBudget {
    fn new(limit: u64) -> Self {
        Self {
            limit,
            used: Rc::new(Cell::new(0)),
        }
    }

    fn triggers() -> HookTriggers {
        HookTriggers {
            every_nth_instruction: Some(BUDGET_STEP),
            ..Default::default()
        }
    }

    fn charge(&self) -> mlua::Result<()> {
        let total = self.used.get() + u64::from(BUDGET_STEP);
        self.used.set(total);
        if total > self.limit {
            Err(mlua::Error::RuntimeError(format!(
                "instruction budget of {} exceeded",
                self.limit
            )))
        } else {
            Ok(())
        }
    }

    fn install(&self, lua: &Lua) {
        if self.limit != 0 {
            let budget = self.clone();
            lua.set_hook(Self::triggers(), move |_, _| budget.charge());
        }
    }

    /// Hooks are per thread, so every coroutine needs its own.
    fn watch(&self, thread: &Thread) {
        if self.limit != 0 {
            let budget = self.clone();
            thread.set_hook(Self::triggers(), move |_, _| budget.charge());
        }
    }

    /// Swaps `coroutine.create` and `coroutine.wrap` in `env` for versions
    /// whose threads are metered like the main one.
    fn guard_coroutines<'lua>(&self, lua: &'lua Lua, env: &Table<'lua>) -> mlua::Result<()> {
        if self.limit == 0 {
            return Ok(());
        }
        let library: Table = lua.globals().get("coroutine")?;
        let guarded = lua.create_table()?;
        for pair in library.clone().pairs::<LuaValue, LuaValue>() {
            let (key, value) = pair?;
            guarded.set(key, value)?;
        }

        let budget = self.clone();
        let create = lua.create_function(move |lua, body: Function| {
            let thread = lua.create_thread(body)?;
            budget.watch(&thread);
            Ok(thread)
        })?;
        let resume: Function = library.get("resume")?;
        let wrap: Function = lua
            .load(WRAP_SOURCE)
            .set_name("coroutine.wrap")
            .call((create.clone(), resume))?;

        guarded.set("create", create)?;
        guarded.set("wrap", wrap)?;
        env.set("coroutine", guarded)
    }

    fn reset(&self) {
        self.used.set(0);
    }
}

/// A game script instantiated in its own interpreter, together with the
/// hook functions it exported.
pub struct LuaGame {
    name: String,
    hooks: HashMap<&'static str, RegistryKey>,
    budget: InstructionBudget,
    lua: Lua,
}

impl LuaGame {
    /// Runs `source` in a fresh sandbox and wraps its hooks as a
    /// [`GameModule`].
    pub fn instantiate(
        name: &str,
        source: &str,
        capabilities: &Capabilities,
        instruction_budget: u64,
    ) -> Result<GameModule> {
        let game = Rc::new(Self::load(name, source, capabilities, instruction_budget)?);
        Ok(game.into_module())
    }

    fn load(
        name: &str,
        source: &str,
        capabilities: &Capabilities,
        instruction_budget: u64,
    ) -> Result<Self> {
        let lua = Lua::new_with(
            StdLib::MATH | StdLib::STRING | StdLib::TABLE | StdLib::COROUTINE,
            LuaOptions::new(),
        )
        .context("failed to create Lua state")?;
        let budget = InstructionBudget::new(instruction_budget);
        budget.install(&lua);

        let hooks = {
            let env =
                build_environment(&lua, capabilities).context("failed to build game scope")?;
            budget
                .guard_coroutines(&lua, &env)
                .context("failed to build game scope")?;
            lua.load(source)
                .set_name(name)
                .set_environment(env.clone())
                .exec()
                .map_err(anyhow::Error::from)
                .context("Lua runtime error")?;
            let hooks = collect_hooks(&lua, &env)?;
            hooks
        };
        debug!("{name} exported {} hook(s)", hooks.len());
        Ok(Self {
            name: name.to_string(),
            hooks,
            budget,
            lua,
        })
    }

    fn into_module(self: Rc<Self>) -> GameModule {
        let mut builder = GameModule::builder();
        if self.has("init") {
            let game = Rc::clone(&self);
            builder = builder.init(move |capabilities| game.call_init(capabilities));
        }
        if self.has("load") {
            let game = Rc::clone(&self);
            builder = builder.load(move || {
                let game = Rc::clone(&game);
                async move { game.call_load().await }
            });
        }
        if self.has("saveState") {
            let game = Rc::clone(&self);
            builder = builder.save_state(move || game.call_for_value("saveState"));
        }
        if self.has("loadState") {
            let game = Rc::clone(&self);
            builder = builder.load_state(move |state| game.call_load_state(state));
        }
        if self.has("getStateForAgent") {
            let game = Rc::clone(&self);
            builder = builder.state_for_agent(move || game.call_for_value("getStateForAgent"));
        }
        if self.has("tick") {
            let game = Rc::clone(&self);
            builder = builder.tick(move |controllers, delta, render| {
                game.call_tick(controllers, delta, render)
            });
        }
        builder.build()
    }

    fn has(&self, hook: &str) -> bool {
        self.hooks.contains_key(hook)
    }

    fn function(&self, hook: &str) -> Result<Function<'_>> {
        let key = self
            .hooks
            .get(hook)
            .ok_or_else(|| anyhow!("{} has no {hook} hook", self.name))?;
        self.budget.reset();
        Ok(self.lua.registry_value(key)?)
    }

    fn call_init(&self, capabilities: &Capabilities) -> Result<()> {
        let init = self.function("init")?;
        init.call::<_, ()>(LuaCapabilities(capabilities.clone()))
            .map_err(anyhow::Error::from)
    }

    async fn call_load(&self) -> Result<()> {
        let load = self.function("load")?;
        let thread = self.lua.create_thread(load)?;
        self.budget.watch(&thread);
        thread.into_async::<_, ()>(()).await?;
        Ok(())
    }

    fn call_for_value(&self, hook: &str) -> Result<Value> {
        let function = self.function(hook)?;
        let value: LuaValue = function.call(())?;
        Ok(self.lua.from_value(value)?)
    }

    fn call_load_state(&self, state: &Value) -> Result<()> {
        let function = self.function("loadState")?;
        let state = self.lua.to_value(state)?;
        function.call::<_, ()>(state)?;
        Ok(())
    }

    fn call_tick(&self, controllers: &[Controller], delta: f64, render: bool) -> Result<()> {
        let tick = self.function("tick")?;
        let controllers = controllers_table(&self.lua, controllers)?;
        tick.call::<_, ()>((controllers, delta, render))?;
        Ok(())
    }
}

fn collect_hooks(lua: &Lua, env: &Table) -> Result<HashMap<&'static str, RegistryKey>> {
    let mut hooks = HashMap::new();
    for name in HOOK_NAMES {
        if let LuaValue::Function(function) = env.get::<_, LuaValue>(name)? {
            hooks.insert(name, lua.create_registry_value(function)?);
        }
    }
    Ok(hooks)
}

fn controllers_table<'lua>(lua: &'lua Lua, controllers: &[Controller]) -> Result<Table<'lua>> {
    let list = lua.create_table_with_capacity(controllers.len(), 0)?;
    for (index, controller) in controllers.iter().enumerate() {
        let buttons = lua.create_table()?;
        for button in controller.pressed() {
            buttons.set(button.name(), true)?;
        }
        list.set(index + 1, buttons)?;
    }
    Ok(list)
}
