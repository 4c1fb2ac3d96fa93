use log::info;

use crate::capabilities::Capabilities;
use crate::content::FetchError;
use crate::error::BootError;
use crate::game::GameModule;
use crate::header::{Entrypoint, GameHeader};
use crate::scripting::LuaGame;

/// Fetches, instantiates and initializes a game module, strictly in order.
#[derive(Debug, Clone, Default)]
pub struct GameLoader {
    entrypoint: Option<Entrypoint>,
    instruction_budget: u64,
}

impl GameLoader {
    /// `entrypoint` overrides the header's `main` when set.
    pub fn new(entrypoint: Option<Entrypoint>, instruction_budget: u64) -> Self {
        Self {
            entrypoint,
            instruction_budget,
        }
    }

    pub fn resolve_entrypoint(&self, header: &GameHeader) -> Result<Entrypoint, BootError> {
        self.entrypoint
            .clone()
            .or_else(|| header.main.clone())
            .ok_or(BootError::MissingEntrypoint)
    }

    /// Runs the boot chain: resolve, obtain, instantiate, `init`, `load`.
    /// No step is retried.
    pub async fn load(&self, capabilities: &Capabilities) -> Result<GameModule, BootError> {
        let entrypoint = self.resolve_entrypoint(&capabilities.header())?;
        let mut module = match entrypoint {
            Entrypoint::Inline(entry) => entry.invoke(capabilities.clone()).await.map_err(
                |source| BootError::InstantiationFailure {
                    name: "inline entrypoint".into(),
                    source,
                },
            )?,
            Entrypoint::Script(path) => self.instantiate_script(&path, capabilities).await?,
        };

        let hooks = module.hook_names();
        if hooks.is_empty() {
            info!("game module exports no hooks");
        } else {
            info!("game module hooks: {}", hooks.join(", "));
        }

        if let Some(result) = module.call_init(capabilities) {
            result.map_err(BootError::InitFailure)?;
        }
        if let Some(pending) = module.call_load() {
            pending.await.map_err(BootError::LoadFailure)?;
        }
        Ok(module)
    }

    async fn instantiate_script(
        &self,
        path: &str,
        capabilities: &Capabilities,
    ) -> Result<GameModule, BootError> {
        let fetch_failure = |source: FetchError| BootError::FetchFailure {
            path: path.to_string(),
            source,
        };
        let source = capabilities
            .content()
            .fetch(path)
            .await
            .and_then(|content| content.into_text())
            .map_err(fetch_failure)?;

        LuaGame::instantiate(path, &source, capabilities, self.instruction_budget).map_err(
            |source| BootError::InstantiationFailure {
                name: path.to_string(),
                source,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use anyhow::anyhow;

    use crate::capabilities::test_host;
    use crate::content::MemoryProvider;
    use crate::game::InlineEntrypoint;
    use crate::resolution::Resolution;

    fn capabilities(content: MemoryProvider) -> Capabilities {
        Capabilities::new(test_host(Resolution::new(8, 8), Rc::new(content)))
    }

    #[test]
    fn missing_entrypoint_is_reported() {
        let loader = GameLoader::default();
        let err = pollster::block_on(loader.load(&capabilities(MemoryProvider::new())))
            .unwrap_err();
        assert!(matches!(err, BootError::MissingEntrypoint));
    }

    #[test]
    fn override_wins_over_header() {
        let loader = GameLoader::new(Some(Entrypoint::script("override.lua")), 0);
        let header = GameHeader::default().with_main(Entrypoint::script("main.lua"));
        match loader.resolve_entrypoint(&header).unwrap() {
            Entrypoint::Script(path) => assert_eq!(path, "override.lua"),
            other => panic!("unexpected entrypoint {other:?}"),
        }
    }

    #[test]
    fn hooks_run_in_boot_order() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let recorded = Rc::clone(&calls);
        let entry = InlineEntrypoint::from_fn(move |_| {
            let on_init = Rc::clone(&recorded);
            let on_load = Rc::clone(&recorded);
            recorded.borrow_mut().push("construct");
            Ok(GameModule::builder()
                .init(move |_| {
                    on_init.borrow_mut().push("init");
                    Ok(())
                })
                .load(move || {
                    on_load.borrow_mut().push("load");
                    futures::future::ready(Ok(()))
                })
                .build())
        });
        let loader = GameLoader::new(Some(Entrypoint::inline(entry)), 0);
        pollster::block_on(loader.load(&capabilities(MemoryProvider::new()))).unwrap();
        assert_eq!(*calls.borrow(), vec!["construct", "init", "load"]);
    }

    #[test]
    fn init_failure_skips_load() {
        let loaded = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&loaded);
        let entry = InlineEntrypoint::from_fn(move |_| {
            let flag = Rc::clone(&flag);
            Ok(GameModule::builder()
                .init(|_| Err(anyhow!("bad init")))
                .load(move || {
                    *flag.borrow_mut() = true;
                    futures::future::ready(Ok(()))
                })
                .build())
        });
        let loader = GameLoader::new(Some(Entrypoint::inline(entry)), 0);
        let err = pollster::block_on(loader.load(&capabilities(MemoryProvider::new())))
            .unwrap_err();
        assert!(matches!(err, BootError::InitFailure(_)));
        assert!(!*loaded.borrow());
    }

    #[test]
    fn load_failure_is_reported() {
        let entry = InlineEntrypoint::from_fn(|_| {
            Ok(GameModule::builder()
                .load(|| futures::future::ready(Err(anyhow!("no assets"))))
                .build())
        });
        let loader = GameLoader::new(Some(Entrypoint::inline(entry)), 0);
        let err = pollster::block_on(loader.load(&capabilities(MemoryProvider::new())))
            .unwrap_err();
        assert!(matches!(err, BootError::LoadFailure(_)));
    }

    #[test]
    fn script_entrypoint_is_fetched_and_instantiated() {
        let content = MemoryProvider::new().with_file(
            "game.lua",
            "function init() vm.autoClearBackbuffer = false end function tick() end",
        );
        let caps = capabilities(content);
        let loader = GameLoader::new(Some(Entrypoint::script("game.lua")), 100_000);
        let module = pollster::block_on(loader.load(&caps)).unwrap();
        assert_eq!(module.hook_names(), vec!["init", "tick"]);
        assert!(!caps.auto_clear_back_buffer());
    }

    #[test]
    fn fetch_and_instantiation_failures_are_distinguished() {
        let caps = capabilities(MemoryProvider::new().with_file("broken.lua", "function ("));

        let loader = GameLoader::new(Some(Entrypoint::script("absent.lua")), 0);
        let err = pollster::block_on(loader.load(&caps)).unwrap_err();
        assert!(matches!(err, BootError::FetchFailure { ref path, .. } if path == "absent.lua"));

        let loader = GameLoader::new(Some(Entrypoint::script("broken.lua")), 0);
        let err = pollster::block_on(loader.load(&caps)).unwrap_err();
        assert!(matches!(err, BootError::InstantiationFailure { .. }));
    }
}
