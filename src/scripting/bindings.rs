use std::rc::Rc;

use glam::Vec2;
use mlua::{
    FromLua, Lua, LuaSerdeExt, MetaMethod, Result as LuaResult, Table, UserData,
    UserDataFields, UserDataMethods, Value, Variadic,
};

use crate::capabilities::{Capabilities, RendererHandle};
use crate::content::ContentProvider;
use crate::render::RenderTarget;
use crate::scene::{GraphicsModule, NodeRef, Texture};

const CONTENT_KEY: &str = "pixelbox.content";

/// Pure builtins copied from the interpreter's globals into a game's scope.
const BUILTINS: [&str; 17] = [
    "assert",
    "error",
    "ipairs",
    "pairs",
    "next",
    "pcall",
    "select",
    "tonumber",
    "tostring",
    "type",
    "setmetatable",
    "getmetatable",
    "rawequal",
    "math",
    "string",
    "table",
    "coroutine",
];

/// Builds the only scope a game chunk can see: `vm`, `stage`, `gfx`, the
/// whitelisted builtins and a logging `print`.
pub(super) fn build_environment<'lua>(
    lua: &'lua Lua,
    capabilities: &Capabilities,
) -> LuaResult<Table<'lua>> {
    lua.set_named_registry_value(CONTENT_KEY, content_table(lua, capabilities.content())?)?;

    let globals = lua.globals();
    let env = lua.create_table()?;
    for name in BUILTINS {
        env.set(name, globals.get::<_, Value>(name)?)?;
    }
    env.set("print", print_function(lua)?)?;
    env.set("vm", LuaCapabilities(capabilities.clone()))?;
    env.set("stage", LuaNode(capabilities.stage()))?;
    env.set("gfx", LuaGraphics(capabilities.graphics()))?;
    Ok(env)
}

fn print_function(lua: &Lua) -> LuaResult<mlua::Function<'_>> {
    lua.create_function(|lua, values: Variadic<Value>| {
        let mut out = Vec::new();
        for value in values.iter() {
            let text = match value {
                Value::Nil => "nil".to_string(),
                Value::Boolean(b) => b.to_string(),
                Value::String(s) => s.to_str()?.to_string(),
                _ => match lua.coerce_string(value.clone())? {
                    Some(s) => s.to_str()?.to_string(),
                    None => format!("{}: {:p}", value.type_name(), value.to_pointer()),
                },
            };
            out.push(text);
        }
        log::info!(target: "game", "{}", out.join("\t"));
        Ok(())
    })
}

fn content_table(lua: &Lua, content: Rc<dyn ContentProvider>) -> LuaResult<Table<'_>> {
    let table = lua.create_table()?;

    let fetch_content = Rc::clone(&content);
    let fetch = lua.create_async_function(move |lua, (_this, path): (Value, String)| {
        let content = Rc::clone(&fetch_content);
        async move {
            let fetched = content.fetch(&path).await.map_err(mlua::Error::external)?;
            lua.create_string(&fetched.bytes)
        }
    })?;
    table.set("fetch", fetch)?;

    let href = lua.create_function(move |_, (_this, path): (Value, String)| Ok(content.href(&path)))?;
    table.set("href", href)?;
    Ok(table)
}

/// The `vm` binding. Every field reads the host when accessed.
pub(super) struct LuaCapabilities(pub(super) Capabilities);

impl UserData for LuaCapabilities {
    fn add_fields<'lua, F: UserDataFields<'lua, Self>>(fields: &mut F) {
        fields.add_field_method_get("header", |lua, this| {
            lua.to_value(&this.0.header().to_json())
        });
        fields.add_field_method_get("graphics", |_, this| Ok(LuaGraphics(this.0.graphics())));
        fields.add_field_method_get("width", |_, this| Ok(this.0.width()));
        fields.add_field_method_get("height", |_, this| Ok(this.0.height()));
        fields.add_field_method_get("content", |lua, _| {
            lua.named_registry_value::<Table>(CONTENT_KEY)
        });
        fields.add_field_method_get("stage", |_, this| Ok(LuaNode(this.0.stage())));
        fields.add_field_method_get("renderer", |_, this| Ok(LuaRenderer(this.0.renderer())));
        fields.add_field_method_get("backBuffer", |_, this| {
            Ok(this.0.back_buffer().map(LuaTarget))
        });
        fields.add_field_method_get("autoClearBackbuffer", |_, this| {
            Ok(this.0.auto_clear_back_buffer())
        });

        fields.add_field_method_set("autoClearBackbuffer", |_, this, value: bool| {
            this.0.set_auto_clear_back_buffer(value);
            Ok(())
        });
    }

    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_method("asset", |_, this, name: String| {
            Ok(this.0.header().asset_path(&name).map(str::to_string))
        });
    }
}

struct LuaRenderer(RendererHandle);

impl UserData for LuaRenderer {
    fn add_fields<'lua, F: UserDataFields<'lua, Self>>(fields: &mut F) {
        fields.add_field_method_get("screenWidth", |_, this| {
            Ok(this.0.screen_size().map(|(width, _)| width))
        });
        fields.add_field_method_get("screenHeight", |_, this| {
            Ok(this.0.screen_size().map(|(_, height)| height))
        });
    }
}

#[derive(Debug, Clone, Copy)]
struct LuaTarget(RenderTarget);

impl UserData for LuaTarget {
    fn add_fields<'lua, F: UserDataFields<'lua, Self>>(fields: &mut F) {
        fields.add_field_method_get("id", |_, this| Ok(this.0.id()));
        fields.add_field_method_get("width", |_, this| Ok(this.0.width()));
        fields.add_field_method_get("height", |_, this| Ok(this.0.height()));
    }
}

impl<'lua> FromLua<'lua> for LuaTarget {
    fn from_lua(value: Value<'lua>, _: &'lua Lua) -> LuaResult<Self> {
        match value {
            Value::UserData(ud) => ud.borrow::<LuaTarget>().map(|target| *target),
            _ => Err(mlua::Error::FromLuaConversionError {
                from: value.type_name(),
                to: "RenderTarget",
                message: Some("expected render target userdata".into()),
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct LuaTexture(Texture);

impl UserData for LuaTexture {
    fn add_fields<'lua, F: UserDataFields<'lua, Self>>(fields: &mut F) {
        fields.add_field_method_get("width", |_, this| Ok(this.0.width));
        fields.add_field_method_get("height", |_, this| Ok(this.0.height));
    }
}

impl<'lua> FromLua<'lua> for LuaTexture {
    fn from_lua(value: Value<'lua>, _: &'lua Lua) -> LuaResult<Self> {
        match value {
            Value::UserData(ud) => {
                if let Ok(texture) = ud.borrow::<LuaTexture>() {
                    Ok(texture.clone())
                } else if let Ok(target) = ud.borrow::<LuaTarget>() {
                    Ok(Self(Texture::from_target(target.0)))
                } else {
                    Err(mlua::Error::FromLuaConversionError {
                        from: "userdata",
                        to: "Texture",
                        message: Some("unexpected userdata".into()),
                    })
                }
            }
            _ => Err(mlua::Error::FromLuaConversionError {
                from: value.type_name(),
                to: "Texture",
                message: Some("expected texture userdata".into()),
            }),
        }
    }
}

/// The `gfx` binding.
struct LuaGraphics(GraphicsModule);

impl UserData for LuaGraphics {
    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_method("container", |_, this, ()| Ok(LuaNode(this.0.container())));
        methods.add_method("sprite", |_, this, texture: LuaTexture| {
            Ok(LuaNode(this.0.sprite(texture.0)))
        });
        methods.add_method(
            "rect",
            |_, this, (width, height, color): (f32, f32, Option<u32>)| {
                Ok(LuaNode(this.0.rect(width, height, color.unwrap_or(0xffffff))))
            },
        );
        methods.add_method(
            "texture",
            |_, this, (width, height, color): (u32, u32, Option<u32>)| {
                Ok(LuaTexture(this.0.solid_texture(
                    width,
                    height,
                    color.unwrap_or(0xffffff),
                )))
            },
        );
        methods.add_method(
            "rgbaTexture",
            |_, this, (width, height, bytes): (u32, u32, mlua::String)| {
                this.0
                    .rgba_texture(width, height, bytes.as_bytes())
                    .map(LuaTexture)
                    .map_err(mlua::Error::external)
            },
        );
    }
}

#[derive(Clone)]
struct LuaNode(NodeRef);

impl UserData for LuaNode {
    fn add_fields<'lua, F: UserDataFields<'lua, Self>>(fields: &mut F) {
        fields.add_field_method_get("name", |_, this| Ok(this.0.borrow().name.clone()));
        fields.add_field_method_get("x", |_, this| Ok(this.0.borrow().position.x));
        fields.add_field_method_get("y", |_, this| Ok(this.0.borrow().position.y));
        fields.add_field_method_get("scaleX", |_, this| Ok(this.0.borrow().scale.x));
        fields.add_field_method_get("scaleY", |_, this| Ok(this.0.borrow().scale.y));
        fields.add_field_method_get("pivotX", |_, this| Ok(this.0.borrow().pivot.x));
        fields.add_field_method_get("pivotY", |_, this| Ok(this.0.borrow().pivot.y));
        fields.add_field_method_get("anchorX", |_, this| Ok(this.0.borrow().anchor.x));
        fields.add_field_method_get("anchorY", |_, this| Ok(this.0.borrow().anchor.y));
        fields.add_field_method_get("angle", |_, this| Ok(this.0.borrow().angle));
        fields.add_field_method_get("tint", |_, this| Ok(this.0.borrow().tint));
        fields.add_field_method_get("alpha", |_, this| Ok(this.0.borrow().alpha));
        fields.add_field_method_get("visible", |_, this| Ok(this.0.borrow().visible));
        fields.add_field_method_get("childCount", |_, this| Ok(this.0.child_count()));
        fields.add_field_method_get("width", |_, this| {
            Ok(this.0.bounds().map_or(0.0, |(min, max)| max.x - min.x))
        });
        fields.add_field_method_get("height", |_, this| {
            Ok(this.0.bounds().map_or(0.0, |(min, max)| max.y - min.y))
        });

        fields.add_field_method_set("name", |_, this, value: Option<String>| {
            this.0.borrow_mut().name = value;
            Ok(())
        });
        fields.add_field_method_set("x", |_, this, value: f32| {
            this.0.borrow_mut().position.x = value;
            Ok(())
        });
        fields.add_field_method_set("y", |_, this, value: f32| {
            this.0.borrow_mut().position.y = value;
            Ok(())
        });
        fields.add_field_method_set("scaleX", |_, this, value: f32| {
            this.0.borrow_mut().scale.x = value;
            Ok(())
        });
        fields.add_field_method_set("scaleY", |_, this, value: f32| {
            this.0.borrow_mut().scale.y = value;
            Ok(())
        });
        fields.add_field_method_set("pivotX", |_, this, value: f32| {
            this.0.borrow_mut().pivot.x = value;
            Ok(())
        });
        fields.add_field_method_set("pivotY", |_, this, value: f32| {
            this.0.borrow_mut().pivot.y = value;
            Ok(())
        });
        fields.add_field_method_set("anchorX", |_, this, value: f32| {
            this.0.borrow_mut().anchor.x = value;
            Ok(())
        });
        fields.add_field_method_set("anchorY", |_, this, value: f32| {
            this.0.borrow_mut().anchor.y = value;
            Ok(())
        });
        fields.add_field_method_set("angle", |_, this, value: f32| {
            this.0.borrow_mut().angle = value;
            Ok(())
        });
        fields.add_field_method_set("tint", |_, this, value: u32| {
            this.0.borrow_mut().tint = value;
            Ok(())
        });
        fields.add_field_method_set("alpha", |_, this, value: f32| {
            this.0.borrow_mut().alpha = value.clamp(0.0, 1.0);
            Ok(())
        });
        fields.add_field_method_set("visible", |_, this, value: bool| {
            this.0.borrow_mut().visible = value;
            Ok(())
        });
    }

    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_method("addChild", |_, this, child: LuaNode| {
            Ok(this.0.add_child(child.0))
        });
        methods.add_method("removeChild", |_, this, child: LuaNode| {
            Ok(this.0.remove_child(&child.0))
        });
        methods.add_method("removeChildren", |_, this, ()| {
            this.0.remove_children();
            Ok(())
        });
        methods.add_method("getChildAt", |_, this, index: usize| {
            Ok(index
                .checked_sub(1)
                .and_then(|index| this.0.child(index))
                .map(LuaNode))
        });
        methods.add_method("setSize", |_, this, (width, height): (f32, f32)| {
            this.0.borrow_mut().set_size(width, height);
            Ok(())
        });
        methods.add_method("setPosition", |_, this, (x, y): (f32, f32)| {
            this.0.borrow_mut().position = Vec2::new(x, y);
            Ok(())
        });
        methods.add_meta_method(MetaMethod::Eq, |_, this, other: LuaNode| {
            Ok(this.0.ptr_eq(&other.0))
        });
    }
}

impl<'lua> FromLua<'lua> for LuaNode {
    fn from_lua(value: Value<'lua>, _: &'lua Lua) -> LuaResult<Self> {
        match value {
            Value::UserData(ud) => ud.borrow::<LuaNode>().map(|node| node.clone()),
            _ => Err(mlua::Error::FromLuaConversionError {
                from: value.type_name(),
                to: "DisplayNode",
                message: Some("expected display node userdata".into()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::test_host;
    use crate::content::MemoryProvider;
    use crate::resolution::Resolution;
    use mlua::StdLib;

    fn sandbox() -> (Lua, Capabilities) {
        let lua = Lua::new_with(
            StdLib::MATH | StdLib::STRING | StdLib::TABLE | StdLib::COROUTINE,
            mlua::LuaOptions::new(),
        )
        .unwrap();
        let host = test_host(
            Resolution::new(32, 18),
            Rc::new(MemoryProvider::new().with_file("notes.txt", "hi")),
        );
        (lua, Capabilities::new(host))
    }

    #[test]
    fn environment_hides_unsafe_globals() {
        let (lua, caps) = sandbox();
        let env = build_environment(&lua, &caps).unwrap();
        let hidden: bool = lua
            .load("return os == nil and io == nil and require == nil and load == nil and _G == nil and debug == nil")
            .set_environment(env)
            .eval()
            .unwrap();
        assert!(hidden);
    }

    #[test]
    fn vm_reads_through_to_host() {
        let (lua, caps) = sandbox();
        let env = build_environment(&lua, &caps).unwrap();
        let (width, height, cleared): (u32, u32, bool) = lua
            .load(
                r#"
                vm.autoClearBackbuffer = false
                return vm.width, vm.height, vm.autoClearBackbuffer
            "#,
            )
            .set_environment(env)
            .eval()
            .unwrap();
        assert_eq!((width, height), (32, 18));
        assert!(!cleared);
        assert!(!caps.auto_clear_back_buffer());
        caps.set_auto_clear_back_buffer(true);
        let env = build_environment(&lua, &caps).unwrap();
        let cleared: bool = lua
            .load("return vm.autoClearBackbuffer")
            .set_environment(env)
            .eval()
            .unwrap();
        assert!(cleared);
    }

    #[test]
    fn nodes_built_in_lua_land_in_the_stage() {
        let (lua, caps) = sandbox();
        let env = build_environment(&lua, &caps).unwrap();
        let (count, same, width): (usize, bool, f32) = lua
            .load(
                r#"
                local box = gfx:rect(4, 2, 0x00ff00)
                box.x = 3
                box.angle = 90
                stage:addChild(box)
                stage:addChild(gfx:container())
                return stage.childCount, stage:getChildAt(1) == box, box.width
            "#,
            )
            .set_environment(env)
            .eval()
            .unwrap();
        assert_eq!(count, 2);
        assert!(same);
        assert!((width - 2.0).abs() < 1e-4);
        let first = caps.stage().child(0).unwrap();
        assert_eq!(first.borrow().position, Vec2::new(3.0, 0.0));
        assert_eq!(first.borrow().tint, 0x00ff00);
    }

    #[test]
    fn back_buffer_is_exposed_as_a_texture_source() {
        let (lua, caps) = sandbox();
        let env = build_environment(&lua, &caps).unwrap();
        let (width, height): (u32, u32) = lua
            .load(
                r#"
                local echo = gfx:sprite(vm.backBuffer)
                return echo.width, echo.height
            "#,
            )
            .set_environment(env)
            .eval()
            .unwrap();
        assert_eq!((width, height), (32, 18));
    }

    #[test]
    fn content_href_resolves_paths() {
        let (lua, caps) = sandbox();
        let env = build_environment(&lua, &caps).unwrap();
        let href: String = lua
            .load("return vm.content:href('notes.txt')")
            .set_environment(env)
            .eval()
            .unwrap();
        assert_eq!(href, "memory:notes.txt");
    }
}
