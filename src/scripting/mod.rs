//! Lua runtime for fetched game scripts.
//!
//! Each script gets its own interpreter with a whitelisted scope; nothing it
//! defines leaks into the host beyond the hooks collected after it runs.

mod bindings;
mod runtime;

pub use runtime::LuaGame;
