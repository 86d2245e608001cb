// Copyright 2025 Archon (https://github.com/archon-engine)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! WASM sandbox executor.
//!
//! Plugins are component-model WASM binaries. No WASI interfaces are
//! linked — a component that imports the filesystem, sockets, clocks,
//! or environment simply fails to instantiate, which is the sandbox
//! guarantee: the only import the host satisfies is `host-call`, a
//! string-in/string-out channel into the capability-checked
//! [`PluginHost`](crate::host::PluginHost).
//!
//! Resource enforcement: fuel metering bounds CPU, a store limiter
//! bounds linear memory, and an epoch tick bounds wall-clock time. Each
//! execution gets its own engine so one call's deadline can never trip
//! another's.

use crate::error::{PluginError, PluginResult};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use wasmtime::component::{Component, Linker};
use wasmtime::{Config, Engine, Store, StoreContextMut, StoreLimits, StoreLimitsBuilder, Trap};

/// Per-execution resource ceilings.
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    /// CPU budget in wasmtime fuel units.
    pub fuel: u64,
    /// Linear memory ceiling in bytes.
    pub memory_bytes: usize,
    /// Wall-clock ceiling.
    pub timeout: Duration,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            fuel: 100_000_000,
            memory_bytes: 64 * 1024 * 1024,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Bridge from guest `host-call(name, payload)` invocations to the host.
pub type HostCallFn = Arc<dyn Fn(&str, &str) -> Result<String, String> + Send + Sync>;

struct SandboxState {
    limits: StoreLimits,
    host_call: HostCallFn,
}

/// Loads and runs plugin components under the sandbox contract.
pub struct WasmExecutor;

impl WasmExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Instantiate `component_path` and call its exported
    /// `export: func(input: string) -> string`.
    pub async fn execute(
        &self,
        component_path: &Path,
        export: &str,
        input: &str,
        limits: &SandboxLimits,
        host_call: HostCallFn,
    ) -> PluginResult<String> {
        let mut config = Config::new();
        config.async_support(true);
        config.consume_fuel(true);
        config.epoch_interruption(true);
        config.wasm_component_model(true);
        let engine =
            Engine::new(&config).map_err(|e| PluginError::Execution(e.to_string()))?;

        let component = Component::from_file(&engine, component_path)
            .map_err(|e| PluginError::Execution(format!("loading component: {e}")))?;

        let mut linker: Linker<SandboxState> = Linker::new(&engine);
        linker
            .root()
            .func_wrap(
                "host-call",
                |store: StoreContextMut<'_, SandboxState>, (name, payload): (String, String)| {
                    let outcome = (store.data().host_call)(&name, &payload);
                    let response = outcome.unwrap_or_else(|error| {
                        serde_json::json!({ "error": error }).to_string()
                    });
                    Ok((response,))
                },
            )
            .map_err(|e| PluginError::Execution(e.to_string()))?;

        let mut store = Store::new(
            &engine,
            SandboxState {
                limits: StoreLimitsBuilder::new()
                    .memory_size(limits.memory_bytes)
                    .build(),
                host_call,
            },
        );
        store.limiter(|state| &mut state.limits);
        store
            .set_fuel(limits.fuel)
            .map_err(|e| PluginError::Execution(e.to_string()))?;
        store.set_epoch_deadline(1);

        // One tick after the timeout; the engine is private to this call.
        let ticker_engine = engine.clone();
        let timeout = limits.timeout;
        std::thread::spawn(move || {
            std::thread::sleep(timeout);
            ticker_engine.increment_epoch();
        });

        let instance = linker
            .instantiate_async(&mut store, &component)
            .await
            .map_err(|e| PluginError::Execution(format!("instantiation refused: {e}")))?;
        let func = instance
            .get_typed_func::<(String,), (String,)>(&mut store, export)
            .map_err(|e| PluginError::Execution(format!("missing export {export:?}: {e}")))?;

        let call = func.call_async(&mut store, (input.to_string(),)).await;
        let (output,) = match call {
            Ok(output) => output,
            Err(e) => return Err(map_trap(e)),
        };
        let _ = func.post_return_async(&mut store).await;

        debug!(export, "plugin call completed");
        Ok(output)
    }
}

impl Default for WasmExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn map_trap(error: wasmtime::Error) -> PluginError {
    match error.downcast_ref::<Trap>() {
        Some(Trap::OutOfFuel) => {
            PluginError::ResourceExceeded("fuel budget exhausted".to_string())
        }
        Some(Trap::Interrupt) => PluginError::Timeout,
        _ => PluginError::Execution(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_component_is_an_execution_error() {
        let executor = WasmExecutor::new();
        let result = executor
            .execute(
                Path::new("/nonexistent/plugin.wasm"),
                "run",
                "{}",
                &SandboxLimits::default(),
                Arc::new(|_, _| Ok(String::new())),
            )
            .await;
        assert!(matches!(result, Err(PluginError::Execution(_))));
    }

    #[tokio::test]
    async fn test_garbage_bytes_are_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.wasm");
        std::fs::write(&path, b"definitely not wasm").unwrap();

        let executor = WasmExecutor::new();
        let result = executor
            .execute(
                &path,
                "run",
                "{}",
                &SandboxLimits::default(),
                Arc::new(|_, _| Ok(String::new())),
            )
            .await;
        assert!(matches!(result, Err(PluginError::Execution(_))));
    }
}
