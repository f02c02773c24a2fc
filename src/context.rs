//! Per-execution-unit attribution state.
//!
//! Each execution unit (the main thread, a worker thread, ...) builds its own
//! [`ExecutionContext`] once and hands it to its [`Console`](crate::console::Console).
//! Nothing here is process-global, so two units can never swap module names.

use crate::record::UNKNOWN_MODULE;
use std::fmt;

/// Kind of execution unit a record originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionKind {
    Window,
    Worker,
    ServiceWorker,
}

impl ExecutionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionKind::Window => "window",
            ExecutionKind::Worker => "worker",
            ExecutionKind::ServiceWorker => "service-worker",
        }
    }

    /// Window-like contexts own the page: they flush on teardown and take
    /// over default handling of uncaught errors.
    pub fn is_window_like(&self) -> bool {
        matches!(self, ExecutionKind::Window)
    }

    /// Feature probing, in the order a runtime would test for globals.
    pub fn detect(probe: &dyn RuntimeProbe) -> Self {
        if probe.is_service_worker() {
            ExecutionKind::ServiceWorker
        } else if probe.is_dedicated_worker() {
            ExecutionKind::Worker
        } else {
            ExecutionKind::Window
        }
    }
}

impl fmt::Display for ExecutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability tests used to classify the current execution unit.
pub trait RuntimeProbe {
    fn is_service_worker(&self) -> bool;
    fn is_dedicated_worker(&self) -> bool;
}

/// Probe for native processes: the thread named `main` owns the "page",
/// every other thread is a worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeProbe;

impl RuntimeProbe for NativeProbe {
    fn is_service_worker(&self) -> bool {
        false
    }

    fn is_dedicated_worker(&self) -> bool {
        std::thread::current().name() != Some("main")
    }
}

/// Probe with fixed answers, for embedding in hosts that already know.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub ExecutionKind);

impl RuntimeProbe for FixedProbe {
    fn is_service_worker(&self) -> bool {
        self.0 == ExecutionKind::ServiceWorker
    }

    fn is_dedicated_worker(&self) -> bool {
        self.0 == ExecutionKind::Worker
    }
}

/// Attribution attached to every record produced by one execution unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub module: String,
    pub kind: ExecutionKind,
    pub url: Option<String>,
    pub user_agent: Option<String>,
}

impl ExecutionContext {
    pub fn new(module: impl Into<String>, kind: ExecutionKind) -> Self {
        let module = module.into();
        ExecutionContext {
            module: if module.is_empty() {
                UNKNOWN_MODULE.to_string()
            } else {
                module
            },
            kind,
            url: None,
            user_agent: Some(native_user_agent()),
        }
    }

    /// Module name suffixed with the execution kind, used by the error and
    /// rejection handlers.
    pub fn handler_module(&self) -> String {
        self.handler_module_for(self.kind)
    }

    /// Same as [`handler_module`](Self::handler_module) for a unit of
    /// another kind, e.g. a thread that panicked outside this one.
    pub fn handler_module_for(&self, kind: ExecutionKind) -> String {
        format!("{}:{}", self.module, kind)
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        ExecutionContext::new(UNKNOWN_MODULE, ExecutionKind::detect(&NativeProbe))
    }
}

/// Best-effort descriptor of the native runtime.
pub fn native_user_agent() -> String {
    format!(
        "{}/{} ({}; {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
