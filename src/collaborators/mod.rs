//! External collaborator interfaces (spec §6.2).
//!
//! The core never defines a function library, ADDRESS transport, or
//! library loader itself — it only calls through these traits, the same
//! way the teacher's evaluator only ever touches the filesystem through
//! `fs::FileSystem` rather than baking in a concrete implementation.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::value::Value;

/// A resolved parameter map passed to collaborator calls: named params
/// merged with positional ones already converted by the dispatcher.
pub type Params = HashMap<String, Value>;

/// How a name resolved inside the function registry (spec §9, "Dynamic
/// dispatch by name").
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Builtin,
    Operation,
    External,
    NotFound,
}

/// The built-in/external function and operation catalogue. Out of scope
/// for the core per spec §1 — the core only calls through this trait.
#[async_trait]
pub trait FunctionRegistry: Send + Sync {
    async fn call(&self, name_upper: &str, params: Params) -> Result<Value, String>;
    fn is_operation(&self, name_upper: &str) -> bool;
    fn is_builtin(&self, name_upper: &str) -> bool;
    /// Maps named parameters to positional arguments for functions that
    /// only expose a legacy positional signature. Returns `None` when no
    /// converter is registered for `name_upper`.
    fn get_converter(&self, name_upper: &str) -> Option<Vec<String>>;
    fn resolve(&self, name_upper: &str) -> Resolution {
        if self.is_builtin(name_upper) {
            Resolution::Builtin
        } else if self.is_operation(name_upper) {
            Resolution::Operation
        } else {
            Resolution::NotFound
        }
    }
}

/// `ADDRESS` transport: local command handlers or remote RPC senders.
#[async_trait]
pub trait AddressSender: Send + Sync {
    async fn send(&self, namespace: &str, method: &str, params: Params) -> Result<Value, String>;
}

/// Registrations returned by a successful `REQUIRE`.
#[derive(Debug, Clone, Default)]
pub struct Registrations {
    pub functions: Vec<String>,
    pub operations: Vec<String>,
    pub address_targets: Vec<AddressTargetRegistration>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct AddressTargetRegistration {
    pub name: String,
    pub handler: String,
    pub metadata: HashMap<String, String>,
}

/// `REQUIRE` library loading: registry lookup, dependency resolution,
/// permission checks — all outside the core.
#[async_trait]
pub trait LibraryLoader: Send + Sync {
    async fn require(&self, name: &str, as_clause: Option<&str>) -> Result<Registrations, String>;
}

/// Output sink for `SAY`, trace lines, and `EXIT UNLESS` messages.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn output(&self, text: &str);
}

/// Parsed command list plus its original source lines, for `CALL "path"`.
pub struct LoadedScript {
    pub commands: Vec<crate::ast::types::Command>,
    pub source_lines: Vec<String>,
}

/// External-script loading for `CALL "path"`.
#[async_trait]
pub trait ScriptLoader: Send + Sync {
    async fn load_script(&self, path: &str) -> Result<LoadedScript, String>;
}

// ============================================================================
// Test-fixture implementations
// ============================================================================

/// A registry with no functions registered; every call is `NotFound`.
pub struct NoopFunctionRegistry;

#[async_trait]
impl FunctionRegistry for NoopFunctionRegistry {
    async fn call(&self, name_upper: &str, _params: Params) -> Result<Value, String> {
        Err(format!("no such function: {}", name_upper))
    }
    fn is_operation(&self, _name_upper: &str) -> bool {
        false
    }
    fn is_builtin(&self, _name_upper: &str) -> bool {
        false
    }
    fn get_converter(&self, _name_upper: &str) -> Option<Vec<String>> {
        None
    }
}

/// Discards all output.
pub struct NullOutputSink;

#[async_trait]
impl OutputSink for NullOutputSink {
    async fn output(&self, _text: &str) {}
}

/// Accumulates every write, for assertions in tests.
#[derive(Default)]
pub struct CollectingOutputSink {
    pub lines: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl OutputSink for CollectingOutputSink {
    async fn output(&self, text: &str) {
        self.lines.lock().unwrap().push(text.to_string());
    }
}

/// Always fails, as if no ADDRESS transport were configured.
pub struct NoopAddressSender;

#[async_trait]
impl AddressSender for NoopAddressSender {
    async fn send(&self, namespace: &str, method: &str, _params: Params) -> Result<Value, String> {
        Err(format!("no address sender configured for {}.{}", namespace, method))
    }
}

/// Always fails, as if no library loader were configured.
pub struct NoopLibraryLoader;

#[async_trait]
impl LibraryLoader for NoopLibraryLoader {
    async fn require(&self, name: &str, _as_clause: Option<&str>) -> Result<Registrations, String> {
        Err(format!("no library loader configured, cannot REQUIRE {}", name))
    }
}

/// A small in-memory function registry for tests, mapping uppercased
/// names to a synchronous closure.
pub struct TestFunctionRegistry {
    pub functions: HashMap<String, Box<dyn Fn(Params) -> Result<Value, String> + Send + Sync>>,
}

impl Default for TestFunctionRegistry {
    fn default() -> Self {
        Self { functions: HashMap::new() }
    }
}

impl TestFunctionRegistry {
    pub fn register(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(Params) -> Result<Value, String> + Send + Sync + 'static,
    ) {
        self.functions.insert(name.into().to_ascii_uppercase(), Box::new(f));
    }
}

#[async_trait]
impl FunctionRegistry for TestFunctionRegistry {
    async fn call(&self, name_upper: &str, params: Params) -> Result<Value, String> {
        match self.functions.get(name_upper) {
            Some(f) => f(params),
            None => Err(format!("no such function: {}", name_upper)),
        }
    }
    fn is_operation(&self, _name_upper: &str) -> bool {
        false
    }
    fn is_builtin(&self, name_upper: &str) -> bool {
        self.functions.contains_key(name_upper)
    }
    fn get_converter(&self, _name_upper: &str) -> Option<Vec<String>> {
        None
    }
}
