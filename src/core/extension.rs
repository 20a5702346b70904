//! Pluggable extension points and their resolution.
//!
//! Event sources and sinks are looked up by `(module path, symbol name)` in a
//! registry of modules linked into the binary. A module is opened by running
//! its initializer, which may read its own settings from the ambient
//! configuration; the symbol found in it must have exactly the shape the
//! caller asked for. Nothing is coerced: a sink where a source was expected is
//! a hard failure.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ConfigSource;
use crate::domain::{InvocationResult, SinkError};

use super::context::Context;
use super::invoker::Invoker;

/// Drives the pipeline: produces inputs and dispatches them through the invoker
/// until its event stream ends or fails
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn run(&self, ctx: Context, invoker: Arc<dyn Invoker>) -> anyhow::Result<()>;
}

/// Consumes successful results as a side effect
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn consume(&self, ctx: &Context, result: &InvocationResult) -> Result<(), SinkError>;
}

/// Function contract a symbol must satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    EventSource,
    EventSink,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::EventSource => write!(f, "event source"),
            Shape::EventSink => write!(f, "event sink"),
        }
    }
}

/// A resolved symbol
#[derive(Clone)]
pub enum Capability {
    Source(Arc<dyn EventSource>),
    Sink(Arc<dyn EventSink>),
}

impl Capability {
    pub fn shape(&self) -> Shape {
        match self {
            Capability::Source(_) => Shape::EventSource,
            Capability::Sink(_) => Shape::EventSink,
        }
    }

    pub fn into_source(self) -> Option<Arc<dyn EventSource>> {
        match self {
            Capability::Source(source) => Some(source),
            Capability::Sink(_) => None,
        }
    }

    pub fn into_sink(self) -> Option<Arc<dyn EventSink>> {
        match self {
            Capability::Sink(sink) => Some(sink),
            Capability::Source(_) => None,
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Capability").field(&self.shape()).finish()
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Module {path} could not be loaded: {reason}")]
    ModuleNotFound { path: String, reason: String },

    #[error("Symbol {symbol} could not be found in {path}")]
    SymbolNotFound { path: String, symbol: String },

    #[error("Symbol {symbol} in {path} is an {actual}, expected an {expected}")]
    ShapeMismatch {
        path: String,
        symbol: String,
        expected: Shape,
        actual: Shape,
    },
}

/// Named symbols exported by one module
#[derive(Default, Clone)]
pub struct ExtensionModule {
    symbols: BTreeMap<String, Capability>,
}

impl ExtensionModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, symbol: impl Into<String>, source: impl EventSource + 'static) -> Self {
        self.symbols
            .insert(symbol.into(), Capability::Source(Arc::new(source)));
        self
    }

    pub fn with_sink(mut self, symbol: impl Into<String>, sink: impl EventSink + 'static) -> Self {
        self.symbols.insert(symbol.into(), Capability::Sink(Arc::new(sink)));
        self
    }

    pub fn lookup(&self, symbol: &str) -> Option<Capability> {
        self.symbols.get(symbol).cloned()
    }

    /// Exported symbols with their shapes, sorted by name
    pub fn symbols(&self) -> impl Iterator<Item = (&str, Shape)> {
        self.symbols.iter().map(|(name, cap)| (name.as_str(), cap.shape()))
    }
}

/// Opens a module: reads its settings and builds its symbols
pub type ModuleInit =
    Arc<dyn Fn(&dyn ConfigSource) -> anyhow::Result<ExtensionModule> + Send + Sync>;

/// Resolves `(path, symbol)` to a capability
pub trait Loader: Send + Sync {
    fn resolve(
        &self,
        path: &str,
        symbol: &str,
        config: &dyn ConfigSource,
    ) -> Result<Capability, ResolveError>;
}

/// Module registry keyed by module path
#[derive(Default, Clone)]
pub struct ExtensionRegistry {
    modules: HashMap<String, ModuleInit>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under `path`, replacing any previous one
    pub fn register<F>(&mut self, path: impl Into<String>, init: F) -> &mut Self
    where
        F: Fn(&dyn ConfigSource) -> anyhow::Result<ExtensionModule> + Send + Sync + 'static,
    {
        self.modules.insert(path.into(), Arc::new(init));
        self
    }

    /// Register a module that needs no settings
    pub fn register_module(&mut self, path: impl Into<String>, module: ExtensionModule) -> &mut Self {
        self.register(path, move |_| Ok(module.clone()))
    }

    /// Registered module paths, sorted
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.modules.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// Run a module's initializer
    pub fn open(&self, path: &str, config: &dyn ConfigSource) -> Result<ExtensionModule, ResolveError> {
        let init = self
            .modules
            .get(path)
            .ok_or_else(|| ResolveError::ModuleNotFound {
                path: path.to_string(),
                reason: "no such module".to_string(),
            })?;

        init(config).map_err(|e| ResolveError::ModuleNotFound {
            path: path.to_string(),
            reason: format!("{:#}", e),
        })
    }
}

impl Loader for ExtensionRegistry {
    fn resolve(
        &self,
        path: &str,
        symbol: &str,
        config: &dyn ConfigSource,
    ) -> Result<Capability, ResolveError> {
        self.open(path, config)?
            .lookup(symbol)
            .ok_or_else(|| ResolveError::SymbolNotFound {
                path: path.to_string(),
                symbol: symbol.to_string(),
            })
    }
}

/// What to resolve and which shape it must have
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionReference {
    pub module_path: String,
    pub symbol_name: String,
    pub expected_shape: Shape,
}

impl ExtensionReference {
    pub fn source(module_path: impl Into<String>, symbol_name: impl Into<String>) -> Self {
        Self {
            module_path: module_path.into(),
            symbol_name: symbol_name.into(),
            expected_shape: Shape::EventSource,
        }
    }

    pub fn sink(module_path: impl Into<String>, symbol_name: impl Into<String>) -> Self {
        Self {
            module_path: module_path.into(),
            symbol_name: symbol_name.into(),
            expected_shape: Shape::EventSink,
        }
    }
}

impl fmt::Display for ExtensionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.module_path, self.symbol_name)
    }
}

/// Loads a reference and checks it against the expected shape
pub fn resolve(
    loader: &dyn Loader,
    reference: &ExtensionReference,
    config: &dyn ConfigSource,
) -> Result<Capability, ResolveError> {
    let capability = loader.resolve(&reference.module_path, &reference.symbol_name, config)?;
    let actual = capability.shape();
    if actual != reference.expected_shape {
        return Err(mismatch(reference, reference.expected_shape, actual));
    }
    Ok(capability)
}

pub fn resolve_source(
    loader: &dyn Loader,
    reference: &ExtensionReference,
    config: &dyn ConfigSource,
) -> Result<Arc<dyn EventSource>, ResolveError> {
    match resolve(loader, reference, config)? {
        Capability::Source(source) => Ok(source),
        other => Err(mismatch(reference, Shape::EventSource, other.shape())),
    }
}

pub fn resolve_sink(
    loader: &dyn Loader,
    reference: &ExtensionReference,
    config: &dyn ConfigSource,
) -> Result<Arc<dyn EventSink>, ResolveError> {
    match resolve(loader, reference, config)? {
        Capability::Sink(sink) => Ok(sink),
        other => Err(mismatch(reference, Shape::EventSink, other.shape())),
    }
}

fn mismatch(reference: &ExtensionReference, expected: Shape, actual: Shape) -> ResolveError {
    ResolveError::ShapeMismatch {
        path: reference.module_path.clone(),
        symbol: reference.symbol_name.clone(),
        expected,
        actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Idle;

    #[async_trait]
    impl EventSource for Idle {
        async fn run(&self, _ctx: Context, _invoker: Arc<dyn Invoker>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct Discard;

    #[async_trait]
    impl EventSink for Discard {
        async fn consume(&self, _ctx: &Context, _result: &InvocationResult) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn registry() -> ExtensionRegistry {
        let mut registry = ExtensionRegistry::new();
        registry.register_module(
            "./plugin.so",
            ExtensionModule::new()
                .with_source("Source", Idle)
                .with_sink("Sink", Discard),
        );
        registry.register("./broken.so", |_| anyhow::bail!("missing setting FOO"));
        registry
    }

    fn env() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_resolves_exact_shapes() {
        let registry = registry();
        let source = resolve(&registry, &ExtensionReference::source("./plugin.so", "Source"), &env()).unwrap();
        assert_eq!(source.shape(), Shape::EventSource);

        let sink = resolve_sink(&registry, &ExtensionReference::sink("./plugin.so", "Sink"), &env());
        assert!(sink.is_ok());
    }

    #[test]
    fn test_missing_module() {
        let err = resolve(&registry(), &ExtensionReference::source("./nope.so", "Source"), &env()).unwrap_err();
        assert!(matches!(err, ResolveError::ModuleNotFound { ref path, .. } if path == "./nope.so"));
    }

    #[test]
    fn test_failed_initializer_is_module_error() {
        let err = resolve(&registry(), &ExtensionReference::sink("./broken.so", "Sink"), &env()).unwrap_err();
        match err {
            ResolveError::ModuleNotFound { reason, .. } => assert!(reason.contains("missing setting FOO")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_symbol() {
        let err = resolve(&registry(), &ExtensionReference::source("./plugin.so", "source"), &env()).unwrap_err();
        assert!(matches!(err, ResolveError::SymbolNotFound { ref symbol, .. } if symbol == "source"));
    }

    #[test]
    fn test_shape_mismatch_is_hard_failure() {
        let err = resolve_source(&registry(), &ExtensionReference::source("./plugin.so", "Sink"), &env())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ResolveError::ShapeMismatch {
                expected: Shape::EventSource,
                actual: Shape::EventSink,
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "Symbol Sink in ./plugin.so is an event sink, expected an event source"
        );
    }

    #[test]
    fn test_initializer_runs_once_per_resolution() {
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = opened.clone();
        let mut registry = ExtensionRegistry::new();
        registry.register("./count.so", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ExtensionModule::new().with_sink("Sink", Discard))
        });

        resolve(&registry, &ExtensionReference::sink("./count.so", "Sink"), &env()).unwrap();
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_module_lists_symbols() {
        let module = ExtensionModule::new().with_sink("B", Discard).with_source("A", Idle);
        let symbols: Vec<_> = module.symbols().collect();
        assert_eq!(symbols, vec![("A", Shape::EventSource), ("B", Shape::EventSink)]);
    }
}
