//! Concrete collaborators for the bridge.
//!
//! - `command` / `pool`: the subprocess-backed invoker pool
//! - `sources` / `sinks`: built-in extension modules, registered under
//!   `builtin/...` module paths by `builtin_registry`

pub mod command;
pub mod pool;
pub mod sinks;
pub mod sources;

use crate::core::{ExtensionModule, ExtensionRegistry, Shape};

pub use command::{CommandError, CommandTemplate};
pub use pool::{CommandPoolFactory, InvokerPool, PoolError};

/// A built-in extension, for listings
#[derive(Debug, Clone, Copy)]
pub struct BuiltinExtension {
    pub module_path: &'static str,
    pub symbol: &'static str,
    pub shape: Shape,
    /// Settings read when the module is opened
    pub settings: &'static [&'static str],
    pub summary: &'static str,
}

pub const BUILTIN_EXTENSIONS: &[BuiltinExtension] = &[
    BuiltinExtension {
        module_path: sources::directory::MODULE_PATH,
        symbol: sources::directory::SYMBOL,
        shape: Shape::EventSource,
        settings: &[
            sources::directory::SOURCE_DIR,
            sources::directory::SOURCE_DIR_PATTERN,
            sources::directory::SOURCE_DIR_WATCH,
            sources::directory::SOURCE_DIR_STABILITY_MILLIS,
        ],
        summary: "one invocation per matching file, optionally watching for new ones",
    },
    BuiltinExtension {
        module_path: sinks::jsonl::MODULE_PATH,
        symbol: sinks::jsonl::SYMBOL,
        shape: Shape::EventSink,
        settings: &[sinks::jsonl::SINK_JSONL_PATH],
        summary: "appends one JSON record per result",
    },
    BuiltinExtension {
        module_path: sources::lines::MODULE_PATH,
        symbol: sources::lines::SYMBOL,
        shape: Shape::EventSource,
        settings: &[],
        summary: "one invocation per non-empty stdin line",
    },
    BuiltinExtension {
        module_path: sinks::writer::MODULE_PATH,
        symbol: sinks::writer::SYMBOL,
        shape: Shape::EventSink,
        settings: &[],
        summary: "writes each result to stdout",
    },
    BuiltinExtension {
        module_path: sinks::webhook::MODULE_PATH,
        symbol: sinks::webhook::SYMBOL,
        shape: Shape::EventSink,
        settings: &[
            sinks::webhook::SINK_WEBHOOK_URL,
            sinks::webhook::SINK_WEBHOOK_TIMEOUT_MILLIS,
        ],
        summary: "POSTs each result to a URL",
    },
];

/// Registry holding every built-in module
pub fn builtin_registry() -> ExtensionRegistry {
    let mut registry = ExtensionRegistry::new();

    registry
        .register_module(
            sources::lines::MODULE_PATH,
            ExtensionModule::new().with_source(sources::lines::SYMBOL, sources::LineSource),
        )
        .register(sources::directory::MODULE_PATH, |config| {
            let settings = sources::DirectoryConfig::from_source(config)?;
            Ok(ExtensionModule::new()
                .with_source(sources::directory::SYMBOL, sources::DirectorySource::new(settings)))
        })
        .register(sinks::writer::MODULE_PATH, |_| {
            Ok(ExtensionModule::new().with_sink(sinks::writer::SYMBOL, sinks::StdoutSink::stdout()))
        })
        .register(sinks::jsonl::MODULE_PATH, |config| {
            Ok(ExtensionModule::new()
                .with_sink(sinks::jsonl::SYMBOL, sinks::JsonlSink::from_source(config)?))
        })
        .register(sinks::webhook::MODULE_PATH, |config| {
            Ok(ExtensionModule::new()
                .with_sink(sinks::webhook::SYMBOL, sinks::WebhookSink::from_source(config)?))
        });

    registry
}
