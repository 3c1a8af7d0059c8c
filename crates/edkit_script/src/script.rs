//! A discovered script and its most recent run

use crate::bindings::{self, Bindings};
use crate::error::ScriptError;
use crate::input::InputPolicy;
use crate::log::{LogEntry, LogLevel, ScriptId, ScriptLog};
use crate::metadata::{self, ScriptMetadata};
use edkit_core::level::EditorHost;
use edkit_qjs::{Context, Module, ModuleState, Runtime};
use edkit_services::{QueueSender, ScriptingConfig};
use semver::Version;
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// What a script run is connected to.
#[derive(Clone)]
pub struct ScriptEnv {
    pub host: Rc<dyn EditorHost>,
    pub inputs: Rc<dyn InputPolicy>,
    pub memory_limit: Option<usize>,
    pub max_stack_size: Option<usize>,
    /// Receives the script id when new log entries are waiting.
    pub notify: Option<QueueSender<ScriptId>>,
}

impl ScriptEnv {
    pub fn new(host: Rc<dyn EditorHost>, inputs: Rc<dyn InputPolicy>) -> Self {
        Self {
            host,
            inputs,
            memory_limit: None,
            max_stack_size: None,
            notify: None,
        }
    }

    pub fn with_limits(mut self, config: &ScriptingConfig) -> Self {
        self.memory_limit = config.memory_limit;
        self.max_stack_size = config.max_stack_size;
        self
    }

    pub fn with_notify(mut self, notify: QueueSender<ScriptId>) -> Self {
        self.notify = Some(notify);
        self
    }
}

// Field order is drop order: the module goes first, the runtime last.
struct ScriptRun {
    module: Module,
    _context: Context,
    _runtime: Runtime,
}

pub struct JsScript {
    id: ScriptId,
    path: PathBuf,
    source: String,
    metadata: ScriptMetadata,
    runnable: bool,
    finished: Cell<bool>,
    log: Rc<ScriptLog>,
    run: RefCell<Option<ScriptRun>>,
    env: ScriptEnv,
}

impl JsScript {
    /// Read and parse a script file. Problems are logged against the script
    /// and make it non-runnable; they never fail the load.
    pub fn load(path: impl Into<PathBuf>, env: ScriptEnv) -> Rc<Self> {
        let path = path.into();
        match std::fs::read_to_string(&path) {
            Ok(source) => Self::from_source(path, source, env),
            Err(source) => {
                let err = ScriptError::Read {
                    path: path.clone(),
                    source,
                };
                Self::build(path, String::new(), env, Some(err))
            }
        }
    }

    /// Build a script from source already in memory. `path` names it.
    pub fn from_source(path: impl Into<PathBuf>, source: String, env: ScriptEnv) -> Rc<Self> {
        Self::build(path.into(), source, env, None)
    }

    fn build(path: PathBuf, source: String, env: ScriptEnv, read_error: Option<ScriptError>) -> Rc<Self> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let id = ScriptId::next();
        let log = Rc::new(ScriptLog::new(id, &file_name, env.notify.clone()));

        let (metadata, runnable) = log.muted(|| {
            let mut runnable = true;
            if let Some(err) = read_error {
                log.push(LogLevel::Error, err.to_string());
                runnable = false;
            }

            let (metadata, errors) = metadata::parse(&source, &file_name);
            for err in errors {
                log.push(LogLevel::Error, ScriptError::from(err).to_string());
                runnable = false;
            }
            log.set_title(&metadata.title);

            if runnable {
                log.push(LogLevel::Status, "Ready to run script");
            }
            (metadata, runnable)
        });
        tracing::debug!(path = %path.display(), title = %metadata.title, runnable, "loaded script");

        Rc::new(Self {
            id,
            path,
            source,
            metadata,
            runnable,
            finished: Cell::new(false),
            log,
            run: RefCell::new(None),
            env,
        })
    }

    pub fn id(&self) -> ScriptId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    pub fn author(&self) -> &str {
        &self.metadata.author
    }

    pub fn version(&self) -> &Version {
        &self.metadata.version
    }

    pub fn can_run(&self) -> bool {
        self.runnable
    }

    pub fn is_finished(&self) -> bool {
        self.finished.get()
    }

    /// Started and not finished yet.
    pub fn is_running(&self) -> bool {
        self.run.borrow().is_some() && !self.finished.get()
    }

    pub fn log(&self) -> &Rc<ScriptLog> {
        &self.log
    }

    pub fn last_run_logs(&self) -> Vec<LogEntry> {
        self.log.entries()
    }

    pub fn last_run_severity(&self) -> LogLevel {
        self.log.severity()
    }

    /// Start a fresh run, tearing down the previous one first. Returns
    /// whether the script started executing.
    pub fn run(&self) -> bool {
        if !self.runnable {
            return false;
        }

        self.log.clear();
        self.finished.set(false);
        let previous = self.run.borrow_mut().take();
        drop(previous);

        match self.start() {
            Ok(run) => {
                tracing::info!(script = %self.title(), "script started");
                *self.run.borrow_mut() = Some(run);
                true
            }
            Err(err) => {
                self.finished.set(true);
                self.log.push(LogLevel::Error, err.to_string());
                false
            }
        }
    }

    fn start(&self) -> Result<ScriptRun, ScriptError> {
        let runtime = Runtime::create().map_err(ScriptError::Runtime)?;
        if let Some(bytes) = self.env.memory_limit {
            runtime.set_memory_limit(bytes);
        }
        if let Some(bytes) = self.env.max_stack_size {
            runtime.set_max_stack_size(bytes);
        }

        let class = bindings::register_classes(&runtime).map_err(ScriptError::Bindings)?;
        let context = Context::create(&runtime).map_err(ScriptError::Runtime)?;
        let bindings = Bindings {
            host: Rc::clone(&self.env.host),
            inputs: Rc::clone(&self.env.inputs),
            log: Rc::clone(&self.log),
        };
        context
            .with(|ctx| bindings::install(ctx, class, &bindings))
            .map_err(ScriptError::Bindings)?;

        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.title().to_owned());
        let module = context.eval(&self.source, &file_name);
        if let ModuleState::Rejected(reason) = module.state() {
            return Err(ScriptError::Compile(reason.clone()));
        }

        Ok(ScriptRun {
            module,
            _context: context,
            _runtime: runtime,
        })
    }

    /// Advance the current run by one step.
    ///
    /// Returns `false` exactly once, on the tick where the run fails.
    /// Finished scripts and scripts that were never started report `true`.
    pub fn tick(&self) -> bool {
        if self.finished.get() {
            return true;
        }
        let state = {
            let mut run = self.run.borrow_mut();
            let Some(run) = run.as_mut() else {
                return true;
            };
            run.module.tick().clone()
        };

        match state {
            ModuleState::Pending => true,
            ModuleState::Fulfilled(value) => {
                self.finished.set(true);
                tracing::info!(script = %self.title(), "script finished");
                self.log.push(
                    LogLevel::Status,
                    format!("Finished running script with value {value}"),
                );
                true
            }
            ModuleState::Rejected(reason) => {
                self.finished.set(true);
                self.log.push(LogLevel::Error, reason);
                false
            }
        }
    }
}

impl std::fmt::Debug for JsScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsScript")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("title", &self.metadata.title)
            .field("runnable", &self.runnable)
            .field("finished", &self.finished.get())
            .finish_non_exhaustive()
    }
}
