//! Script discovery and the per-frame driver

use crate::input::{FixedInputs, InputPolicy};
use crate::log::ScriptId;
use crate::script::{JsScript, ScriptEnv};
use edkit_core::level::{EditorHost, Level};
use edkit_services::{MainQueue, ScriptingConfig, SharedCache};
use once_cell::unsync::OnceCell;
use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

/// Raised on the main loop when a script has new log entries.
#[derive(Debug, Clone)]
pub struct ScriptLogged {
    pub script: Rc<JsScript>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    script: Option<ScriptId>,
    callback: Rc<dyn Fn(&ScriptLogged)>,
}

thread_local! {
    static GLOBAL: OnceCell<Rc<ScriptManager>> = const { OnceCell::new() };
}

/// Owns every discovered script.
pub struct ScriptManager {
    config: ScriptingConfig,
    env: ScriptEnv,
    scripts: RefCell<Vec<Rc<JsScript>>>,
    queue: MainQueue<ScriptId>,
    subscribers: RefCell<Vec<Subscription>>,
    next_subscription: Cell<u64>,
    requests: Arc<SharedCache<String, String>>,
}

impl ScriptManager {
    pub fn new(
        config: ScriptingConfig,
        host: Rc<dyn EditorHost>,
        inputs: Rc<dyn InputPolicy>,
    ) -> Self {
        let queue = MainQueue::new();
        let requests = Arc::new(SharedCache::new(config.cache_limit));
        let env = ScriptEnv::new(host, inputs)
            .with_limits(&config)
            .with_notify(queue.sender());
        Self {
            config,
            env,
            scripts: RefCell::new(Vec::new()),
            queue,
            subscribers: RefCell::new(Vec::new()),
            next_subscription: Cell::new(1),
            requests,
        }
    }

    /// Manager over an empty level answering `input()` with the configured
    /// defaults.
    pub fn with_defaults(config: ScriptingConfig) -> Self {
        let inputs = Rc::new(FixedInputs::new(config.input_defaults.clone()));
        Self::new(config, Rc::new(Level::new()), inputs)
    }

    /// The thread's shared manager, created with default settings on first
    /// access.
    pub fn global() -> Rc<Self> {
        GLOBAL.with(|cell| {
            Rc::clone(cell.get_or_init(|| {
                tracing::debug!("creating default script manager");
                Rc::new(Self::with_defaults(ScriptingConfig::default()))
            }))
        })
    }

    /// Install `manager` as the thread's shared manager. Has no effect if
    /// one already exists; the existing manager is returned either way.
    pub fn init_global(manager: Self) -> Rc<Self> {
        GLOBAL.with(|cell| {
            if cell.get().is_some() {
                tracing::warn!("script manager already initialized");
            }
            Rc::clone(cell.get_or_init(|| Rc::new(manager)))
        })
    }

    pub fn config(&self) -> &ScriptingConfig {
        &self.config
    }

    pub fn host(&self) -> &Rc<dyn EditorHost> {
        &self.env.host
    }

    /// Responses to host requests, keyed by request, holding at most
    /// `cache_limit` entries. Survives script reloads.
    pub fn request_cache(&self) -> &Arc<SharedCache<String, String>> {
        &self.requests
    }

    /// Forget every script and rediscover them from the script directories.
    pub fn reload_scripts(&self) {
        let mut loaded = Vec::new();
        for dir in self.config.script_dirs() {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::debug!(dir = %dir.display(), %err, "skipping script directory");
                    continue;
                }
            };

            let mut paths: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && self.config.is_script(path))
                .collect();
            paths.sort();

            tracing::debug!(dir = %dir.display(), count = paths.len(), "discovered scripts");
            loaded.extend(
                paths
                    .into_iter()
                    .map(|path| JsScript::load(path, self.env.clone())),
            );
        }
        tracing::info!(count = loaded.len(), "scripts loaded");

        let previous = std::mem::replace(&mut *self.scripts.borrow_mut(), loaded);
        drop(previous);
    }

    pub fn scripts(&self) -> Vec<Rc<JsScript>> {
        self.scripts.borrow().clone()
    }

    pub fn find(&self, id: ScriptId) -> Option<Rc<JsScript>> {
        self.scripts
            .borrow()
            .iter()
            .find(|script| script.id() == id)
            .cloned()
    }

    /// Tick every script once. Returns false if any of them failed this
    /// frame; all scripts are ticked regardless.
    pub fn tick_all(&self) -> bool {
        let mut success = true;
        for script in self.scripts() {
            success &= script.tick();
        }
        success
    }

    /// Deliver queued log notifications. Returns how many were delivered.
    pub fn dispatch_events(&self) -> usize {
        let mut delivered = 0;
        for id in self.queue.drain() {
            let Some(script) = self.find(id) else {
                tracing::trace!(?id, "dropping notification for unloaded script");
                continue;
            };
            script.log().clear_queued();

            let callbacks: Vec<_> = self
                .subscribers
                .borrow()
                .iter()
                .filter(|sub| sub.script.map_or(true, |target| target == id))
                .map(|sub| Rc::clone(&sub.callback))
                .collect();

            let event = ScriptLogged { script };
            for callback in callbacks {
                callback(&event);
            }
            delivered += 1;
        }
        delivered
    }

    /// Get notified whenever any script logs.
    pub fn subscribe(&self, callback: impl Fn(&ScriptLogged) + 'static) -> SubscriptionId {
        self.add_subscription(None, Rc::new(callback))
    }

    /// Get notified when `script` logs. The subscription goes quiet once
    /// the script is reloaded.
    pub fn subscribe_script(
        &self,
        script: &JsScript,
        callback: impl Fn(&ScriptLogged) + 'static,
    ) -> SubscriptionId {
        self.add_subscription(Some(script.id()), Rc::new(callback))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|sub| sub.id != id);
        subscribers.len() != before
    }

    fn add_subscription(
        &self,
        script: Option<ScriptId>,
        callback: Rc<dyn Fn(&ScriptLogged)>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.get());
        self.next_subscription.set(id.0 + 1);
        self.subscribers.borrow_mut().push(Subscription {
            id,
            script,
            callback,
        });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogLevel;
    use edkit_services::InputDefaults;
    use std::fs;
    use std::path::Path;

    struct Fixture {
        level: Rc<Level>,
        manager: ScriptManager,
        bundled: tempfile::TempDir,
        user: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let bundled = tempfile::tempdir().unwrap();
            let user = tempfile::tempdir().unwrap();
            let config = ScriptingConfig {
                bundled_dir: bundled.path().to_owned(),
                user_dir: user.path().to_owned(),
                input_defaults: InputDefaults {
                    int: 6,
                    number: 30.0,
                    string: "hello".into(),
                },
                ..ScriptingConfig::default()
            };
            let level = Rc::new(Level::new());
            let inputs = Rc::new(FixedInputs::new(config.input_defaults.clone()));
            let manager = ScriptManager::new(config, level.clone(), inputs);
            Self {
                level,
                manager,
                bundled,
                user,
            }
        }

        fn write(dir: &Path, name: &str, source: &str) {
            fs::write(dir.join(name), source).unwrap();
        }

        fn only_script(&self) -> Rc<JsScript> {
            let scripts = self.manager.scripts();
            assert_eq!(scripts.len(), 1);
            Rc::clone(&scripts[0])
        }

        fn run_to_end(&self) -> bool {
            let mut ok = true;
            for _ in 0..64 {
                ok &= self.manager.tick_all();
                if self.manager.scripts().iter().all(|s| s.is_finished()) {
                    break;
                }
            }
            ok
        }
    }

    fn file_names(manager: &ScriptManager) -> Vec<String> {
        manager
            .scripts()
            .iter()
            .map(|s| s.path().file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn request_cache_is_sized_from_config() {
        let config = ScriptingConfig {
            cache_limit: 2,
            ..ScriptingConfig::default()
        };
        let manager = ScriptManager::with_defaults(config);
        let cache = Arc::clone(manager.request_cache());
        assert_eq!(cache.limit(), 2);

        cache.add("a".into(), "1".into());
        cache.add("b".into(), "2".into());
        cache.add("c".into(), "3".into());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a".to_owned()), None);
        assert_eq!(cache.get(&"c".to_owned()).as_deref(), Some("3"));

        manager.reload_scripts();
        assert_eq!(manager.request_cache().len(), 2);
    }

    #[test]
    fn discovers_sorted_scripts_from_both_dirs() {
        let fx = Fixture::new();
        Fixture::write(fx.bundled.path(), "b.js", "");
        Fixture::write(fx.bundled.path(), "a.mjs", "");
        Fixture::write(fx.bundled.path(), "notes.txt", "");
        fs::create_dir(fx.bundled.path().join("nested.js")).unwrap();
        Fixture::write(fx.user.path(), "0-first.js", "");

        fx.manager.reload_scripts();
        assert_eq!(file_names(&fx.manager), vec!["a.mjs", "b.js", "0-first.js"]);
    }

    #[test]
    fn missing_directory_is_skipped() {
        let fx = Fixture::new();
        Fixture::write(fx.bundled.path(), "only.js", "");
        let user = fx.user.path().to_owned();
        fx.user.close().unwrap();
        assert!(!user.exists());

        fx.manager.reload_scripts();
        assert_eq!(file_names(&fx.manager), vec!["only.js"]);
    }

    #[test]
    fn header_is_applied_on_load() {
        let fx = Fixture::new();
        Fixture::write(
            fx.user.path(),
            "foo.js",
            "/// @name Foo\n/// @by Bar\n/// @version 1.2.3\nprint('hi');\n",
        );
        fx.manager.reload_scripts();

        let script = fx.only_script();
        assert!(script.can_run());
        assert_eq!(script.title(), "Foo");
        assert_eq!(script.author(), "Bar");
        assert_eq!(script.version().to_string(), "1.2.3");
    }

    #[test]
    fn discovery_raises_no_events() {
        let fx = Fixture::new();
        Fixture::write(fx.user.path(), "bad.js", "/// @version nope\n");
        Fixture::write(fx.user.path(), "good.js", "");

        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);
        fx.manager.subscribe(move |_| counter.set(counter.get() + 1));

        fx.manager.reload_scripts();
        assert_eq!(fx.manager.dispatch_events(), 0);
        assert_eq!(seen.get(), 0);
        assert!(!fx.manager.scripts()[0].can_run());
        assert!(fx.manager.scripts()[1].can_run());
    }

    #[test]
    fn log_notifications_are_coalesced() {
        let fx = Fixture::new();
        Fixture::write(fx.user.path(), "chatty.js", "print(1); print(2); print(3);");
        fx.manager.reload_scripts();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        fx.manager
            .subscribe(move |event| sink.borrow_mut().push(event.script.last_run_logs().len()));

        let script = fx.only_script();
        assert!(script.run());
        assert_eq!(fx.manager.dispatch_events(), 1);
        assert_eq!(*seen.borrow(), vec![3]);

        assert!(fx.run_to_end());
        assert_eq!(fx.manager.dispatch_events(), 1);
        assert_eq!(*seen.borrow(), vec![3, 4]);
        assert_eq!(fx.manager.dispatch_events(), 0);
    }

    #[test]
    fn script_subscriptions_only_see_their_script() {
        let fx = Fixture::new();
        Fixture::write(fx.user.path(), "a.js", "print('a');");
        Fixture::write(fx.user.path(), "b.js", "print('b');");
        fx.manager.reload_scripts();
        let scripts = fx.manager.scripts();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let sub = fx.manager.subscribe_script(&scripts[1], move |event| {
            sink.borrow_mut().push(event.script.title().to_owned())
        });

        scripts[0].run();
        scripts[1].run();
        assert_eq!(fx.manager.dispatch_events(), 2);
        assert_eq!(*seen.borrow(), vec!["b.js".to_owned()]);

        assert!(fx.manager.unsubscribe(sub));
        assert!(!fx.manager.unsubscribe(sub));
        scripts[1].run();
        fx.manager.dispatch_events();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn reload_drops_stale_notifications_and_logs() {
        let fx = Fixture::new();
        Fixture::write(fx.user.path(), "a.js", "print('a');");
        fx.manager.reload_scripts();
        let old = fx.only_script();
        assert!(old.run());

        fx.manager.reload_scripts();
        assert_eq!(fx.manager.dispatch_events(), 0);

        let fresh = fx.only_script();
        assert_ne!(fresh.id(), old.id());
        assert_eq!(fresh.last_run_logs().len(), 1);
        assert_eq!(fresh.last_run_logs()[0].message, "Ready to run script");
    }

    #[test]
    fn tick_all_reports_a_failing_script_once() {
        let fx = Fixture::new();
        Fixture::write(fx.user.path(), "fail.js", "throw new Error('nope');");
        Fixture::write(fx.user.path(), "ok.js", "print('fine');");
        fx.manager.reload_scripts();
        for script in fx.manager.scripts() {
            assert!(script.run());
        }

        assert!(!fx.manager.tick_all());
        assert!(fx.manager.tick_all());

        let scripts = fx.manager.scripts();
        assert!(scripts.iter().all(|s| s.is_finished()));
        assert_eq!(scripts[0].last_run_severity(), LogLevel::Error);
        assert_eq!(scripts[1].last_run_severity(), LogLevel::Info);
    }

    #[test]
    fn input_driven_script_places_objects() {
        let fx = Fixture::new();
        Fixture::write(
            fx.user.path(),
            "circle.mjs",
            r#"/// @name Circle
            const { count, radius } = await input({
                count: { type: "int", name: "Count" },
                radius: { type: "number", name: "Radius", description: "Distance from the center" },
            });
            const center = editor.getViewCenter();
            for (let i = 0; i < count; i++) {
                const obj = editor.createObject(1);
                editor.moveObjectsBy([obj], [center.x + radius, center.y]);
            }
            print(editor.getObjectCount());
            "#,
        );
        fx.manager.reload_scripts();
        let script = fx.only_script();
        assert!(script.run());
        assert!(fx.run_to_end());

        assert_eq!(fx.level.object_count(), 6);
        assert!(fx.level.snapshot().iter().all(|o| o.x == 30.0 && o.y == 0.0));
        let logs = script.last_run_logs();
        assert_eq!(logs[logs.len() - 2].message, "6");
    }

    #[test]
    fn reload_releases_script_held_objects() {
        let fx = Fixture::new();
        Fixture::write(
            fx.user.path(),
            "hold.js",
            "globalThis.held = editor.createObject(3); held.selected = true;",
        );
        fx.manager.reload_scripts();
        assert!(fx.only_script().run());
        assert!(fx.run_to_end());

        let object = fx.level.objects().remove(0);
        assert!(object.is_selected());
        let with_script = Rc::strong_count(&object);

        fx.manager.reload_scripts();
        assert_eq!(Rc::strong_count(&object), with_script - 1);
    }

    #[test]
    fn bundled_scripts_run_cleanly() {
        let user = tempfile::tempdir().unwrap();
        let config = ScriptingConfig {
            bundled_dir: Path::new(env!("CARGO_MANIFEST_DIR")).join("../../scripts"),
            user_dir: user.path().to_owned(),
            ..ScriptingConfig::default()
        };
        let level = Rc::new(Level::new());
        let inputs = Rc::new(FixedInputs::new(config.input_defaults.clone()));
        let manager = ScriptManager::new(config, level.clone(), inputs);
        manager.reload_scripts();

        let titles: Vec<_> = manager.scripts().iter().map(|s| s.title().to_owned()).collect();
        assert_eq!(titles, vec!["Create circle", "Deselect random"]);

        for script in manager.scripts() {
            assert!(script.run(), "{script:?}");
        }
        for _ in 0..16 {
            assert!(manager.tick_all());
        }
        assert!(manager.scripts().iter().all(|s| s.is_finished()));
        assert_eq!(level.object_count(), 8);
    }

    #[test]
    fn global_manager_is_shared_per_thread() {
        let first = ScriptManager::global();
        let second = ScriptManager::init_global(ScriptManager::with_defaults(
            ScriptingConfig::default(),
        ));
        assert!(Rc::ptr_eq(&first, &second));
        assert!(Rc::ptr_eq(&first, &ScriptManager::global()));
    }
}
