//! Integration tests for reloading through the reload queue.

use layerconf::config::{
    ConfigService, Overrides, ReloadTrigger, Resolver, ResolverSettings, WatcherConfig,
    reload_queue, start_config_watcher,
};
use layerconf::error::ErrorKind;
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn service_for(dir: &Path, overrides: Overrides) -> Arc<ConfigService> {
    ConfigService::new(Resolver::new(ResolverSettings::with_dir(dir), overrides)).unwrap()
}

#[tokio::test]
async fn test_each_reload_notifies_once() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("default.toml");
    std::fs::write(&file, "[server]\nport = 1\n").unwrap();
    let service = service_for(temp.path(), Overrides::new());

    let ports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&ports);
    service.on_reload(move |snapshot| {
        sink.lock()
            .unwrap()
            .push(snapshot.get("server.port").cloned());
    });

    let (queue, mut worker) = reload_queue();
    for port in [2, 3] {
        std::fs::write(&file, format!("[server]\nport = {port}\n")).unwrap();
        queue.request(ReloadTrigger::Manual);
        assert_eq!(worker.run_pending(&service).unwrap(), 1);
    }

    assert_eq!(*ports.lock().unwrap(), vec![Some(json!(2)), Some(json!(3))]);
    assert_eq!(service.snapshot().generation, 2);
}

#[tokio::test]
async fn test_overrides_survive_reload() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("default.toml");
    std::fs::write(&file, "[server]\nport = 1\ndebug = false\n").unwrap();
    let service = service_for(
        temp.path(),
        Overrides::from_args(["--server.debug"]),
    );
    assert_eq!(service.get("server.debug"), Some(json!(true)));

    std::fs::write(&file, "[server]\nport = 5\ndebug = false\n").unwrap();
    let (queue, worker) = reload_queue();
    queue.request(ReloadTrigger::Signal);
    drop(queue);
    worker.run(Arc::clone(&service)).await.unwrap();

    assert_eq!(*service.tree(), json!({"server": {"port": 5, "debug": true}}));
}

#[tokio::test]
async fn test_failed_reload_ends_worker_without_publishing() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("default.toml");
    std::fs::write(&file, "a = 1\n").unwrap();
    let service = service_for(temp.path(), Overrides::new());

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    service.on_reload(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    std::fs::remove_file(&file).unwrap();
    std::fs::create_dir(&file).unwrap();

    let (queue, worker) = reload_queue();
    queue.request(ReloadTrigger::Manual);
    let err = worker.run(Arc::clone(&service)).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::WrongFileType);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(service.snapshot().generation, 0);
    drop(queue);
}

#[tokio::test]
async fn test_services_are_independent() {
    let first_dir = TempDir::new().unwrap();
    let second_dir = TempDir::new().unwrap();
    std::fs::write(first_dir.path().join("default.toml"), "name = \"first\"\n").unwrap();
    std::fs::write(second_dir.path().join("default.json"), r#"{"name": "second"}"#).unwrap();

    let first = service_for(first_dir.path(), Overrides::new());
    let second = service_for(second_dir.path(), Overrides::new());
    first.reload().unwrap();

    assert_eq!(first.get("name"), Some(json!("first")));
    assert_eq!(second.get("name"), Some(json!("second")));
    assert_eq!(first.snapshot().generation, 1);
    assert_eq!(second.snapshot().generation, 0);
}

#[tokio::test]
async fn test_file_change_enqueues_reload() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("default.toml");
    std::fs::write(&file, "a = 1\n").unwrap();
    let service = service_for(temp.path(), Overrides::new());

    let (queue, mut worker) = reload_queue();
    let config = WatcherConfig {
        debounce_duration: Duration::from_millis(50),
    };
    let _watcher = start_config_watcher(temp.path(), config, queue.clone()).unwrap();

    std::fs::write(&file, "a = 2\n").unwrap();

    let mut reloads = 0;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        reloads = worker.run_pending(&service).unwrap();
        if reloads > 0 {
            break;
        }
    }
    assert_eq!(reloads, 1);
    assert_eq!(service.get("a"), Some(json!(2)));
}
