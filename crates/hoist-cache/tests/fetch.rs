//! End-to-end cache behavior against a local stub HTTP server.

mod support;

use std::time::{Duration, SystemTime};

use hoist_cache::credentials::Credential;
use hoist_cache::{Cache, CacheConfig, CachePolicy};
use hoist_util::hash;
use support::{Route, StubServer};

fn config(root: &std::path::Path) -> CacheConfig {
    CacheConfig {
        root: root.to_path_buf(),
        ..Default::default()
    }
}

const JAR: &str = "/maven2/org/example/lib/1.0/lib-1.0.jar";
const JAR_SHA1: &str = "/maven2/org/example/lib/1.0/lib-1.0.jar.sha1";

#[tokio::test]
async fn download_then_cache_hit_without_network() {
    let server = StubServer::start().await;
    server.route(JAR, Route::ok("jar bytes"));
    server.route(JAR_SHA1, Route::ok(hash::sha1_bytes(b"jar bytes")));

    let tmp = tempfile::tempdir().unwrap();
    let cache = Cache::new(config(tmp.path())).unwrap();
    let url = server.url(JAR);

    let first = cache.fetch(&url).await.unwrap();
    assert_eq!(std::fs::read(&first).unwrap(), b"jar bytes");

    let second = cache.fetch(&url).await.unwrap();
    assert_eq!(first, second);
    // The second fetch is answered from disk.
    assert_eq!(server.hits(JAR), 1);
    assert_eq!(server.hits(JAR_SHA1), 1);
}

#[tokio::test]
async fn file_and_checksum_sidecar_both_visible() {
    let server = StubServer::start().await;
    server.route(JAR, Route::ok("jar bytes"));
    server.route(JAR_SHA1, Route::ok(hash::sha1_bytes(b"jar bytes")));

    let tmp = tempfile::tempdir().unwrap();
    let cache = Cache::new(config(tmp.path())).unwrap();
    let path = cache.fetch(&server.url(JAR)).await.unwrap();

    assert!(path.is_file());
    let sidecar = path.with_file_name("lib-1.0.jar.sha1");
    assert!(sidecar.is_file());
    assert_eq!(
        std::fs::read_to_string(&sidecar).unwrap(),
        hash::sha1_bytes(b"jar bytes")
    );
    // No .part residue
    assert!(!path.with_file_name("lib-1.0.jar.part").exists());
}

#[tokio::test]
async fn missing_checksum_demotes_to_accept() {
    let server = StubServer::start().await;
    server.route(JAR, Route::ok("unverified bytes"));
    // no .sha1 route: the sidecar fetch 404s

    let tmp = tempfile::tempdir().unwrap();
    let cache = Cache::new(config(tmp.path())).unwrap();
    let path = cache.fetch(&server.url(JAR)).await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"unverified bytes");
}

#[tokio::test]
async fn checksum_mismatch_removes_part_and_fails() {
    let server = StubServer::start().await;
    server.route(JAR, Route::ok("jar bytes"));
    server.route(JAR_SHA1, Route::ok("deadbeefdeadbeefdeadbeefdeadbeefdeadbeef"));

    let tmp = tempfile::tempdir().unwrap();
    let cache = Cache::new(config(tmp.path())).unwrap();
    let url = server.url(JAR);

    let err = cache.fetch(&url).await.unwrap_err();
    assert!(format!("{err:?}").contains("SHA-1 mismatch"));

    let path = cache.path_for(&url).unwrap();
    assert!(!path.exists());
    assert!(!path.with_file_name("lib-1.0.jar.part").exists());
}

#[tokio::test]
async fn concurrent_fetches_collapse_to_one_download() {
    let server = StubServer::start().await;
    server.route(JAR, Route::ok("singleton"));

    let tmp = tempfile::tempdir().unwrap();
    let cache = Cache::new(config(tmp.path())).unwrap();
    let url = server.url(JAR);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let url = url.clone();
        handles.push(tokio::spawn(async move { cache.fetch(&url).await }));
    }
    for handle in handles {
        let path = handle.await.unwrap().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"singleton");
    }
    assert_eq!(server.hits(JAR), 1);
}

#[tokio::test]
async fn local_only_fails_on_miss_and_hits_on_presence() {
    let server = StubServer::start().await;
    server.route(JAR, Route::ok("jar bytes"));

    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config(tmp.path());
    cfg.policies = vec![CachePolicy::LocalOnly];
    let offline = Cache::new(cfg).unwrap();
    let url = server.url(JAR);

    let err = offline.fetch(&url).await.unwrap_err();
    assert!(format!("{err:?}").contains("not in cache"));
    assert_eq!(server.hits(JAR), 0);

    // Prime through an online cache sharing the same root, then retry.
    let online = Cache::new(config(tmp.path())).unwrap();
    online.fetch(&url).await.unwrap();
    let path = offline.fetch(&url).await.unwrap();
    assert!(path.is_file());
}

fn age_last_check(cache: &Cache, url: &str, by: Duration) {
    let last_check = {
        let path = cache.path_for(url).unwrap();
        let name = format!("{}.lastCheck", path.file_name().unwrap().to_string_lossy());
        path.with_file_name(name)
    };
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(&last_check)
        .unwrap();
    file.set_modified(SystemTime::now() - by).unwrap();
}

#[tokio::test]
async fn stale_changing_artifact_revalidates_and_reuses_on_304() {
    let server = StubServer::start().await;
    let path = "/maven2/org/example/lib/1.0-SNAPSHOT/lib-1.0-SNAPSHOT.jar";
    server.route(
        path,
        Route::ok("snapshot v1").with_header("Last-Modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
    );

    let tmp = tempfile::tempdir().unwrap();
    let cache = Cache::new(config(tmp.path())).unwrap();
    let url = server.url(path);

    cache.fetch_changing(&url, true).await.unwrap();
    assert_eq!(server.hits(path), 1);

    // Fresh: within the TTL nothing touches the network.
    cache.fetch_changing(&url, true).await.unwrap();
    assert_eq!(server.hits(path), 1);

    // Aged out: the probe goes out with the stored validator; 304 keeps
    // the file and bumps the freshness stamp.
    age_last_check(&cache, &url, Duration::from_secs(48 * 3600));
    server.route(path, Route::status(304));
    let got = cache.fetch_changing(&url, true).await.unwrap();
    assert_eq!(std::fs::read(&got).unwrap(), b"snapshot v1");
    assert_eq!(server.hits(path), 2);

    let probe = server.requests().into_iter().last().unwrap();
    assert_eq!(
        probe.header("if-modified-since"),
        Some("Wed, 21 Oct 2015 07:28:00 GMT")
    );

    // The bump means the next fetch is quiet again.
    cache.fetch_changing(&url, true).await.unwrap();
    assert_eq!(server.hits(path), 2);
}

#[tokio::test]
async fn stale_changing_artifact_replaced_on_200() {
    let server = StubServer::start().await;
    let path = "/maven2/org/example/lib/1.0-SNAPSHOT/lib-1.0-SNAPSHOT.jar";
    server.route(path, Route::ok("snapshot v1"));

    let tmp = tempfile::tempdir().unwrap();
    let cache = Cache::new(config(tmp.path())).unwrap();
    let url = server.url(path);

    cache.fetch_changing(&url, true).await.unwrap();

    age_last_check(&cache, &url, Duration::from_secs(48 * 3600));
    server.route(path, Route::ok("snapshot v2"));
    let got = cache.fetch_changing(&url, true).await.unwrap();
    assert_eq!(std::fs::read(&got).unwrap(), b"snapshot v2");
}

#[tokio::test]
async fn non_changing_url_skips_revalidation_under_default_policy() {
    let server = StubServer::start().await;
    server.route(JAR, Route::ok("jar bytes"));

    let tmp = tempfile::tempdir().unwrap();
    let cache = Cache::new(config(tmp.path())).unwrap();
    let url = server.url(JAR);

    cache.fetch(&url).await.unwrap();
    age_last_check(&cache, &url, Duration::from_secs(48 * 3600));
    cache.fetch(&url).await.unwrap();
    assert_eq!(server.hits(JAR), 1);
}

#[tokio::test]
async fn transient_5xx_is_retried() {
    let server = StubServer::start().await;
    server.route(JAR, Route::ok("eventually fine").failing_first(1, 503));

    let tmp = tempfile::tempdir().unwrap();
    let cache = Cache::new(config(tmp.path())).unwrap();
    let path = cache.fetch(&server.url(JAR)).await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"eventually fine");
    assert_eq!(server.hits(JAR), 2);
}

#[tokio::test]
async fn persistent_5xx_exhausts_the_budget() {
    let server = StubServer::start().await;
    server.route(JAR, Route::status(500));

    let tmp = tempfile::tempdir().unwrap();
    let cache = Cache::new(config(tmp.path())).unwrap();
    let err = cache.fetch(&server.url(JAR)).await.unwrap_err();
    assert!(format!("{err:?}").contains("HTTP 500"));
    // default retry_count = 1: the original attempt plus one retry
    assert_eq!(server.hits(JAR), 2);
}

#[tokio::test]
async fn missing_artifact_is_not_found() {
    let server = StubServer::start().await;

    let tmp = tempfile::tempdir().unwrap();
    let cache = Cache::new(config(tmp.path())).unwrap();
    let err = cache.fetch(&server.url(JAR)).await.unwrap_err();
    assert!(format!("{err:?}").contains("not found"));
}

#[tokio::test]
async fn redirect_followed_and_credentials_dropped_cross_host() {
    let origin = StubServer::start().await;
    let target = StubServer::start().await;
    origin.route(
        "/old/lib.jar",
        Route::status(301).with_header("Location", &target.url("/new/lib.jar")),
    );
    target.route("/new/lib.jar", Route::ok("relocated"));

    let origin_host = origin.base_url.trim_start_matches("http://").to_string();
    let origin_host = origin_host.split(':').next().unwrap().to_string();

    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config(tmp.path());
    let mut credential = Credential::new(origin_host, "user", "secret");
    credential.https_only = false;
    cfg.credentials = vec![credential];
    let cache = Cache::new(cfg).unwrap();

    let path = cache.fetch(&origin.url("/old/lib.jar")).await.unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), b"relocated");

    let first = &origin.requests()[0];
    assert!(first.header("authorization").is_some());
    let hop = &target.requests()[0];
    assert!(hop.header("authorization").is_none());
}

#[tokio::test]
async fn redirect_keeps_credentials_with_pass_on_redirect() {
    let origin = StubServer::start().await;
    let target = StubServer::start().await;
    origin.route(
        "/old/lib.jar",
        Route::status(301).with_header("Location", &target.url("/new/lib.jar")),
    );
    target.route("/new/lib.jar", Route::ok("relocated"));

    let origin_host = origin.base_url.trim_start_matches("http://").to_string();
    let origin_host = origin_host.split(':').next().unwrap().to_string();

    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config(tmp.path());
    let mut credential = Credential::new(origin_host, "user", "secret");
    credential.https_only = false;
    credential.pass_on_redirect = true;
    cfg.credentials = vec![credential];
    let cache = Cache::new(cfg).unwrap();

    cache.fetch(&origin.url("/old/lib.jar")).await.unwrap();
    let hop = &target.requests()[0];
    assert!(hop.header("authorization").is_some());
}

#[tokio::test]
async fn realm_challenge_selects_matching_credential() {
    let server = StubServer::start().await;
    server.route(
        "/guarded/lib.jar",
        Route::status(401).with_header("WWW-Authenticate", r#"Basic realm="Inner Circle""#),
    );

    let host = server.base_url.trim_start_matches("http://").to_string();
    let host = host.split(':').next().unwrap().to_string();

    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config(tmp.path());
    let mut credential = Credential::new(host, "insider", "pw");
    credential.https_only = false;
    credential.auto = false;
    credential.realm = Some("Inner Circle".to_string());
    cfg.credentials = vec![credential];
    let cache = Cache::new(cfg).unwrap();

    let err = cache.fetch(&server.url("/guarded/lib.jar")).await.unwrap_err();
    assert!(format!("{err:?}").contains("unauthorized"));

    // First request went out bare, the challenge retry carried Basic auth.
    let requests: Vec<_> = server
        .requests()
        .into_iter()
        .filter(|r| r.path == "/guarded/lib.jar")
        .collect();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].header("authorization").is_none());
    assert!(requests[1].header("authorization").is_some());
}

#[tokio::test]
async fn cancel_interrupts_future_fetches() {
    let server = StubServer::start().await;
    server.route(JAR, Route::ok("jar bytes"));

    let tmp = tempfile::tempdir().unwrap();
    let cache = Cache::new(config(tmp.path())).unwrap();
    cache.cancel();
    let err = cache.fetch(&server.url(JAR)).await.unwrap_err();
    assert!(format!("{err:?}").contains("cancelled"));
    assert_eq!(server.hits(JAR), 0);
}

#[tokio::test]
async fn query_strings_cache_to_distinct_files() {
    let server = StubServer::start().await;
    server.route("/api/file.jar?v=1", Route::ok("one"));
    server.route("/api/file.jar?v=2", Route::ok("two"));

    let tmp = tempfile::tempdir().unwrap();
    let cache = Cache::new(config(tmp.path())).unwrap();
    let a = cache.fetch(&server.url("/api/file.jar?v=1")).await.unwrap();
    let b = cache.fetch(&server.url("/api/file.jar?v=2")).await.unwrap();
    assert_ne!(a, b);
    assert_eq!(std::fs::read(&a).unwrap(), b"one");
    assert_eq!(std::fs::read(&b).unwrap(), b"two");
}
