//! Integration tests for plygate

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use sha2::{Digest, Sha256};
    use tempfile::TempDir;

    fn plygate() -> Command {
        cargo_bin_cmd!("plygate")
    }

    /// A config file that keeps all state inside `temp`
    fn config_in(temp: &TempDir) -> std::path::PathBuf {
        let path = temp.path().join("config.toml");
        let cache = temp.path().join("cache");
        let downloads = temp.path().join("oss");
        std::fs::write(
            &path,
            format!(
                "[cache]\ndir = {:?}\nretention_days = 7\n\n[oss]\ntemp_dir = {:?}\n",
                cache.display().to_string(),
                downloads.display().to_string()
            ),
        )
        .unwrap();
        path
    }

    #[test]
    fn help_displays() {
        plygate()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("image-to-point-cloud"));
    }

    #[test]
    fn version_displays() {
        plygate()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("plygate"));
    }

    #[test]
    fn config_path_follows_flag() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        plygate()
            .args(["config", "path", "-c"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("custom.toml"));
    }

    #[test]
    fn config_show_defaults_without_file() {
        let temp = TempDir::new().unwrap();
        plygate()
            .args(["config", "show", "-c"])
            .arg(temp.path().join("missing.toml"))
            .assert()
            .success()
            .stdout(predicate::str::contains("[server]"))
            .stdout(predicate::str::contains("0.0.0.0:6008"));
    }

    #[test]
    fn config_init_then_refuse_overwrite() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        plygate()
            .args(["config", "init", "-c"])
            .arg(&path)
            .assert()
            .success();
        assert!(path.exists());

        plygate()
            .args(["config", "init", "-c"])
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"))
            .stderr(predicate::str::contains("--force"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[cache\n").unwrap();

        plygate()
            .args(["sweep", "-c"])
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn fingerprint_prints_sha256() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("cat.jpg");
        std::fs::write(&file, b"jpeg bytes").unwrap();
        let expected = hex::encode(Sha256::digest(b"jpeg bytes"));

        plygate()
            .arg("fingerprint")
            .arg(&file)
            .assert()
            .success()
            .stdout(predicate::str::contains(format!("{expected}.ply")));
    }

    #[test]
    fn fingerprint_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        plygate()
            .arg("fingerprint")
            .arg(temp.path().join("nope.jpg"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn normalize_rewrites_in_place() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("out.ply");
        std::fs::write(&file, b"ply\nproperty uint flags\nend_header\n\xff\x00").unwrap();

        plygate()
            .arg("normalize")
            .arg(&file)
            .assert()
            .success()
            .stdout(predicate::str::contains("Rewrote 1"));

        assert_eq!(
            std::fs::read(&file).unwrap(),
            b"ply\nproperty int flags\nend_header\n\xff\x00"
        );
    }

    #[test]
    fn normalize_unterminated_leaves_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("out.ply");
        let original = b"ply\nproperty uint flags\n".to_vec();
        std::fs::write(&file, &original).unwrap();

        plygate()
            .arg("normalize")
            .arg(&file)
            .assert()
            .failure()
            .stderr(predicate::str::contains("end_header"));

        assert_eq!(std::fs::read(&file).unwrap(), original);
    }

    #[test]
    fn sweep_dry_run_keeps_files() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        let cache = temp.path().join("cache");
        std::fs::create_dir_all(&cache).unwrap();
        let name = format!("{}.ply", hex::encode(Sha256::digest(b"old")));
        let artifact = cache.join(&name);
        std::fs::write(&artifact, b"ply").unwrap();
        std::fs::File::open(&artifact)
            .unwrap()
            .set_modified(std::time::SystemTime::now() - std::time::Duration::from_secs(8 * 86_400))
            .unwrap();

        plygate()
            .args(["sweep", "--dry-run", "-c"])
            .arg(&config)
            .assert()
            .success()
            .stdout(predicate::str::contains(name.as_str()))
            .stdout(predicate::str::contains("1 expired artifact(s) would be evicted"));
        assert!(artifact.exists());

        plygate()
            .args(["sweep", "-c"])
            .arg(&config)
            .assert()
            .success()
            .stdout(predicate::str::contains("Evicted 1"));
        assert!(!artifact.exists());
    }

    #[test]
    fn sweep_removes_expired_downloads() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        let downloads = temp.path().join("oss");
        std::fs::create_dir_all(&downloads).unwrap();
        let stale = downloads.join("1a2b3c4d-cat.png");
        let recent = downloads.join("5e6f7a8b-dog.png");
        std::fs::write(&stale, b"png").unwrap();
        std::fs::write(&recent, b"png").unwrap();
        std::fs::File::open(&stale)
            .unwrap()
            .set_modified(std::time::SystemTime::now() - std::time::Duration::from_secs(8 * 86_400))
            .unwrap();

        plygate()
            .args(["sweep", "-c"])
            .arg(&config)
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 1 expired download(s)"));
        assert!(!stale.exists());
        assert!(recent.exists());
    }
}

mod http_tests {
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use plygate::cache::{ArtifactStore, Coordinator};
    use plygate::config::Config;
    use plygate::error::{PlygateError, PlygateResult};
    use plygate::generator::Generator;
    use plygate::ledger::TaskLedger;
    use plygate::remote::RemoteFetcher;
    use plygate::server::{router, AppState};
    use serde_json::{json, Value};
    use sha2::{Digest, Sha256};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "plygate-test-boundary";

    /// Writes a small PLY with a `uint` property and counts invocations
    #[derive(Default)]
    struct CountingGenerator {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Generator for CountingGenerator {
        async fn ensure_ready(&self) -> PlygateResult<()> {
            Ok(())
        }

        async fn generate(&self, _image: &Path, workdir: &Path) -> PlygateResult<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PlygateError::Generation("CUDA out of memory".into()));
            }
            let out = workdir.join("out.ply");
            std::fs::write(
                &out,
                b"ply\nformat binary_little_endian 1.0\nelement vertex 1\nproperty uint flags\nend_header\n\x07\x00\x00\x00",
            )
            .unwrap();
            Ok(out)
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    /// Serves objects from memory
    struct MemoryFetcher {
        objects: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl RemoteFetcher for MemoryFetcher {
        async fn fetch(&self, url: &str, dest_dir: &Path) -> PlygateResult<PathBuf> {
            let bytes = self
                .objects
                .get(url)
                .ok_or_else(|| PlygateError::RemoteNotFound(url.to_string()))?;
            let name = url.rsplit('/').next().unwrap();
            let path = dest_dir.join(name);
            std::fs::write(&path, bytes).unwrap();
            Ok(path)
        }
    }

    struct Harness {
        app: Router,
        generator: Arc<CountingGenerator>,
        temp: TempDir,
    }

    async fn harness_with(generator: CountingGenerator, max_upload_bytes: u64) -> Harness {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.dir = Some(temp.path().join("cache"));
        config.upload.dir = Some(temp.path().join("uploads"));
        config.upload.max_upload_bytes = max_upload_bytes;
        config.oss.temp_dir = Some(temp.path().join("oss"));

        let generator = Arc::new(generator);
        let store = ArtifactStore::open(config.cache_dir()).await.unwrap();
        let coordinator = Coordinator::new(store, generator.clone(), config.cache.retention(), 1);
        let fetcher = MemoryFetcher {
            objects: HashMap::from([(
                "https://bucket.example.com/img/dog.png".to_string(),
                png(320, 200),
            )]),
        };
        let ledger = TaskLedger::from_config(&config.ledger);
        let state = AppState::new(config, coordinator, Arc::new(fetcher), ledger);

        Harness {
            app: router(Arc::new(state)),
            generator,
            temp,
        }
    }

    async fn harness() -> Harness {
        harness_with(CountingGenerator::default(), 10 * 1024 * 1024).await
    }

    /// PNG signature and IHDR followed by filler
    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.extend_from_slice(&13u32.to_be_bytes());
        bytes.extend_from_slice(b"IHDR");
        bytes.extend_from_slice(&width.to_be_bytes());
        bytes.extend_from_slice(&height.to_be_bytes());
        bytes.extend_from_slice(&[8, 6, 0, 0, 0, 0, 0, 0, 0]);
        bytes.extend(std::iter::repeat(0xAB).take(1024));
        bytes
    }

    /// 17 KB of stand-in JPEG bytes
    fn cat_jpg() -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8];
        bytes.extend((0..17 * 1024).map(|i| (i % 251) as u8));
        bytes
    }

    fn upload_request(file_name: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    fn oss_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/generate_from_oss_url")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(app, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn ply_name(bytes: &[u8]) -> String {
        format!("{}.ply", hex::encode(Sha256::digest(bytes)))
    }

    fn dir_len(path: &Path) -> usize {
        std::fs::read_dir(path).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn root_reports_ok() {
        let h = harness().await;
        let (status, body) = send_json(&h.app, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn upload_generates_then_serves_from_cache() {
        let h = harness().await;
        let image = cat_jpg();

        let (status, first) = send_json(&h.app, upload_request("cat.jpg", &image)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["ply_filename"], ply_name(&image));
        assert_eq!(first["status"], "completed");
        assert_eq!(first["cached"], false);
        assert!(first["task_id"].is_string());

        let (status, second) = send_json(&h.app, upload_request("cat-copy.jpg", &image)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["ply_filename"], first["ply_filename"]);
        assert_eq!(second["cached"], true);
        assert_ne!(second["task_id"], first["task_id"]);

        assert_eq!(h.generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn generated_ply_is_downloadable_and_normalized() {
        let h = harness().await;
        let image = cat_jpg();
        send_json(&h.app, upload_request("cat.jpg", &image)).await;

        let response = h
            .app
            .clone()
            .oneshot(get(&format!("/api/ply/{}", ply_name(&image))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "application/octet-stream"
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("property int flags\n"));
        assert!(bytes.ends_with(b"end_header\n\x07\x00\x00\x00"));
    }

    #[tokio::test]
    async fn upload_reports_dimensions_and_status() {
        let h = harness().await;

        let (status, body) = send_json(&h.app, upload_request("dog.png", &png(640, 480))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["image_width"], 640);
        assert_eq!(body["image_height"], 480);

        let task_id = body["task_id"].as_str().unwrap();
        let (status, record) = send_json(&h.app, get(&format!("/api/status/{task_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["status"], "completed");
        assert_eq!(record["ply_filename"], body["ply_filename"]);
        assert_eq!(record["image_width"], 640);
    }

    #[tokio::test]
    async fn uploads_are_removed_after_request() {
        let h = harness().await;
        send_json(&h.app, upload_request("cat.jpg", &cat_jpg())).await;
        assert_eq!(dir_len(&h.temp.path().join("uploads")), 0);
    }

    #[tokio::test]
    async fn rejected_extension_leaves_no_trace() {
        let h = harness().await;

        let (status, body) = send_json(&h.app, upload_request("notes.txt", b"hello")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("Invalid file type"));
        assert_eq!(dir_len(&h.temp.path().join("uploads")), 0);
        assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
        let cached: Vec<_> = std::fs::read_dir(h.temp.path().join("cache"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "ply"))
            .collect();
        assert!(cached.is_empty());
    }

    #[tokio::test]
    async fn missing_file_field_is_bad_request() {
        let h = harness().await;
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nx\r\n--{BOUNDARY}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap();

        let (status, body) = send_json(&h.app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("file"));
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let h = harness_with(CountingGenerator::default(), 1024).await;

        let (status, body) = send_json(&h.app, upload_request("big.png", &png(10, 10))).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body["detail"].is_string());
        assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn generation_failure_is_server_error() {
        let h = harness_with(
            CountingGenerator {
                fail: true,
                ..CountingGenerator::default()
            },
            10 * 1024 * 1024,
        )
        .await;
        let image = cat_jpg();

        let (status, body) = send_json(&h.app, upload_request("cat.jpg", &image)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .contains("Failed to generate PLY"));
        let (status, _) = send(&h.app, get(&format!("/api/ply/{}", ply_name(&image)))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let h = harness().await;
        let (status, body) = send_json(&h.app, get("/api/status/does-not-exist")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Task not found: does-not-exist");
    }

    #[tokio::test]
    async fn unknown_ply_is_not_found() {
        let h = harness().await;
        for name in [ply_name(b"never uploaded"), "notes.ply".to_string(), "config.toml".to_string()] {
            let (status, _) = send(&h.app, get(&format!("/api/ply/{name}"))).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{name}");
        }
    }

    #[tokio::test]
    async fn oss_url_runs_same_pipeline() {
        let h = harness().await;
        let url = "https://bucket.example.com/img/dog.png";

        let (status, first) = send_json(&h.app, oss_request(json!({ "url": url }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["ply_filename"], ply_name(&png(320, 200)));
        assert_eq!(first["image_width"], 320);
        assert_eq!(first["cached"], false);

        let (_, upload) = send_json(&h.app, upload_request("dog.png", &png(320, 200))).await;
        assert_eq!(upload["ply_filename"], first["ply_filename"]);
        assert_eq!(upload["cached"], true);
        assert_eq!(h.generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oss_url_validation() {
        let h = harness().await;
        let cases = [
            (json!({ "url": "" }), "URL is required"),
            (json!({}), "URL is required"),
            (json!({ "url": "https://bucket.example.com/docs/notes.txt" }), "Invalid file type"),
            (json!({ "url": "https://bucket.example.com/img/missing.png" }), "not found"),
        ];
        for (payload, expected) in cases {
            let (status, body) = send_json(&h.app, oss_request(payload.clone())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{payload}");
            assert!(
                body["detail"].as_str().unwrap().contains(expected),
                "{payload}: {body}"
            );
        }
        assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request() {
        let h = harness().await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/generate_from_oss_url")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let (status, body) = send_json(&h.app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].is_string());
    }
}
