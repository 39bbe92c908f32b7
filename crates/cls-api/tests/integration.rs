//! Integration tests: auth, classify, retrain lifecycle, results, save, list/delete.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use cls_api::server::{self, AppState};
use cls_jobs::JobRegistry;
use cls_ml::{Classifier, MockToolkit, ModelPaths, NdarrayToolkit};
use cls_trainer::{OrchestratorConfig, TrainingOrchestrator};
use cls_types::{Hyperparameters, ModelType, Toolkit, TrainingSample};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

const KEY: &str = "test-key";

fn test_state(
    output_dir: &Path,
    toolkit: Arc<dyn Toolkit>,
    classifier: Option<Arc<Classifier>>,
) -> Arc<AppState> {
    let registry = Arc::new(JobRegistry::new());
    let orchestrator = TrainingOrchestrator::new(
        registry.clone(),
        toolkit,
        OrchestratorConfig {
            output_dir: output_dir.to_path_buf(),
            progress_batch_interval: Some(1),
            ..OrchestratorConfig::default()
        },
    );
    Arc::new(AppState {
        registry,
        orchestrator,
        classifier,
        api_key: KEY.to_string(),
        max_body_bytes: 1024 * 1024,
        allowed_origins: Vec::new(),
    })
}

fn test_app(output_dir: &Path) -> (axum::Router, Arc<AppState>) {
    let state = test_state(output_dir, Arc::new(MockToolkit::new()), None);
    (server::router(state.clone()), state)
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", KEY);
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let body = res.into_body().collect().await.unwrap().to_bytes();
    let j = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, j)
}

fn samples(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            let (content, label) = if i % 2 == 0 {
                ("invoice payment due", "finance")
            } else {
                ("exam lecture notes", "study")
            };
            json!({ "id": i, "title": format!("mail {i}"), "content": content, "labels": [label] })
        })
        .collect()
}

fn retrain_body(job_id: &str, model_type: &str, n: usize) -> Value {
    json!({
        "jobId": job_id,
        "modelType": model_type,
        "samples": samples(n),
        "hyperparameters": { "epochs": 2, "batch_size": 4 }
    })
}

async fn wait_for_terminal(app: &axum::Router, job_id: &str) -> Value {
    for _ in 0..500 {
        let (status, j) = send(app, request("GET", &format!("/api/v1/retrain/status/{job_id}"), None)).await;
        assert_eq!(status, StatusCode::OK);
        if j["status"] == "completed" || j["status"] == "failed" {
            return j;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}

#[tokio::test]
async fn health_and_model_info_without_a_model() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = test_app(dir.path());

    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, j) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["status"], "unhealthy");
    assert_eq!(j["modelLoaded"], false);

    let req = Request::builder().uri("/api/v1/model/info").body(Body::empty()).unwrap();
    let (status, j) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["loaded"], false);

    let req = Request::builder().uri("/").body(Body::empty()).unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn protected_routes_require_the_api_key() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = test_app(dir.path());

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/retrain")
        .header("content-type", "application/json")
        .body(Body::from(retrain_body("j1", "CNN", 12).to_string()))
        .unwrap();
    let (status, j) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(j["error"], "unauthorized");
    assert!(j["detail"].is_string());

    let req = Request::builder()
        .uri("/api/v1/retrain/jobs")
        .header("x-api-key", "wrong")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(state.registry.is_empty());
}

#[tokio::test]
async fn retrain_rejects_invalid_requests_before_creating_a_job() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = test_app(dir.path());

    let (status, j) = send(&app, request("POST", "/api/v1/retrain", Some(retrain_body("j1", "GRU", 12)))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(j["error"], "bad_request");

    let (status, _) = send(&app, request("POST", "/api/v1/retrain", Some(retrain_body("j2", "CNN", 5)))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut body = retrain_body("j3", "CNN", 12);
    body["hyperparameters"]["epochs"] = json!(0);
    let (status, _) = send(&app, request("POST", "/api/v1/retrain", Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(state.registry.is_empty());
}

#[tokio::test]
async fn retrain_poll_results_and_save() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = test_app(dir.path());

    let (status, j) = send(&app, request("POST", "/api/v1/retrain", Some(retrain_body("job-1", "LSTM", 20)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["jobId"], "job-1");
    assert_eq!(j["status"], "running");

    let final_status = wait_for_terminal(&app, "job-1").await;
    assert_eq!(final_status["status"], "completed");
    assert_eq!(final_status["progress"]["currentEpoch"], 2);
    assert!(!final_status["logs"].as_array().unwrap().is_empty());

    let (status, j) = send(&app, request("GET", "/api/v1/retrain/results/job-1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["status"], "completed");
    assert!((j["metrics"]["testLoss"].as_f64().unwrap() - 0.37).abs() < 1e-9);
    assert_eq!(j["history"]["loss"].as_array().unwrap().len(), 2);

    let (status, j) = send(
        &app,
        request("POST", "/api/v1/retrain/save/job-1", Some(json!({ "modelName": "email_lstm" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["success"], true);
    assert!(j["modelPath"].as_str().unwrap().ends_with("email_lstm.model.json"));
    assert!(dir.path().join("email_lstm.model.json").exists());
    assert!(dir.path().join("tokenizer.json").exists());
    assert!(dir.path().join("label_binarizer.json").exists());
    assert!(dir.path().join("model_metadata.json").exists());

    let (status, _) = send(
        &app,
        request("POST", "/api/v1/retrain/save/job-1", Some(json!({ "modelName": "../escape" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_and_unfinished_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = test_app(dir.path());

    let (status, j) = send(&app, request("GET", "/api/v1/retrain/status/missing", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(j["error"], "not_found");
    let (status, _) = send(&app, request("GET", "/api/v1/retrain/results/missing", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(
        &app,
        request("POST", "/api/v1/retrain/save/missing", Some(json!({ "modelName": "m" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    state.registry.create_job("pending-job", ModelType::Rnn);
    let (status, j) = send(&app, request("GET", "/api/v1/retrain/results/pending-job", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(j["detail"].as_str().unwrap().contains("pending"));
    let (status, _) = send(
        &app,
        request("POST", "/api/v1/retrain/save/pending-job", Some(json!({ "modelName": "m" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn retrain_accepts_job_ids_with_nul_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = test_app(dir.path());

    let (status, j) = send(&app, request("POST", "/api/v1/retrain", Some(retrain_body("job\u{0}x", "RNN", 12)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["jobId"], "job\u{0}x");

    for _ in 0..500 {
        let job = state.registry.get_job_status("job\u{0}x").unwrap();
        if job.status.is_terminal() {
            assert_eq!(job.status, cls_jobs::JobStatus::Completed);
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job with NUL in its id did not finish");
}

#[tokio::test]
async fn failed_training_is_reported_on_status() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(
        dir.path(),
        Arc::new(MockToolkit::new().failing_at(cls_ml::FailAt::Fit)),
        None,
    );
    let app = server::router(state);

    let (status, _) = send(&app, request("POST", "/api/v1/retrain", Some(retrain_body("bad", "CNN", 12)))).await;
    assert_eq!(status, StatusCode::OK);
    let final_status = wait_for_terminal(&app, "bad").await;
    assert_eq!(final_status["status"], "failed");
    assert!(final_status["error"].is_string());

    let (status, _) = send(&app, request("GET", "/api/v1/retrain/results/bad", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_and_delete_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let (app, state) = test_app(dir.path());
    state.registry.create_job("a", ModelType::Cnn);
    state.registry.create_job("b", ModelType::Lstm);

    let (status, j) = send(&app, request("GET", "/api/v1/retrain/jobs", None)).await;
    assert_eq!(status, StatusCode::OK);
    let jobs = j.as_object().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs["a"]["status"], "pending");
    assert!(jobs["b"].get("fullResults").is_none());

    let (status, j) = send(&app, request("DELETE", "/api/v1/retrain/jobs/a", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(j["deleted"], true);
    let (status, _) = send(&app, request("DELETE", "/api/v1/retrain/jobs/a", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(state.registry.len(), 1);
}

#[tokio::test]
async fn classify_without_a_model() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = test_app(dir.path());

    let (status, _) = send(
        &app,
        request("POST", "/api/v1/classify", Some(json!({ "title": "   ", "content": "x" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, j) = send(
        &app,
        request("POST", "/api/v1/classify", Some(json!({ "title": "Hi", "content": "invoice" }))),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(j["error"], "internal_error");
}

#[tokio::test]
async fn classify_with_a_trained_model() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(JobRegistry::new());
    let trainer = TrainingOrchestrator::new(
        registry.clone(),
        Arc::new(NdarrayToolkit::new().with_embedding_dim(8)),
        OrchestratorConfig {
            output_dir: dir.path().to_path_buf(),
            ..OrchestratorConfig::default()
        },
    );
    let corpus: Vec<TrainingSample> = samples(20)
        .into_iter()
        .map(|v| serde_json::from_value(v).unwrap())
        .collect();
    let hyperparameters = Hyperparameters {
        epochs: 5,
        batch_size: 4,
        learning_rate: 0.01,
        max_words: 100,
        max_len: 20,
    };
    registry.create_job("seed", ModelType::Cnn);
    trainer
        .train_model("seed", ModelType::Cnn, &corpus, &hyperparameters)
        .unwrap();
    trainer.save_artifact("seed", "email_cnn").unwrap();
    let classifier = Classifier::load(&ModelPaths::in_dir(dir.path(), "email_cnn")).unwrap();

    let state = test_state(dir.path(), Arc::new(MockToolkit::new()), Some(Arc::new(classifier)));
    let app = server::router(state);

    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (_, j) = send(&app, req).await;
    assert_eq!(j["status"], "healthy");
    assert_eq!(j["modelLoaded"], true);

    let req = Request::builder().uri("/api/v1/model/info").body(Body::empty()).unwrap();
    let (_, j) = send(&app, req).await;
    assert_eq!(j["loaded"], true);
    assert_eq!(j["numClasses"], 2);

    let (status, j) = send(
        &app,
        request("POST", "/api/v1/classify", Some(json!({ "title": " Reminder ", "content": "invoice payment" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let labels = j["labels"].as_array().unwrap();
    assert!(!labels.is_empty());
    for l in labels {
        assert!(l["label"] == "finance" || l["label"] == "study");
        let confidence = l["confidence"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&confidence));
    }
}
