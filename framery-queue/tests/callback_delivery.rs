use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;

use framery_core::{JobResult, JobStatus};
use framery_queue::{CallbackDispatcher, CallbackError};

#[derive(Clone)]
struct Endpoint {
    hits: Arc<Mutex<Vec<Instant>>>,
    /// How many attempts to reject with 503 before returning 200.
    reject_first: usize,
}

async fn hook(State(endpoint): State<Endpoint>) -> StatusCode {
    let mut hits = endpoint.hits.lock();
    hits.push(Instant::now());
    if hits.len() <= endpoint.reject_first {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

async fn serve(reject_first: usize) -> (String, Arc<Mutex<Vec<Instant>>>) {
    let hits = Arc::new(Mutex::new(Vec::new()));
    let endpoint = Endpoint {
        hits: hits.clone(),
        reject_first,
    };
    let app = Router::new().route("/hook", post(hook)).with_state(endpoint);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/hook"), hits)
}

/// S6. Two 503s then a 200: three attempts, doubling delays.
#[tokio::test]
async fn retries_with_exponential_backoff_then_succeeds() {
    let (url, hits) = serve(2).await;
    let dispatcher = CallbackDispatcher::new(Duration::from_secs(5), 3, Duration::from_millis(100));

    dispatcher
        .dispatch("j1", JobStatus::Completed, Some(&JobResult::default()), &url)
        .await
        .unwrap();

    let hits = hits.lock();
    assert_eq!(hits.len(), 3);

    let second_delay = hits[1] - hits[0];
    let third_delay = hits[2] - hits[1];
    assert!(second_delay >= Duration::from_millis(100), "{second_delay:?}");
    assert!(second_delay < Duration::from_millis(200), "{second_delay:?}");
    assert!(third_delay >= Duration::from_millis(200), "{third_delay:?}");
    assert!(third_delay < Duration::from_millis(400), "{third_delay:?}");
}

/// Attempts stop at the retry cap and the error reports it.
#[tokio::test]
async fn gives_up_after_max_retries() {
    let (url, hits) = serve(usize::MAX).await;
    let dispatcher = CallbackDispatcher::new(Duration::from_secs(5), 3, Duration::from_millis(10));

    let err = dispatcher
        .dispatch("j1", JobStatus::Completed, None, &url)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CallbackError::ExhaustedRetries { attempts: 3 }
    ));
    assert_eq!(hits.lock().len(), 3);
}

/// At-most-once per (jobId, final status).
#[tokio::test]
async fn repeated_dispatch_for_same_final_status_is_a_noop() {
    let (url, hits) = serve(0).await;
    let dispatcher = CallbackDispatcher::new(Duration::from_secs(5), 3, Duration::from_millis(10));

    dispatcher
        .dispatch("j1", JobStatus::Completed, None, &url)
        .await
        .unwrap();
    dispatcher
        .dispatch("j1", JobStatus::Completed, None, &url)
        .await
        .unwrap();
    assert_eq!(hits.lock().len(), 1);

    // A different final status for the same job is delivered.
    dispatcher
        .dispatch("j1", JobStatus::Failed, None, &url)
        .await
        .unwrap();
    assert_eq!(hits.lock().len(), 2);
}

/// Unreachable endpoints exhaust retries without delivering.
#[tokio::test]
async fn connection_errors_count_as_attempts() {
    // Port 9 is discard; nothing listens there in the test environment.
    let dispatcher = CallbackDispatcher::new(Duration::from_millis(200), 2, Duration::from_millis(10));
    let err = dispatcher
        .dispatch("j1", JobStatus::Completed, None, "http://127.0.0.1:9/hook")
        .await
        .unwrap_err();
    assert!(matches!(err, CallbackError::ExhaustedRetries { attempts: 2 }));
}
