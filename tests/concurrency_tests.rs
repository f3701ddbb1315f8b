mod common;

use axum::http::StatusCode;
use common::{get, TestApp};
use futures::future::join_all;
use tower::ServiceExt;

const LIMIT: usize = 10;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_requests_admit_exactly_the_limit() {
    let t = TestApp::new(&format!("{}-M", LIMIT));
    let token = t.token("u1");

    let tasks = (0..2 * LIMIT).map(|_| {
        let app = t.app.clone();
        let token = token.clone();
        tokio::spawn(async move {
            app.oneshot(get("/api/v1/expenses", Some(&token)))
                .await
                .unwrap()
                .status()
        })
    });

    let statuses: Vec<StatusCode> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let admitted = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let rejected = statuses
        .iter()
        .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
        .count();

    assert_eq!(admitted, LIMIT);
    assert_eq!(rejected, LIMIT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identities_do_not_interfere() {
    let t = TestApp::new("3-M");
    let tokens: Vec<String> = (0..8).map(|i| t.token(&format!("user-{}", i))).collect();

    let router = &t.app;
    let tasks = tokens.iter().flat_map(|token| {
        (0..3).map(move |_| {
            let app = router.clone();
            let token = token.clone();
            tokio::spawn(async move {
                app.oneshot(get("/api/v1/expenses", Some(&token)))
                    .await
                    .unwrap()
                    .status()
            })
        })
    });

    for status in join_all(tasks).await {
        assert_eq!(status.unwrap(), StatusCode::OK);
    }
    assert_eq!(t.context.limiter.tracked_identities(), 8);
}
