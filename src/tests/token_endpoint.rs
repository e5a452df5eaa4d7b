// POST /token end to end: validation, cache hits, force refresh, failures and backoff hints.

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use http::StatusCode;
    use serde_json::Value;

    use crate::tests::common::{build_reqwest_client, fast_settings, json, spawn_app, ScriptedExtractor, Step};

    #[tokio::test]
    async fn missing_url_is_rejected_with_400() {
        let extractor = Arc::new(ScriptedExtractor::always(Step::Ok));
        let (handle, base, _) = spawn_app(extractor.clone(), fast_settings()).await;
        let client = build_reqwest_client();

        for body in [json!({}), json!({"url": ""}), json!({"streamId": "s1"})] {
            let response = client.post(format!("{}/token", base)).json(&body).send().await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let json: Value = response.json().await.unwrap();
            assert_eq!(json["success"], false);
            assert_eq!(json["error"], "url is required");
        }
        let response = client
            .post(format!("{}/token", base))
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(extractor.calls(), 0);

        handle.abort();
    }

    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        let extractor = Arc::new(ScriptedExtractor::always(Step::Ok));
        let (handle, base, _) = spawn_app(extractor.clone(), fast_settings()).await;
        let client = build_reqwest_client();
        let body = json!({"url": "https://origin.example/live/1"});

        let first: Value = client.post(format!("{}/token", base)).json(&body).send().await.unwrap().json().await.unwrap();
        assert_eq!(first["success"], true);
        assert_eq!(first["cached"], false);
        assert_eq!(first["expiresIn"], 120_000);
        assert_eq!(first["tokenUrl"], "https://origin.example/live/1#token-1");

        let second: Value = client.post(format!("{}/token", base)).json(&body).send().await.unwrap().json().await.unwrap();
        assert_eq!(second["cached"], true);
        assert_eq!(second["tokenUrl"], first["tokenUrl"]);
        assert!(second["expiresIn"].as_u64().unwrap() <= 120_000);
        assert_eq!(extractor.calls(), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn force_refresh_extracts_again() {
        let extractor = Arc::new(ScriptedExtractor::always(Step::Ok));
        let (handle, base, _) = spawn_app(extractor.clone(), fast_settings()).await;
        let client = build_reqwest_client();

        client
            .post(format!("{}/token", base))
            .json(&json!({"url": "https://origin.example/a"}))
            .send()
            .await
            .unwrap();
        let forced: Value = client
            .post(format!("{}/token", base))
            .json(&json!({"url": "https://origin.example/a", "forceRefresh": true}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(forced["cached"], false);
        assert_eq!(forced["tokenUrl"], "https://origin.example/a#token-2");
        assert_eq!(extractor.calls(), 2);

        handle.abort();
    }

    #[tokio::test]
    async fn failures_return_503_with_growing_retry_after() {
        let extractor = Arc::new(ScriptedExtractor::always(Step::Fail));
        let (handle, base, service) = spawn_app(extractor.clone(), fast_settings()).await;
        let client = build_reqwest_client();
        let body = json!({"url": "https://origin.example/down", "streamId": "stream-9"});

        let mut seen = Vec::new();
        for _ in 0..8 {
            let response = client.post(format!("{}/token", base)).json(&body).send().await.unwrap();
            assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
            let json: Value = response.json().await.unwrap();
            assert_eq!(json["success"], false);
            assert!(json["error"].as_str().unwrap().contains("scripted failure"));
            seen.push((json["failures"].as_u64().unwrap(), json["retryAfter"].as_u64().unwrap()));
        }

        assert_eq!(
            seen,
            vec![
                (1, 5_000),
                (2, 10_000),
                (3, 15_000),
                (4, 20_000),
                (5, 25_000),
                (6, 30_000),
                (7, 30_000),
                (8, 30_000)
            ]
        );
        // three attempts per cycle
        assert_eq!(extractor.calls(), 24);
        assert_eq!(service.tracker().get("stream-9").await.unwrap().failures, 8);

        handle.abort();
    }

    #[tokio::test]
    async fn recovery_within_one_cycle_leaves_no_failure() {
        let extractor = Arc::new(ScriptedExtractor::scripted(vec![Step::Fail, Step::Fail], Step::Ok));
        let (handle, base, service) = spawn_app(extractor.clone(), fast_settings()).await;
        let client = build_reqwest_client();

        let response = client
            .post(format!("{}/token", base))
            .json(&json!({"url": "https://origin.example/flaky"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: Value = response.json().await.unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["tokenUrl"], "https://origin.example/flaky#token-3");
        assert_eq!(service.tracker().len().await, 0);

        handle.abort();
    }

    #[tokio::test]
    async fn success_after_failures_resets_the_stream() {
        let mut settings = fast_settings();
        settings.retry.attempts = 1;
        let extractor = Arc::new(ScriptedExtractor::scripted(vec![Step::Fail, Step::Fail], Step::Ok));
        let (handle, base, service) = spawn_app(extractor, settings).await;
        let client = build_reqwest_client();
        let body = json!({"url": "https://origin.example/b", "streamId": "b"});

        for expected in 1..=2u64 {
            let json: Value = client.post(format!("{}/token", base)).json(&body).send().await.unwrap().json().await.unwrap();
            assert_eq!(json["failures"], expected);
        }
        let json: Value = client.post(format!("{}/token", base)).json(&body).send().await.unwrap().json().await.unwrap();
        assert_eq!(json["success"], true);
        assert!(service.tracker().get("b").await.is_none());

        handle.abort();
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let extractor = Arc::new(ScriptedExtractor::always(Step::Ok));
        let (handle, base, _) = spawn_app(extractor, fast_settings()).await;
        let client = build_reqwest_client();

        let response = client
            .get(format!("{}/health", base))
            .header("Origin", "https://player.example")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );

        handle.abort();
    }
}
