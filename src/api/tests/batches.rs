use super::*;
use crate::harvester::test_helpers::wait_for_batch;
use crate::types::{BatchId, BatchStatus};

#[tokio::test]
async fn test_upload_creates_a_processing_batch() {
    let (t, app) = test_app().await;

    let (status, body) = send(
        &app,
        upload_request(
            "journals.csv",
            &issn_csv(&["0142-6001", "0142-6001", "bad", "01426001"]),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "PROCESSING");
    assert_eq!(body["created"], serde_json::json!(["01426001"]));
    assert_eq!(body["invalid"], serde_json::json!(["bad"]));
    assert_eq!(body["duplicates"], serde_json::json!(["01426001"]));

    let batch_id = body["batch_id"].as_i64().unwrap();
    let batch = t.harvester.db.get_batch(BatchId(batch_id)).await.unwrap().unwrap();
    assert_eq!(batch.original_filename.as_deref(), Some("journals.csv"));
}

#[tokio::test]
async fn test_upload_without_issn_column_is_unprocessable() {
    let (_t, app) = test_app().await;

    let (status, body) = send(
        &app,
        upload_request("journals.csv", b"Title,Publisher\nNature,Springer\n"),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["status"], "FAILED");
    assert_eq!(
        body["messages"][0]["text"],
        "Spreadsheet must contain an 'ISSN' column."
    );
}

#[tokio::test]
async fn test_upload_without_file_is_bad_request() {
    let (_t, app) = test_app().await;

    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{BOUNDARY}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/batches")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "missing_file");
}

#[tokio::test]
async fn test_list_and_get_batches_include_counts() {
    let (_t, app) = test_app().await;
    let (_, uploaded) = send(
        &app,
        upload_request("a.csv", &issn_csv(&["01426001", "12345678"])),
    )
    .await;
    let batch_id = uploaded["batch_id"].as_i64().unwrap();

    let (status, list) = send(&app, get("/batches")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["id"], batch_id);
    assert_eq!(list[0]["counts"]["total"], 2);
    assert_eq!(list[0]["counts"]["pending"], 2);

    let (status, one) = send(&app, get(&format!("/batches/{batch_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(one["original_filename"], "a.csv");

    let (status, identifiers) =
        send(&app, get(&format!("/batches/{batch_id}/identifiers"))).await;
    assert_eq!(status, StatusCode::OK);
    let codes: Vec<&str> = identifiers
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes, vec!["01426001", "12345678"]);
}

#[tokio::test]
async fn test_unknown_batch_is_404() {
    let (_t, app) = test_app().await;

    let (status, body) = send(&app, get("/batches/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "batch_not_found");
    assert_eq!(body["error"]["details"]["batch_id"], 999);

    let (status, _) = send(&app, get("/batches/999/identifiers")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_requeue_endpoints_report_per_batch() {
    let t = crate::harvester::test_helpers::create_test_harvester(Script::default(), false).await;
    let app = create_router(Arc::new(t.harvester.clone()), t.harvester.get_config());
    let mut events = t.harvester.subscribe();
    t.harvester.start_dispatcher();

    let (_, uploaded) = send(&app, upload_request("a.csv", &issn_csv(&["01426001"]))).await;
    let batch_id = BatchId(uploaded["batch_id"].as_i64().unwrap());
    assert_eq!(wait_for_batch(&mut events, batch_id).await, BatchStatus::Failed);

    let (status, report) = send(
        &app,
        post_json(
            "/batches/requeue",
            serde_json::json!({ "batch_ids": [batch_id.0, 404] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["requeued"], serde_json::json!([batch_id.0]));
    assert_eq!(report["skipped"], serde_json::json!([404]));
    assert_eq!(report["identifiers_reset"], 1);
    assert_eq!(report["messages"][0]["text"], "Batch 404 not found.");
    assert_eq!(report["messages"][0]["level"], "warning");

    // the gate keeps failing, so the batch ends up FAILED again
    assert_eq!(wait_for_batch(&mut events, batch_id).await, BatchStatus::Failed);

    let (status, body) = send(
        &app,
        post_json(&format!("/batches/{}/requeue", batch_id), serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["identifiers_reset"], 1);
    assert_eq!(wait_for_batch(&mut events, batch_id).await, BatchStatus::Failed);

    let (status, body) = send(
        &app,
        post_json("/batches/77/requeue", serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "batch_not_found");
}

#[tokio::test]
async fn test_delete_batch() {
    let (t, app) = test_app().await;
    let (_, uploaded) = send(&app, upload_request("a.csv", &issn_csv(&["01426001"]))).await;
    let batch_id = BatchId(uploaded["batch_id"].as_i64().unwrap());

    // nothing drains the queue here, so the batch is still PROCESSING
    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/batches/{}", batch_id))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "batch_busy");

    t.harvester
        .db
        .update_batch_status(batch_id, BatchStatus::Failed, None)
        .await
        .unwrap();

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/batches/{}", batch_id))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get(&format!("/batches/{}", batch_id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
