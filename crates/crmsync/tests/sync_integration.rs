//! End-to-end sync runs against an in-memory SQLite mirror and a mock
//! transport. Each test drives a real orchestrator through the full
//! client/store pipeline.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use sea_orm::EntityTrait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crmsync::entity::{contact, event, message, user};
use crmsync::http::{HttpMethod, HttpResponse, MockTransport};
use crmsync::sync::run_entity;
use crmsync::{
    CrmClient, CrmOptions, EntityKind, RateGovernor, ResilientTransport, StaticToken, SyncContext,
    SyncError, SyncSettings,
};

const BASE: &str = "https://crm.example.com/api/v4";

/// Mirrors the audit-log type filter the event orchestrator sends.
const EVENT_TYPES: &str = "lead_added,lead_deleted,lead_restored,lead_status_changed,lead_linked,lead_unlinked,\
contact_added,contact_deleted,contact_restored,contact_linked,contact_unlinked,\
company_added,company_deleted,company_restored,company_linked,company_unlinked,\
task_added,task_deleted,task_completed,task_type_changed,task_text_changed,task_deadline_changed,\
entity_tag_added,entity_tag_deleted,entity_linked,entity_unlinked,entity_merged,sale_field_changed,\
common_note_added,common_note_deleted";

async fn ctx_with(mock: &MockTransport, page_size: u32) -> SyncContext {
    let db = crmsync::connect_and_migrate("sqlite::memory:")
        .await
        .expect("in-memory database");
    let cancel = CancellationToken::new();
    let transport = ResilientTransport::with_cancellation(
        Arc::new(mock.clone()),
        RateGovernor::default(),
        cancel.clone(),
    );
    let client = CrmClient::new(
        transport,
        Arc::new(StaticToken("tok".to_string())),
        CrmOptions {
            base_url: BASE.to_string(),
            page_size,
            request_delay_ms: 0,
        },
    );
    SyncContext {
        db,
        client,
        settings: SyncSettings::default(),
        cancel,
    }
}

fn ok(body: serde_json::Value) -> HttpResponse {
    HttpResponse {
        status: 200,
        headers: Vec::new(),
        body: body.to_string().into_bytes(),
    }
}

fn no_content() -> HttpResponse {
    HttpResponse {
        status: 204,
        headers: Vec::new(),
        body: Vec::new(),
    }
}

fn contact_item(id: i64, name: &str, updated_at: i64) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "responsible_user_id": 11,
        "account_id": 3,
        "updated_at": updated_at,
        "created_at": updated_at - 1_000,
    })
}

fn register_full_contact_pages(mock: &MockTransport, pages: &[serde_json::Value]) {
    for (i, items) in pages.iter().enumerate() {
        mock.push_response(
            HttpMethod::Get,
            format!("{BASE}/contacts?with=leads,companies,tags&limit=2&page={}", i + 1),
            ok(json!({ "_embedded": { "contacts": items } })),
        );
    }
}

#[tokio::test]
async fn full_contact_sync_paginates_writes_and_is_idempotent_on_rerun() {
    let mock = MockTransport::new();
    let pages = [
        json!([contact_item(1, "Ada", 1_704_844_700), contact_item(2, "Ben", 1_704_844_800)]),
        json!([contact_item(3, "Cyd", 1_704_844_600), contact_item(4, "Dev", 1_704_844_650)]),
        json!([]),
    ];
    register_full_contact_pages(&mock, &pages);

    let ctx = ctx_with(&mock, 2).await;
    let report = run_entity(&ctx, EntityKind::Contacts, true).await.expect("first run");
    assert_eq!(report.processed, 4);
    assert_eq!(report.written, 4);
    assert_eq!(report.unchanged, 0);
    assert_eq!(report.decode_errors, 0);
    assert_eq!(mock.requests().len(), 3);

    let stored = contact::Entity::find_by_id(2)
        .one(&ctx.db)
        .await
        .expect("query")
        .expect("row");
    assert_eq!(stored.name, "Ben");
    assert_eq!(stored.source_updated_at.timestamp(), 1_704_844_800);
    assert!(!stored.fingerprint.is_empty());
    assert!(stored.raw.contains("\"name\":\"Ben\""));

    // Same payloads again: every fingerprint matches, nothing is rewritten.
    register_full_contact_pages(&mock, &pages);
    let rerun = run_entity(&ctx, EntityKind::Contacts, true).await.expect("rerun");
    assert_eq!(rerun.processed, 4);
    assert_eq!(rerun.written, 0);
    assert_eq!(rerun.unchanged, 4);
}

#[tokio::test]
async fn stored_raw_is_the_verbatim_wire_payload() {
    let mock = MockTransport::new();
    // Hand-written body: key order, spacing, and `1.10` must survive into the
    // mirror untouched.
    let page = br#"{"_embedded":{"contacts":[{"id": 1, "name": "Ada", "price": 1.10, "updated_at": 1704844700}]}}"#;
    mock.push_response(
        HttpMethod::Get,
        format!("{BASE}/contacts?with=leads,companies,tags&limit=2&page=1"),
        HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: page.to_vec(),
        },
    );
    mock.push_response(
        HttpMethod::Get,
        format!("{BASE}/contacts?with=leads,companies,tags&limit=2&page=2"),
        no_content(),
    );

    let ctx = ctx_with(&mock, 2).await;
    run_entity(&ctx, EntityKind::Contacts, true).await.expect("run");

    let stored = contact::Entity::find_by_id(1)
        .one(&ctx.db)
        .await
        .expect("query")
        .expect("row");
    assert_eq!(
        stored.raw,
        r#"{"id": 1, "name": "Ada", "price": 1.10, "updated_at": 1704844700}"#
    );
}

#[tokio::test]
async fn changed_contact_payload_replaces_the_stored_row() {
    let mock = MockTransport::new();
    register_full_contact_pages(
        &mock,
        &[json!([contact_item(1, "Ada", 1_704_844_700)]), json!([])],
    );

    let ctx = ctx_with(&mock, 2).await;
    run_entity(&ctx, EntityKind::Contacts, true).await.expect("seed run");

    register_full_contact_pages(
        &mock,
        &[json!([contact_item(1, "Ada Lovelace", 1_704_844_900)]), json!([])],
    );
    let report = run_entity(&ctx, EntityKind::Contacts, true).await.expect("second run");
    assert_eq!(report.written, 1);
    assert_eq!(report.unchanged, 0);

    let stored = contact::Entity::find_by_id(1)
        .one(&ctx.db)
        .await
        .expect("query")
        .expect("row");
    assert_eq!(stored.name, "Ada Lovelace");
    assert_eq!(stored.source_updated_at.timestamp(), 1_704_844_900);
}

#[tokio::test]
async fn incremental_contact_sync_rewinds_the_watermark_five_minutes() {
    let mock = MockTransport::new();
    register_full_contact_pages(
        &mock,
        &[json!([contact_item(1, "Ada", 1_704_844_800)]), json!([])],
    );

    let ctx = ctx_with(&mock, 2).await;
    run_entity(&ctx, EntityKind::Contacts, true).await.expect("seed run");

    // Watermark 1_704_844_800 minus the 300s overlap.
    let url = format!(
        "{BASE}/contacts?filter[updated_at][from]=1704844500&with=leads,companies,tags&limit=2&page=1"
    );
    mock.push_response(HttpMethod::Get, url.clone(), no_content());

    let report = run_entity(&ctx, EntityKind::Contacts, false).await.expect("incremental");
    assert_eq!(report.processed, 0);
    let requests = mock.requests();
    assert_eq!(requests.last().map(|r| r.url.as_str()), Some(url.as_str()));
}

#[tokio::test]
async fn empty_mirror_runs_a_full_contact_fetch() {
    let mock = MockTransport::new();
    register_full_contact_pages(&mock, &[json!([])]);

    let ctx = ctx_with(&mock, 2).await;
    // full_sync = false, but with no rows there is no watermark to resume from.
    let report = run_entity(&ctx, EntityKind::Contacts, false).await.expect("run");
    assert_eq!(report.processed, 0);
    let requests = mock.requests();
    assert!(requests[0].url.starts_with(&format!("{BASE}/contacts?with=")));
}

#[tokio::test]
async fn event_sync_resumes_one_second_behind_and_keeps_the_last_duplicate() {
    let mock = MockTransport::new();
    let ctx = ctx_with(&mock, 2).await;

    let seeded_at = Utc.timestamp_opt(1_704_844_800, 0).single().expect("timestamp");
    crmsync::store::events::bulk_upsert(
        &ctx.db,
        vec![event::Model {
            id: "seed-1".to_string(),
            event_type: "lead_added".to_string(),
            entity_id: 40,
            entity_type: "lead".to_string(),
            created_by: 11,
            value_before: None,
            value_after: None,
            raw: "{}".to_string(),
            fingerprint: "f".to_string(),
            event_at: seeded_at,
            checked_at: seeded_at,
        }],
        100,
    )
    .await
    .expect("seed event");

    let endpoint = format!(
        "events?filter[created_at][from]=1704844799&filter[type]={EVENT_TYPES}&order[created_at]=asc"
    );
    // The overlap repeats the boundary entry; the later occurrence wins.
    mock.push_response(
        HttpMethod::Get,
        format!("{BASE}/{endpoint}&limit=2&page=1"),
        ok(json!({ "_embedded": { "events": [
            {
                "id": "200-2",
                "type": "lead_status_changed",
                "entity_id": 41,
                "entity_type": "lead",
                "created_by": 11,
                "created_at": 1_704_844_900,
            },
            {
                "id": "200-2",
                "type": "lead_status_changed",
                "entity_id": 42,
                "entity_type": "lead",
                "created_by": 12,
                "created_at": 1_704_844_900,
            },
        ] } })),
    );
    mock.push_response(
        HttpMethod::Get,
        format!("{BASE}/{endpoint}&limit=2&page=2"),
        no_content(),
    );

    let report = run_entity(&ctx, EntityKind::Events, false).await.expect("run");
    assert_eq!(report.processed, 2);
    assert_eq!(report.written, 1);

    let rows = event::Entity::find().all(&ctx.db).await.expect("query");
    assert_eq!(rows.len(), 2);
    let merged = event::Entity::find_by_id("200-2")
        .one(&ctx.db)
        .await
        .expect("query")
        .expect("row");
    assert_eq!(merged.entity_id, 42);
    assert_eq!(merged.created_by, 12);
}

#[tokio::test]
async fn message_sync_extracts_text_from_the_chat_payload() {
    let mock = MockTransport::new();
    let ctx = ctx_with(&mock, 2).await;

    let seeded_at = Utc.timestamp_opt(1_704_844_800, 0).single().expect("timestamp");
    crmsync::store::messages::bulk_upsert(
        &ctx.db,
        vec![message::Model {
            id: "seed-1".to_string(),
            event_type: "incoming_chat_message".to_string(),
            entity_id: 7,
            chat_id: 0,
            author_id: 11,
            text: "hi".to_string(),
            raw: "{}".to_string(),
            fingerprint: "f".to_string(),
            event_at: seeded_at,
            checked_at: seeded_at,
        }],
        100,
    )
    .await
    .expect("seed message");

    let endpoint = format!(
        "events?filter[created_at][from]=1704844799\
&filter[type]=incoming_chat_message,outgoing_chat_message&order[created_at]=asc"
    );
    mock.push_response(
        HttpMethod::Get,
        format!("{BASE}/{endpoint}&limit=2&page=1"),
        ok(json!({ "_embedded": { "events": [{
            "id": "msg-02",
            "type": "outgoing_chat_message",
            "entity_id": 7,
            "created_by": 11,
            "created_at": 1_704_844_901,
            "value_after": [{"message": {"text": "on my way", "talk_id": 99}}],
        }] } })),
    );
    mock.push_response(
        HttpMethod::Get,
        format!("{BASE}/{endpoint}&limit=2&page=2"),
        no_content(),
    );

    let report = run_entity(&ctx, EntityKind::Messages, false).await.expect("run");
    assert_eq!(report.processed, 1);
    assert_eq!(report.written, 1);

    let stored = message::Entity::find_by_id("msg-02")
        .one(&ctx.db)
        .await
        .expect("query")
        .expect("row");
    assert_eq!(stored.text, "on my way");
    assert_eq!(stored.chat_id, 99);
    assert_eq!(stored.event_at.timestamp(), 1_704_844_901);
}

#[tokio::test]
async fn user_catalog_sync_writes_and_then_skips_unchanged_members() {
    let mock = MockTransport::new();
    let users = json!({ "_embedded": { "users": [
        {"id": 11, "name": "Ada", "email": "ada@example.com"},
        {"id": 12, "name": "Ben", "email": "ben@example.com"},
        {"id": "not-a-user"},
    ] } });
    mock.push_response(HttpMethod::Get, format!("{BASE}/users"), ok(users.clone()));

    let ctx = ctx_with(&mock, 2).await;
    let report = run_entity(&ctx, EntityKind::Users, false).await.expect("run");
    assert_eq!(report.processed, 3);
    assert_eq!(report.written, 2);
    assert_eq!(report.decode_errors, 1);

    let stored = user::Entity::find_by_id(11)
        .one(&ctx.db)
        .await
        .expect("query")
        .expect("row");
    assert_eq!(stored.email, "ada@example.com");

    mock.push_response(HttpMethod::Get, format!("{BASE}/users"), ok(users));
    let rerun = run_entity(&ctx, EntityKind::Users, false).await.expect("rerun");
    assert_eq!(rerun.written, 0);
    assert_eq!(rerun.unchanged, 2);
}

#[tokio::test]
async fn forbidden_response_aborts_the_run_with_an_authorization_error() {
    let mock = MockTransport::new();
    mock.push_response(
        HttpMethod::Get,
        format!("{BASE}/contacts?with=leads,companies,tags&limit=2&page=1"),
        HttpResponse {
            status: 403,
            headers: Vec::new(),
            body: b"{\"detail\":\"bad credentials\"}".to_vec(),
        },
    );

    let ctx = ctx_with(&mock, 2).await;
    let err = run_entity(&ctx, EntityKind::Contacts, true).await.expect_err("forbidden");
    match err {
        SyncError::Authorization { message } => assert!(message.contains("bad credentials")),
        other => panic!("unexpected error: {other:?}"),
    }

    let rows = contact::Entity::find().all(&ctx.db).await.expect("query");
    assert!(rows.is_empty());
}

#[tokio::test]
async fn cancellation_keeps_what_was_already_flushed() {
    let mock = MockTransport::new();
    register_full_contact_pages(
        &mock,
        &[json!([contact_item(1, "Ada", 1_704_844_700), contact_item(2, "Ben", 1_704_844_800)])],
    );

    let ctx = ctx_with(&mock, 2).await;
    // Cancel before the run: the stream yields nothing, and the run still
    // completes cleanly instead of erroring.
    ctx.cancel.cancel();
    let report = run_entity(&ctx, EntityKind::Contacts, true).await.expect("run");
    assert_eq!(report.processed, 0);
    assert!(mock.requests().is_empty());
}
