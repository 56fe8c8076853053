mod support;

use apnamanager_client::{AlertPayload, NotificationFeed, NotificationId};
use serde_json::json;
use support::{envelope, transport_for};
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_inbox(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/notifications/my"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([
            {
                "_id": "n2",
                "message": "Guest flagged at Hotel Sagar",
                "isRead": false,
                "createdAt": "2026-10-15T09:30:00Z"
            },
            {
                "_id": "n1",
                "message": "Weekly report ready",
                "isRead": true,
                "createdAt": "2026-10-14T18:00:00Z"
            }
        ]))))
        .mount(server)
        .await;
}

#[tokio::test]
async fn refresh_loads_inbox_and_counts_unread() {
    let server = MockServer::start().await;
    mount_inbox(&server).await;

    let (transport, _host) = transport_for(&server);
    let feed = NotificationFeed::new(transport);
    feed.refresh().await.unwrap();

    let items = feed.notifications();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, NotificationId("n2".into()));
    assert_eq!(feed.unread_count(), 1);
}

#[tokio::test]
async fn mark_read_is_optimistic_and_synced() {
    let server = MockServer::start().await;
    mount_inbox(&server).await;
    Mock::given(method("PUT"))
        .and(path("/api/notifications/n2/read"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!({}))))
        .expect(1)
        .mount(&server)
        .await;

    let (transport, _host) = transport_for(&server);
    let feed = NotificationFeed::new(transport);
    feed.refresh().await.unwrap();

    let id = NotificationId("n2".into());
    feed.mark_read(&id).await.unwrap();
    feed.mark_read(&id).await.unwrap();

    assert_eq!(feed.unread_count(), 0);
    assert!(feed.notifications().iter().all(|n| n.is_read));
}

#[tokio::test]
async fn failed_mark_read_keeps_local_mark() {
    let server = MockServer::start().await;
    mount_inbox(&server).await;
    Mock::given(method("PUT"))
        .and(path("/api/notifications/n2/read"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (transport, _host) = transport_for(&server);
    let feed = NotificationFeed::new(transport);
    feed.refresh().await.unwrap();

    let err = feed.mark_read(&NotificationId("n2".into())).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(feed.unread_count(), 0);
}

#[tokio::test]
async fn realtime_alert_is_local_until_refresh() {
    let server = MockServer::start().await;
    mount_inbox(&server).await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/api/notifications/.+/read$"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (transport, _host) = transport_for(&server);
    let feed = NotificationFeed::new(transport);

    let id = feed.apply_alert(AlertPayload {
        message: "Guest flagged at Hotel Sagar".into(),
    });
    assert!(id.is_local());
    assert_eq!(feed.unread_count(), 1);
    assert_eq!(feed.notifications()[0].id, id);

    feed.mark_read(&id).await.unwrap();
    assert_eq!(feed.unread_count(), 0);

    feed.refresh().await.unwrap();
    assert!(feed.notifications().iter().all(|n| !n.id.is_local()));
    assert_eq!(feed.unread_count(), 1);
}
