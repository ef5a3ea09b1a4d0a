//! End-to-end tests driving the engine against the in-memory store.

use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use uuid::Uuid;

use nexstream_client::ledger::CounterField;
use nexstream_client::{
    spawn_engine, EngineConfig, EngineError, EngineHandle, EngineNotification, IdentityProvider,
    Projection, View, ViewKind, ViewParams,
};
use nexstream_shared::constants::NOTIFICATION_CHANNEL_CAPACITY;
use nexstream_store::{
    spawn_store, Document, StoreCommand, StoreEvent, VideoDraft, VideoRecord,
};

struct TestClient {
    handle: EngineHandle,
    notifications: mpsc::Receiver<EngineNotification>,
    identity: IdentityProvider,
    store: mpsc::Sender<StoreCommand>,
    /// Clone of the engine's store event channel, for forging events.
    events: mpsc::Sender<StoreEvent>,
}

fn start_client() -> TestClient {
    let (event_tx, event_rx) = mpsc::channel(NOTIFICATION_CHANNEL_CAPACITY);
    let store = spawn_store(event_tx.clone());
    let identity = IdentityProvider::new();
    let (handle, notifications) = spawn_engine(
        store.clone(),
        event_rx,
        identity.subscribe(),
        EngineConfig::default(),
    );
    TestClient {
        handle,
        notifications,
        identity,
        store,
        events: event_tx,
    }
}

fn draft(title: &str) -> VideoDraft {
    VideoDraft {
        title: title.to_string(),
        description: String::new(),
        url: format!("https://example.com/{title}.mp4"),
        thumbnail: String::new(),
    }
}

async fn open_subscriptions(store: &mpsc::Sender<StoreCommand>) -> usize {
    let (tx, rx) = oneshot::channel();
    store
        .send(StoreCommand::SubscriptionCount(tx))
        .await
        .expect("store alive");
    rx.await.expect("store replies")
}

async fn wait_for_subscriptions(store: &mpsc::Sender<StoreCommand>, expected: usize) {
    for _ in 0..200 {
        if open_subscriptions(store).await == expected {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "open subscriptions never reached {expected}, still {}",
        open_subscriptions(store).await
    );
}

async fn wait_for_projection(
    handle: &EngineHandle,
    check: impl Fn(&Projection) -> bool,
) -> Projection {
    for _ in 0..200 {
        let projection = handle.current_projection().await.expect("engine alive");
        if check(&projection) {
            return projection;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("projection never reached the expected state");
}

/// Upload a video and wait until the home feed shows it.
async fn upload_and_wait(client: &TestClient, title: &str) -> VideoRecord {
    let id = client
        .handle
        .upload_video(draft(title))
        .await
        .expect("upload succeeds");
    let projection = wait_for_projection(&client.handle, |p| {
        p.videos().iter().any(|v| v.id == id)
    })
    .await;
    projection
        .videos()
        .iter()
        .find(|v| v.id == id)
        .cloned()
        .expect("video present")
}

#[tokio::test]
async fn open_streams_always_match_the_active_view() {
    let client = start_client();
    client.identity.sign_in_anonymous();

    // Home opens the recent feed.
    wait_for_subscriptions(&client.store, 1).await;

    let video = upload_and_wait(&client, "one").await;

    // Watch keeps the feed and adds the comments stream.
    client.handle.watch(video.clone()).await.unwrap();
    wait_for_subscriptions(&client.store, 2).await;

    // Trending swaps both for the trending feed.
    client
        .handle
        .navigate(ViewKind::Trending, ViewParams::default())
        .await
        .unwrap();
    wait_for_subscriptions(&client.store, 1).await;

    // Upload and History need no remote stream.
    client
        .handle
        .navigate(ViewKind::Upload, ViewParams::default())
        .await
        .unwrap();
    wait_for_subscriptions(&client.store, 0).await;

    client
        .handle
        .navigate(ViewKind::History, ViewParams::default())
        .await
        .unwrap();
    wait_for_subscriptions(&client.store, 0).await;

    // Channel opens the uploader's feed.
    client
        .handle
        .navigate(
            ViewKind::Channel,
            ViewParams {
                channel_id: Some(video.uploader_id.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    wait_for_subscriptions(&client.store, 1).await;
}

#[tokio::test]
async fn invalid_navigation_keeps_the_previous_view() {
    let client = start_client();
    client.identity.sign_in_anonymous();

    let err = client
        .handle
        .navigate(ViewKind::Watch, ViewParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)));
    assert_eq!(client.handle.current_view().await.unwrap(), View::Home);
}

#[tokio::test]
async fn snapshot_for_a_cancelled_stream_is_a_no_op() {
    let client = start_client();
    client.identity.sign_in_anonymous();
    wait_for_subscriptions(&client.store, 1).await;

    // Leave Home: the feed subscription (id 1) is cancelled.
    client
        .handle
        .navigate(ViewKind::Upload, ViewParams::default())
        .await
        .unwrap();
    wait_for_subscriptions(&client.store, 0).await;
    let before = client.handle.current_projection().await.unwrap();

    // A snapshot racing its own cancellation arrives anyway.
    let mut forged = Document::new();
    forged.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
    forged.insert("title".to_string(), json!("ghost"));
    client
        .events
        .send(StoreEvent::Snapshot {
            subscription: 1,
            documents: vec![forged],
        })
        .await
        .unwrap();
    sleep(Duration::from_millis(30)).await;

    let after = client.handle.current_projection().await.unwrap();
    assert_eq!(before, after);
    assert!(after.videos().is_empty());
}

#[tokio::test]
async fn optimistic_like_shows_immediately_and_confirms_without_flicker() {
    let client = start_client();
    client.identity.sign_in_anonymous();
    let video = upload_and_wait(&client, "likeable").await;
    assert_eq!(video.likes, 0);

    let visible = client
        .handle
        .apply_local(video.id, CounterField::Likes, 1)
        .await
        .unwrap();
    assert_eq!(visible, 1);

    // Read-your-writes before any confirmation.
    let projection = client.handle.current_projection().await.unwrap();
    let shown = projection.videos().iter().find(|v| v.id == video.id).unwrap();
    assert_eq!(shown.likes, 1);

    // After the confirming snapshot lands the value must not jump: a
    // stale pending entry would double to 2, a lost one would revert to 0.
    sleep(Duration::from_millis(60)).await;
    let projection = client.handle.current_projection().await.unwrap();
    let shown = projection.videos().iter().find(|v| v.id == video.id).unwrap();
    assert_eq!(shown.likes, 1);
}

#[tokio::test]
async fn failed_increment_rolls_back_and_notifies() {
    let mut client = start_client();
    client.identity.sign_in_anonymous();
    wait_for_subscriptions(&client.store, 1).await;

    let missing = Uuid::new_v4();
    let visible = client
        .handle
        .apply_local(missing, CounterField::Likes, 1)
        .await
        .unwrap();
    assert_eq!(visible, 1);

    // The store rejects the increment (no such record); the engine rolls
    // the optimistic entry back and reports the failure.
    loop {
        match client.notifications.recv().await.expect("engine alive") {
            EngineNotification::WriteFailed { entity, field, .. } => {
                assert_eq!(entity, missing);
                assert_eq!(field, CounterField::Likes);
                break;
            }
            _ => continue,
        }
    }
}

#[tokio::test]
async fn upload_then_search_filters_by_title() {
    let client = start_client();
    client.identity.sign_in_anonymous();
    upload_and_wait(&client, "Intro to Rust").await;
    upload_and_wait(&client, "Holiday vlog").await;

    client.handle.search("rust").await.unwrap();
    let projection = client.handle.current_projection().await.unwrap();
    assert_eq!(projection.videos().len(), 1);
    assert_eq!(projection.videos()[0].title, "Intro to Rust");

    client.handle.search("python").await.unwrap();
    let projection = client.handle.current_projection().await.unwrap();
    assert!(projection.videos().is_empty());
}

#[tokio::test]
async fn watching_bumps_views_and_records_history_once() {
    let client = start_client();
    client.identity.sign_in_anonymous();
    let video = upload_and_wait(&client, "rewatchable").await;

    client.handle.watch(video.clone()).await.unwrap();
    let projection = client.handle.current_projection().await.unwrap();
    match &projection {
        Projection::Watch { video: shown, .. } => assert_eq!(shown.views, 1),
        _ => panic!("expected watch projection"),
    }

    // Re-watch from the (now confirmed) feed copy.
    client
        .handle
        .navigate(ViewKind::Home, ViewParams::default())
        .await
        .unwrap();
    let fresh = wait_for_projection(&client.handle, |p| {
        p.videos().iter().any(|v| v.id == video.id && v.views == 1)
    })
    .await
    .videos()
    .iter()
    .find(|v| v.id == video.id)
    .cloned()
    .unwrap();
    client.handle.watch(fresh).await.unwrap();

    client
        .handle
        .navigate(ViewKind::History, ViewParams::default())
        .await
        .unwrap();
    let projection = client.handle.current_projection().await.unwrap();
    assert_eq!(projection.videos().len(), 1, "history must deduplicate");
    assert_eq!(projection.videos()[0].id, video.id);
}

#[tokio::test]
async fn comments_require_identity_and_appear_on_the_watch_page() {
    let client = start_client();

    let err = client
        .handle
        .submit_comment(Uuid::new_v4(), "first")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::IdentityRequired));

    let err = client.handle.upload_video(draft("nope")).await.unwrap_err();
    assert!(matches!(err, EngineError::IdentityRequired));

    client.identity.sign_in_anonymous();
    let video = upload_and_wait(&client, "commented").await;
    client.handle.watch(video.clone()).await.unwrap();

    let err = client
        .handle
        .submit_comment(video.id, "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)));

    client
        .handle
        .submit_comment(video.id, "Great intro!")
        .await
        .unwrap();
    let projection =
        wait_for_projection(&client.handle, |p| p.comments().len() == 1).await;
    assert_eq!(projection.comments()[0].text, "Great intro!");
    assert_eq!(projection.comments()[0].video_id, video.id);
}

#[tokio::test]
async fn sign_out_tears_streams_down_and_sign_in_restores_them() {
    let client = start_client();
    client.identity.sign_in_anonymous();
    wait_for_subscriptions(&client.store, 1).await;

    client.identity.sign_out();
    wait_for_subscriptions(&client.store, 0).await;

    // No re-navigation: the deferred stream reopens on its own.
    client.identity.sign_in_anonymous();
    wait_for_subscriptions(&client.store, 1).await;
}

#[tokio::test]
async fn rapid_navigation_settles_on_the_final_view() {
    let client = start_client();
    client.identity.sign_in_anonymous();
    let video = upload_and_wait(&client, "raced").await;

    // Home -> Watch -> Home with no pauses: the comments stream opened in
    // between must end up closed, the feed still live.
    client.handle.watch(video.clone()).await.unwrap();
    client
        .handle
        .navigate(ViewKind::Home, ViewParams::default())
        .await
        .unwrap();

    wait_for_subscriptions(&client.store, 1).await;
    let projection = wait_for_projection(&client.handle, |p| !p.videos().is_empty()).await;
    assert!(projection.videos().iter().any(|v| v.id == video.id));
}

#[tokio::test]
async fn category_pill_filters_home_without_touching_streams() {
    let client = start_client();
    client.identity.sign_in_anonymous();
    for i in 0..3 {
        upload_and_wait(&client, &format!("video {i}")).await;
    }
    wait_for_subscriptions(&client.store, 1).await;

    client
        .handle
        .set_category(Some("gaming".to_string()))
        .await
        .unwrap();
    let projection = client.handle.current_projection().await.unwrap();
    assert_eq!(projection.videos().len(), 2);
    assert_eq!(open_subscriptions(&client.store).await, 1);

    client.handle.set_category(None).await.unwrap();
    let projection = client.handle.current_projection().await.unwrap();
    assert_eq!(projection.videos().len(), 3);
}
