//! Terminal walkthrough of a NexStream session: sign in, upload a video,
//! browse the feed, watch, comment, search.

use nexstream_client::{init_tracing, Client, EngineConfig, Projection};
use nexstream_shared::constants::APP_NAME;
use nexstream_store::VideoDraft;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    println!("{APP_NAME} demo session");

    let mut client = Client::start(EngineConfig::default());
    client.identity.sign_in_anonymous();

    let video_id = client
        .handle
        .upload_video(VideoDraft {
            title: "Intro to Rust".into(),
            description: "Ownership, borrowing, lifetimes.".into(),
            url: "https://example.com/intro-to-rust.mp4".into(),
            thumbnail: String::new(),
        })
        .await?;
    println!("uploaded video {video_id}");

    // Wait for the feed snapshot carrying the upload.
    let video = loop {
        client.notifications.recv().await;
        let projection = client.handle.current_projection().await?;
        if let Some(video) = projection.videos().iter().find(|v| v.id == video_id) {
            break video.clone();
        }
    };
    println!("feed shows: {}", video.title);

    client.handle.watch(video.clone()).await?;
    client
        .handle
        .submit_comment(video.id, "First! Great intro.")
        .await?;

    client.handle.search("rust").await?;
    match client.handle.current_projection().await? {
        Projection::Videos(videos) => {
            for v in &videos {
                println!("result: {} ({} views, {} likes)", v.title, v.views, v.likes);
            }
        }
        Projection::Watch { .. } => {}
    }

    client.handle.shutdown().await;
    Ok(())
}
