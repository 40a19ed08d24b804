//! Walk-through of a dashboard session against the in-memory backend.
//!
//! Run with: `cargo run --example dashboard`
//!
//! Set `RUST_LOG=notification_feed=debug` to see per-snapshot logging.

use std::sync::Arc;
use std::time::Duration;

use notification_feed::{
    AmountForm, AuthUser, BackendError, Dashboard, DashboardConfig, Fields, InMemoryBackend,
    Navigator, NotificationCue,
};
use serde_json::{Value, json};

/// Prints a bell instead of playing a sound.
struct ConsoleCue;

impl NotificationCue for ConsoleCue {
    fn play(&self) {
        println!("  * ding *");
    }
}

struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn redirect_to_login(&self) {
        println!("  -> redirect to login");
    }
}

fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        _ => Fields::new(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("notification_feed=info")),
        )
        .init();

    let backend = Arc::new(InMemoryBackend::new());
    for (created, page) in [
        ("2026-10-16T08:00:00Z", "checkout"),
        ("2026-10-16T09:00:00Z", "landing"),
        ("2026-10-16T09:30:00Z", "checkout"),
    ] {
        backend
            .add("pays", fields(json!({ "createdDate": created, "page": page })))
            .await;
    }

    let config = DashboardConfig {
        ack_duration: Duration::from_millis(500),
        ..DashboardConfig::default()
    };
    let dashboard = Dashboard::builder(backend.clone())
        .config(config)
        .cue(Arc::new(ConsoleCue))
        .navigator(Arc::new(ConsoleNavigator))
        .build();

    println!("starting signed out");
    let session = dashboard.start_session().await;

    println!("signing in");
    let mut feed = dashboard.feed().subscribe();
    backend.sign_in(AuthUser::new("operator"));
    feed.wait_for(|s| s.generation >= 1).await?;
    print_feed(&dashboard);

    let newest = dashboard
        .feed()
        .visible()
        .first()
        .map(|r| r.id.clone())
        .unwrap_or_default();
    println!("approving {newest}");
    dashboard.approval().approve(&newest).await?;
    println!("  banner: {:?}", dashboard.banner().current());

    println!("hiding {newest}");
    dashboard.hide().hide(&newest).await?;
    print_feed(&dashboard);

    println!("saving amounts 1,250.500 / 300");
    let saved = dashboard
        .amounts()
        .save(&AmountForm::new("1,250.500", "300"))
        .await?;
    println!("  stored: {saved:?}");

    println!("saving a bad amount");
    if let Err(e) = dashboard.amounts().save(&AmountForm::new("abc", "1")).await {
        println!("  rejected: {e}");
    }

    println!("bulk hide with an injected failure");
    backend
        .fail_next_commit_at(1, BackendError::Aborted("demo".into()))
        .await;
    if let Err(e) = dashboard.hide().hide_all().await {
        println!("  failed: {e}");
    }
    print_feed(&dashboard);

    println!("bulk hide");
    let hidden = dashboard.hide().hide_all().await?;
    println!("  hid {hidden}");
    print_feed(&dashboard);

    println!("signing out");
    session.sign_out().await?;
    session.shutdown().await;
    Ok(())
}

fn print_feed(dashboard: &Dashboard) {
    let records = dashboard.feed().visible();
    if records.is_empty() {
        println!("  (feed empty)");
    }
    for record in records {
        println!(
            "  {} {} {:?} {}",
            record.created_date,
            record.id,
            record.status,
            record.payload_field("page").unwrap_or(&Value::Null)
        );
    }
}
