//! Writes a record, waits for it to be published, then reads it back.
//!
//! Set `SEARCH_APP_ID` and `SEARCH_API_KEY` to point at a real application.
//!
//! Run with: `cargo run --example write_then_read`

use http::Method;
use searchwire::{Client, Error, RequestContext, WaitOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
struct Product {
    name: String,
    price: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("searchwire=debug,write_then_read=info")
        .init();

    let app_id = std::env::var("SEARCH_APP_ID")?;
    let api_key = std::env::var("SEARCH_API_KEY")?;

    let client = Client::builder()
        .application_id(&app_id)
        .default_header("X-Algolia-Application-Id", &app_id)?
        .default_header("X-Algolia-API-Key", &api_key)?
        .read_timeout(Duration::from_secs(2))
        .build()?;

    let product = Product {
        name: "Trail shoes".to_string(),
        price: 89.0,
    };

    println!("=== Write ===");
    let ack = client
        .call(RequestContext::write(Method::PUT, "/1/indexes/products/trail-shoes").with_json(&product)?)
        .await?;
    println!("Accepted by {} after {} attempt(s)", ack.host, ack.attempts);

    let Some(task_id) = ack.task_id() else {
        println!("No task id in the acknowledgement: {}", ack.body);
        return Ok(());
    };

    println!("=== Wait for task {} ===", task_id);
    match client
        .wait_task(
            "products",
            task_id,
            WaitOptions::new().with_timeout(Duration::from_secs(30)),
        )
        .await
    {
        Ok(()) => println!("Task published"),
        Err(Error::TaskTimeout { elapsed, polls, .. }) => {
            println!("Still pending after {:?} and {} polls", elapsed, polls);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    println!("=== Read back ===");
    let stored = client.get::<Product>("/1/indexes/products/trail-shoes").await?;
    println!("{:?} (served by {} in {:?})", stored.data, stored.host, stored.latency);

    println!("=== Host health ===");
    for host in client.registry().hosts() {
        println!("{:<32} healthy={}", host.address, host.healthy);
    }

    Ok(())
}
