//! Blocking use from plain threads, with a host list that starts with a
//! dead host so the first call fails over.
//!
//! Run with: `cargo run --example blocking_failover`

use http::Method;
use searchwire::{Client, Error, Host, RequestContext};
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("searchwire=debug")
        .init();

    let app_id = std::env::var("SEARCH_APP_ID").unwrap_or_else(|_| "latency".to_string());

    // Nothing listens on port 9, so the first read attempt is refused.
    let client = Client::builder()
        .hosts(vec![
            Host::read("127.0.0.1:9", 0),
            Host::read(format!("{}-dsn.algolia.net", app_id), 1),
            Host::write(format!("{}.algolia.net", app_id), 0),
        ])
        .connect_timeout(Duration::from_millis(500))
        .worker_threads(2)
        .default_header("X-Algolia-Application-Id", &app_id)?
        .build()?;

    let workers: Vec<_> = (0..3)
        .map(|i| {
            let client = client.clone();
            thread::spawn(move || {
                let context = RequestContext::read(Method::GET, "/1/indexes");
                match client.call_blocking(context) {
                    Ok(response) => println!(
                        "thread {}: {} from {} after {} attempt(s)",
                        i, response.status, response.host, response.attempts
                    ),
                    Err(e) if e.is_fatal() => println!("thread {}: rejected: {}", i, e),
                    Err(e) => println!("thread {}: failed: {}", i, e),
                }
            })
        })
        .collect();

    for worker in workers {
        let _ = worker.join();
    }

    for host in client.registry().hosts() {
        println!("{:<32} healthy={}", host.address, host.healthy);
    }

    Ok(())
}
