use shqueue::{Builder, OpenRetry};
use std::time::Duration;

/// Demonstrates the named-shared lifecycle in a single process: one builder
/// plays the creator, a second plays an opener racing the publish. Run two
/// copies of this example concurrently against separate processes to see
/// the real cross-process case; this binary only exercises the API shape.
fn main() {
    println!("shqueue Named Shared Queue Example");
    println!("===================================\n");

    let name = format!("/shqueue-example-{}", std::process::id());

    let mut creator = Builder::create_shared(&name, 1 << 16).with_sync(true);
    let queue = creator.get().expect("create shared queue");
    println!("created {name:?}, capacity {} bytes", queue.capacity());
    assert!(queue.push(b"hello from the creator"));

    let mut opener = Builder::open_shared(&name).with_open_retry(
        OpenRetry::default().with_max_attempts(10).with_sleep(Duration::from_millis(5)),
    );
    let opened = opener.get().expect("open shared queue");
    let bytes = opened.peek(22).expect("creator already pushed 22 bytes");
    println!("opener sees: {:?}", String::from_utf8_lossy(bytes));
    opened.pop(22);

    drop(opener);
    drop(creator);
    println!("creator dropped: can_get({name:?}) = {}", shqueue::can_get(&name));
}
