use shqueue::Builder;
use std::thread;
use std::time::Instant;

fn main() {
    println!("shqueue Private Queue Example");
    println!("=============================\n");

    const ITEMS: u64 = 1_000_000;
    const PAYLOAD: &[u8] = b"shqueue-payload";

    let queue = Builder::create_private(1 << 16)
        .with_metadata_init(|md| md[..4].copy_from_slice(b"demo"))
        .into_queue()
        .expect("create private queue");

    println!("capacity: {} bytes, metadata: {:?}", queue.capacity(), &queue.metadata()[..4]);

    let (producer, consumer) = queue.into_split();
    let start = Instant::now();

    let producer_handle = thread::spawn(move || {
        let mut sent = 0u64;
        while sent < ITEMS {
            if producer.push(PAYLOAD) {
                sent += 1;
            } else {
                thread::yield_now();
            }
        }
        println!("producer finished");
    });

    let mut received = 0u64;
    while received < ITEMS {
        if let Some(chunk) = consumer.peek(PAYLOAD.len()) {
            debug_assert_eq!(chunk, PAYLOAD);
            consumer.pop(PAYLOAD.len());
            received += 1;
        } else {
            thread::yield_now();
        }
    }

    producer_handle.join().unwrap();
    let elapsed = start.elapsed();
    println!("exchanged {ITEMS} messages in {elapsed:?}");
    println!("metrics: {:?}", consumer.metrics().snapshot());
}
