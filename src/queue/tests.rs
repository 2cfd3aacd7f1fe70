//! Tests for the in-memory queue's delivery semantics.

use std::time::Duration;

use rstest::rstest;
use tokio::time::advance;

use super::*;

const VISIBILITY: Duration = Duration::from_secs(30);

async fn enqueue_all(queue: &MemoryQueue, bodies: &[&str]) -> Vec<MessageId> {
    let mut ids = Vec::with_capacity(bodies.len());
    for body in bodies {
        let id = queue
            .enqueue(body.as_bytes())
            .await
            .unwrap_or_else(|err| panic!("enqueue {body}: {err}"));
        ids.push(id);
    }
    ids
}

async fn receive_now(queue: &MemoryQueue, max: u32) -> Vec<ReceivedMessage> {
    queue
        .receive(max, Duration::ZERO)
        .await
        .unwrap_or_else(|err| panic!("receive: {err}"))
}

#[tokio::test(start_paused = true)]
async fn received_message_is_hidden_until_visibility_expires() {
    let queue = MemoryQueue::new(VISIBILITY);
    let ids = enqueue_all(&queue, &["one"]).await;

    let first = receive_now(&queue, 5).await;
    assert_eq!(first.len(), 1);
    assert_eq!(first.first().map(|m| &m.message_id), ids.first());
    assert_eq!(first.first().map(|m| m.receive_count), Some(1));
    assert!(receive_now(&queue, 5).await.is_empty());
    assert_eq!(queue.visible_len(), 0);
    assert_eq!(queue.len(), 1);

    advance(VISIBILITY).await;

    let second = receive_now(&queue, 5).await;
    assert_eq!(second.len(), 1);
    assert_eq!(second.first().map(|m| m.receive_count), Some(2));
    assert_ne!(
        second.first().map(|m| &m.handle),
        first.first().map(|m| &m.handle),
        "each delivery issues a fresh handle"
    );
}

#[tokio::test(start_paused = true)]
async fn delete_removes_message_permanently() {
    let queue = MemoryQueue::new(VISIBILITY);
    enqueue_all(&queue, &["one"]).await;

    let batch = receive_now(&queue, 1).await;
    let message = batch.first().expect("one message");
    queue.delete(&message.handle).await.expect("delete");

    advance(VISIBILITY * 2).await;
    assert!(receive_now(&queue, 1).await.is_empty());
    assert!(queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn delete_with_stale_or_unknown_handle_is_a_no_op() {
    let queue = MemoryQueue::new(VISIBILITY);
    enqueue_all(&queue, &["one"]).await;

    let stale = receive_now(&queue, 1).await;
    advance(VISIBILITY).await;
    let fresh = receive_now(&queue, 1).await;

    let stale_handle = stale.first().map(|m| m.handle.clone()).expect("stale");
    queue.delete(&stale_handle).await.expect("stale delete");
    queue
        .delete(&DeleteHandle(String::from("unknown")))
        .await
        .expect("unknown delete");
    assert_eq!(queue.len(), 1);

    let fresh_handle = fresh.first().map(|m| m.handle.clone()).expect("fresh");
    queue.delete(&fresh_handle).await.expect("fresh delete");
    queue.delete(&fresh_handle).await.expect("repeat delete");
    assert!(queue.is_empty());
}

#[rstest]
#[case(1, 1)]
#[case(3, 3)]
#[case(10, 4)]
#[case(0, 1)]
#[tokio::test(start_paused = true)]
async fn receive_returns_at_most_the_requested_batch(#[case] max: u32, #[case] expected: usize) {
    let queue = MemoryQueue::new(VISIBILITY);
    enqueue_all(&queue, &["a", "b", "c", "d"]).await;

    let batch = receive_now(&queue, max).await;
    assert_eq!(batch.len(), expected);
    assert_eq!(queue.visible_len(), 4 - expected);
}

#[tokio::test(start_paused = true)]
async fn long_poll_returns_empty_batch_after_wait() {
    let queue = MemoryQueue::new(VISIBILITY);
    let started = tokio::time::Instant::now();

    let batch = queue
        .receive(5, Duration::from_secs(10))
        .await
        .expect("receive");

    assert!(batch.is_empty());
    assert!(started.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn long_poll_wakes_when_a_message_arrives() {
    let queue = MemoryQueue::new(VISIBILITY);
    let producer = queue.clone();

    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        producer.enqueue(b"late").await.expect("enqueue");
    });

    let started = tokio::time::Instant::now();
    let batch = queue
        .receive(5, Duration::from_secs(10))
        .await
        .expect("receive");
    handle.await.expect("producer task");

    assert_eq!(batch.len(), 1);
    assert_eq!(batch.first().map(|m| m.body.clone()), Some(b"late".to_vec()));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn long_poll_picks_up_redelivery_inside_wait() {
    let queue = MemoryQueue::new(Duration::from_secs(3));
    enqueue_all(&queue, &["retry"]).await;
    assert_eq!(receive_now(&queue, 1).await.len(), 1);

    let batch = queue
        .receive(1, Duration::from_secs(10))
        .await
        .expect("receive");

    assert_eq!(batch.first().map(|m| m.receive_count), Some(2));
}

#[tokio::test]
async fn arc_wrapped_queue_delegates() {
    let queue = std::sync::Arc::new(MemoryQueue::default());
    let id = queue.enqueue(b"body").await.expect("enqueue");

    let batch = queue.receive(1, Duration::ZERO).await.expect("receive");
    assert_eq!(batch.first().map(|m| &m.message_id), Some(&id));
}

#[tokio::test(start_paused = true)]
async fn unrepresentable_visibility_timeout_hides_message_without_panicking() {
    let queue = MemoryQueue::new(Duration::from_secs(u64::MAX));
    enqueue_all(&queue, &["one"]).await;

    assert_eq!(receive_now(&queue, 1).await.len(), 1);
    advance(Duration::from_secs(43_200)).await;
    assert!(receive_now(&queue, 1).await.is_empty());
    assert_eq!(queue.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unbounded_wait_returns_available_message_immediately() {
    let queue = MemoryQueue::new(VISIBILITY);
    enqueue_all(&queue, &["one"]).await;

    let batch = queue
        .receive(1, Duration::MAX)
        .await
        .unwrap_or_else(|err| panic!("receive: {err}"));

    assert_eq!(batch.len(), 1);
}
