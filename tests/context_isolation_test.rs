//! Context Isolation Tests
//!
//! Concurrent tasks each see only the context they were scoped with.

use std::time::Duration;
use tsunagi::context::{self, PropagationContext, TraceContext};
use tsunagi::telemetry::{SpanFactory, SpanKind};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tasks_keep_their_own_context() {
    let mut handles = Vec::new();

    for i in 0..16u64 {
        let cx = PropagationContext::root().with_trace(TraceContext::new_root(true));
        let expected = cx.trace().map(|t| t.trace_id);

        handles.push(tokio::spawn(context::scope(cx, async move {
            for _ in 0..5 {
                tokio::time::sleep(Duration::from_millis(i % 3)).await;
                tokio::task::yield_now().await;
                assert_eq!(context::current().trace().map(|t| t.trace_id), expected);
            }
        })));
    }

    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn test_spawned_task_does_not_inherit_context() {
    let cx = PropagationContext::root().with_trace(TraceContext::new_root(true));

    let inner = context::scope(cx, async { tokio::spawn(async { context::current() }).await.unwrap() }).await;

    assert!(inner.trace().is_none());
}

#[tokio::test]
async fn test_scope_ends_with_future() {
    let factory = SpanFactory::default();
    let span = factory.start(SpanKind::Internal, "work", &context::current());
    let cx = span.propagation_context(&context::current());

    context::scope(cx.clone(), async {
        assert_eq!(context::current(), cx);
    })
    .await;

    assert!(context::current().trace().is_none());
}
