//! 上下文与地址工具测试

use std::time::Duration;

use flare_bootstrap::Context;
use flare_bootstrap::utils::{bind_address, dial_target, port_of};
use tokio_test::{assert_pending, assert_ready, task};

#[tokio::test]
async fn done_resolves_on_cancel() {
    let ctx = Context::background();
    let mut done = task::spawn(ctx.done());
    assert_pending!(done.poll());

    ctx.cancel();
    assert!(done.is_woken());
    assert_ready!(done.poll());
    assert!(ctx.is_done());
}

#[tokio::test]
async fn child_follows_parent_but_not_the_reverse() {
    let parent = Context::background();
    let child = parent.child();

    child.cancel();
    assert!(child.is_cancelled());
    assert!(!parent.is_cancelled());

    let second = parent.child();
    parent.cancel();
    assert!(second.is_cancelled());
}

#[tokio::test(start_paused = true)]
async fn timeout_context_expires_without_cancellation() {
    let ctx = Context::with_timeout(Duration::from_secs(2));
    assert_eq!(ctx.remaining(), Some(Duration::from_secs(2)));
    assert!(!ctx.is_done());

    ctx.done().await;
    assert!(ctx.is_done());
    assert!(!ctx.is_cancelled());
    assert_eq!(ctx.remaining(), Some(Duration::ZERO));
}

#[tokio::test(start_paused = true)]
async fn child_inherits_deadline() {
    let ctx = Context::with_timeout(Duration::from_secs(5));
    let child = ctx.child();
    assert_eq!(child.deadline(), ctx.deadline());
    assert!(Context::background().remaining().is_none());
}

#[test]
fn wildcard_addresses_are_normalized() {
    assert_eq!(bind_address(":9090"), "0.0.0.0:9090");
    assert_eq!(bind_address("127.0.0.1:8080"), "127.0.0.1:8080");

    assert_eq!(dial_target(":9090"), "http://127.0.0.1:9090");
    assert_eq!(dial_target("0.0.0.0:50051"), "http://127.0.0.1:50051");
    assert_eq!(dial_target("[::]:7000"), "http://127.0.0.1:7000");
    assert_eq!(dial_target("grpc.internal:443"), "http://grpc.internal:443");

    assert_eq!(port_of(":8080"), Some(8080));
    assert_eq!(port_of("localhost"), None);
    assert_eq!(port_of("host:http"), None);
}
