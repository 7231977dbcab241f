//! 测试辅助工具

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::sleep;

pub struct TestEnv;

impl TestEnv {
    /// 在超时时间内轮询等待条件成立
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }

        false
    }

    /// 与运行时 ShutdownManager 相同容量的停止信号通道
    pub fn shutdown_channel() -> (broadcast::Sender<()>, broadcast::Receiver<()>) {
        broadcast::channel(16)
    }
}
