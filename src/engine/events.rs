// ==========================================
// 插单排产系统 - 引擎层事件发布
// ==========================================
// 职责: 定义插单事件发布 trait，实现依赖倒置
// 说明: Engine 层定义 trait，订阅方通过注册通道接收不可变事件
// ==========================================

use crate::domain::scenario::ScenarioDetail;
use crate::domain::types::{JobInsertStatus, SimulationPhase, SimulationStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

// ==========================================
// 插单事件类型
// ==========================================

/// 插单事件触发类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimulationEventType {
    /// 单个作业集处理完毕
    JobProcessed,
    /// 运行结束（完成 / 取消 / 停止 / 错误）
    RunCompleted,
}

impl SimulationEventType {
    /// 转换为字符串标识
    pub fn as_str(&self) -> &str {
        match self {
            SimulationEventType::JobProcessed => "JobProcessed",
            SimulationEventType::RunCompleted => "RunCompleted",
        }
    }
}

/// 作业处理进度事件
#[derive(Debug, Clone, Serialize)]
pub struct JobProgressEvent {
    pub run_id: Uuid,
    pub label: String,
    pub phase: SimulationPhase,
    pub status: JobInsertStatus,
    pub progress_percent: f64,
}

/// 运行完成事件
///
/// 携带结果场景（可能只排入了部分作业）、摘要名称与发起人
#[derive(Debug, Clone)]
pub struct SimulationCompletedEvent {
    pub run_id: Uuid,
    pub status: SimulationStatus,
    pub scenario: Arc<ScenarioDetail>,
    /// 摘要名称: 准时 / 延期 / 失败 / 排除 计数
    pub summary_name: String,
    pub instigator: String,
    pub finished_at: DateTime<Utc>,
}

/// 插单事件
#[derive(Debug, Clone)]
pub enum SimulationEvent {
    JobProgress(JobProgressEvent),
    Completed(SimulationCompletedEvent),
}

impl SimulationEvent {
    pub fn event_type(&self) -> SimulationEventType {
        match self {
            SimulationEvent::JobProgress(_) => SimulationEventType::JobProcessed,
            SimulationEvent::Completed(_) => SimulationEventType::RunCompleted,
        }
    }

    pub fn run_id(&self) -> Uuid {
        match self {
            SimulationEvent::JobProgress(e) => e.run_id,
            SimulationEvent::Completed(e) => e.run_id,
        }
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 插单事件发布者 Trait
///
/// # 返回
/// - `Ok(n)`: 实际送达的订阅者数量
/// - `Err`: 发布失败
pub trait SimulationEventPublisher: Send + Sync {
    fn publish(&self, event: SimulationEvent) -> Result<usize, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
///
/// 用于不需要事件发布的场景（如单元测试）
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl SimulationEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: SimulationEvent) -> Result<usize, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - run_id={}, event_type={}",
            event.run_id(),
            event.event_type().as_str()
        );
        Ok(0)
    }
}

/// 通道事件发布者
///
/// 订阅方调用 `subscribe()` 注册,接收端关闭后自动注销
#[derive(Debug, Default)]
pub struct ChannelEventPublisher {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SimulationEvent>>>,
}

impl ChannelEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册订阅者
    pub fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<SimulationEvent>, Box<dyn Error + Send + Sync>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .map_err(|e| format!("锁获取失败: {}", e))?
            .push(tx);
        Ok(rx)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl SimulationEventPublisher for ChannelEventPublisher {
    fn publish(&self, event: SimulationEvent) -> Result<usize, Box<dyn Error + Send + Sync>> {
        let mut subscribers = self
            .subscribers
            .lock()
            .map_err(|e| format!("锁获取失败: {}", e))?;
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        Ok(subscribers.len())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn SimulationEventPublisher>> 的使用
#[derive(Clone)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn SimulationEventPublisher>>,
}

impl OptionalEventPublisher {
    /// 创建带发布者的实例
    pub fn with_publisher(publisher: Arc<dyn SimulationEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    /// 创建空实例（不发布事件）
    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件（如果有发布者）
    pub fn publish(&self, event: SimulationEvent) -> Result<usize, Box<dyn Error + Send + Sync>> {
        match &self.inner {
            Some(publisher) => publisher.publish(event),
            None => {
                tracing::debug!(
                    "OptionalEventPublisher: 未配置发布者，跳过事件 - run_id={}, event_type={}",
                    event.run_id(),
                    event.event_type().as_str()
                );
                Ok(0)
            }
        }
    }

    /// 检查是否配置了发布者
    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for OptionalEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionalEventPublisher")
            .field("configured", &self.is_configured())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress_event() -> SimulationEvent {
        SimulationEvent::JobProgress(JobProgressEvent {
            run_id: Uuid::new_v4(),
            label: "J1".to_string(),
            phase: SimulationPhase::OnOrBeforeNeedDate,
            status: JobInsertStatus::ScheduledOnTime,
            progress_percent: 100.0,
        })
    }

    #[test]
    fn test_noop_publisher() {
        let publisher = NoOpEventPublisher;
        let result = publisher.publish(progress_event());
        assert_eq!(result.unwrap(), 0);
    }

    #[test]
    fn test_optional_publisher_none() {
        let publisher = OptionalEventPublisher::none();
        assert!(!publisher.is_configured());
        assert!(publisher.publish(progress_event()).is_ok());
    }

    #[tokio::test]
    async fn test_channel_publisher_fans_out() {
        let publisher = ChannelEventPublisher::new();
        let mut rx1 = publisher.subscribe().unwrap();
        let mut rx2 = publisher.subscribe().unwrap();

        let event = progress_event();
        let run_id = event.run_id();
        assert_eq!(publisher.publish(event).unwrap(), 2);

        assert_eq!(rx1.recv().await.unwrap().run_id(), run_id);
        assert_eq!(rx2.recv().await.unwrap().event_type(), SimulationEventType::JobProcessed);
    }

    #[test]
    fn test_channel_publisher_drops_closed_subscribers() {
        let publisher = ChannelEventPublisher::new();
        let rx = publisher.subscribe().unwrap();
        drop(rx);
        assert_eq!(publisher.publish(progress_event()).unwrap(), 0);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_optional_publisher_with_channel() {
        let channel = Arc::new(ChannelEventPublisher::new());
        let mut rx = channel.subscribe().unwrap();
        let publisher = OptionalEventPublisher::with_publisher(channel);
        assert!(publisher.is_configured());

        publisher.publish(progress_event()).unwrap();
        assert!(rx.try_recv().is_ok());
    }
}
