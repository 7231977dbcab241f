//! 配送集群重新分配
//!
//! 周期性扫描尚未分配配送员的集群，在重试次数和重试间隔的限制下尝试分配，
//! 并向管理员和配送员发出通知。

pub mod assignment;
pub mod metrics;
pub mod notifier;
pub mod reassignment;
pub mod retry_policy;
pub mod settings;

pub use assignment::{AssignmentAttempt, AttemptOutcome};
pub use metrics::ReassignmentMetrics;
pub use notifier::ReassignmentNotifier;
pub use reassignment::{ClusterOutcome, CycleReport, ReassignmentHandle, ReassignmentService};
pub use retry_policy::{classify, RetryVerdict};
pub use settings::ReassignmentSettings;
