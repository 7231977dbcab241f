//! # Courier Testing Utils
//!
//! 重新分配循环各 crate 共享的测试工具。
//!
//! - **Builders**: 集群、配送单、配送员测试数据构建器
//! - **Mocks**: 可注入失败的协作方实现，以及记录通知的发送器
//! - **Helpers**: 等待条件成立、停止信号通道等常用模式
//!
//! ```toml
//! [dev-dependencies]
//! courier-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
