//! # Flow Notify
//!
//! 变更通知模块，把每次已提交的状态变更扇出给观察者：
//! - 按患者、按站点、全院三种频道范围
//! - 尽力投递，慢观察者丢弃消息而不反压写入方
//! - 拉取式重同步：掉线的观察者可以请求一份现算快照

pub mod notifier;
pub mod source;

pub use notifier::ChangeNotifier;
pub use source::SnapshotSource;
