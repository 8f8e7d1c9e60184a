//! # Flow Core
//!
//! 患者流转系统的核心模块，提供状态词汇表、数据模型、错误定义和协作方接口。

pub mod collaborators;
pub mod error;
pub mod models;
pub mod vocabulary;

pub use error::{FlowError, Result};
pub use models::*;
pub use vocabulary::{
    derive_stage_from_entries, journey_to_queue, queue_to_journey, ActorClass, JourneyStage,
    QueuePriority, QueueState,
};
