//! App - エンジン層
//!
//! ports を組み合わせて 1 回の run を組み立てる。
//!
//! # 主要コンポーネント
//! - **EngineBuilder**: 設定の検証とワイヤリング
//! - **Engine / Run**: run の開始、結果ストリーム、レポート
//! - **WorkerLoop**: claim → supervise → policy → deliver
//! - **TimeoutSupervisor**: タスクごとの deadline と中断
//! - **Aggregator**: streaming / ordered / collected の出力
//! - **CancellationController**: run 全体の停止シグナル

pub mod builder;
pub mod cancel;
pub mod config;
pub mod policy;
pub mod runtime;
pub mod status;

mod aggregator;
mod producer;
mod supervisor;
mod worker_loop;

pub use self::builder::{BuildError, EngineBuilder};
pub use self::cancel::{CancellationController, StopReason};
pub use self::config::{Concurrency, EngineConfig, OutputMode};
pub use self::policy::{ErrorPolicy, Verdict};
pub use self::runtime::{Collected, Engine, OutcomeStream, Run};
pub use self::status::RunReport;
