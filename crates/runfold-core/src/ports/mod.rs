//! Ports - 抽象化レイヤー
//!
//! aggregator が外部に依存する部分を trait として定義します。
//!
//! - ArtifactFetcher: run 1 件分の artifact 一覧取得（ネットワーク等）
//! - Clock: 時刻
//! - IdGenerator: invocation ID の発行

pub mod artifact_fetcher;
pub mod clock;
pub mod id_generator;

pub use self::artifact_fetcher::ArtifactFetcher;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
