//! App - アプリケーション層
//!
//! ports を組み合わせて集約ロジックを実装します。
//!
//! # 主要コンポーネント
//! - **RunArtifactsAggregator**: run ごとの fetch の fan-out と状態の畳み込み
//! - **AggregateView**: 集約状態のライブビュー
//! - **AggregatorBuilder**: 構築とワイヤリング
//! - **AggregatorConfig**: 設定

pub mod aggregator;
pub mod builder;
pub mod config;
pub mod view;

// 主要な型を再エクスポート
pub use self::aggregator::{AggregatorError, RunArtifactsAggregator};
pub use self::builder::{AggregatorBuilder, BuildError};
pub use self::config::{AggregatorConfig, ConfigError};
pub use self::view::AggregateView;
