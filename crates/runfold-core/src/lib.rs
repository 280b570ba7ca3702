//! runfold-core
//!
//! Multi-key artifact aggregation: fan out one fetch per run id and fold the
//! settlements into a single loading/error/result state.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, listing, outcome, errors, state）
//! - **ports**: 抽象化レイヤー（ArtifactFetcher, Clock, IdGenerator）
//! - **app**: 集約ロジック（RunArtifactsAggregator, AggregateView, builder, config）
//! - **impls**: 実装（InMemoryArtifactFetcher など開発用）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{AggregateView, AggregatorConfig, RunArtifactsAggregator};
pub use domain::{AggregateError, AggregateState, ArtifactListing, FetchError, RunId};
pub use ports::ArtifactFetcher;
