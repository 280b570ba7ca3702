//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryArtifactFetcher**: 応答と遅延をスクリプトできる fetcher
//!   （テストと CLI デモで使用）
//!
//! 実ネットワーク向けの fetcher はこのクレートの外に置きます。

pub mod inmem_fetcher;

pub use self::inmem_fetcher::{
    FetchCall, FetchFixture, FixtureEntry, FixtureError, InMemoryArtifactFetcher,
};
