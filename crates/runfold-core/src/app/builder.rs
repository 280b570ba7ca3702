//! AggregatorBuilder - aggregator の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）

use std::sync::Arc;

use crate::ports::{ArtifactFetcher, Clock, IdGenerator, SystemClock, UlidGenerator};

use super::aggregator::RunArtifactsAggregator;
use super::config::{AggregatorConfig, ConfigError};

/// AggregatorBuilder は RunArtifactsAggregator を構築
///
/// # 使用例
/// ```ignore
/// let aggregator = AggregatorBuilder::new(Arc::new(fetcher))
///     .config(AggregatorConfig::default().with_max_concurrent_fetches(8))
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - build() 時に config を検証し、不正なら BuildError を返す
/// - merge loop の spawn は検証が通った後だけ
pub struct AggregatorBuilder {
    fetcher: Arc<dyn ArtifactFetcher>,
    config: AggregatorConfig,
    clock: Arc<dyn Clock>,
    id_generator: Option<Arc<dyn IdGenerator>>,
}

/// BuildError は aggregator 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

impl AggregatorBuilder {
    pub fn new(fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self {
            fetcher,
            config: AggregatorConfig::default(),
            clock: Arc::new(SystemClock),
            id_generator: None,
        }
    }

    pub fn config(mut self, config: AggregatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Clock used for `started_at`.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Defaults to a ULID generator on the system clock.
    pub fn id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(id_generator);
        self
    }

    /// Validate the config and spawn the merge loop.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Result<RunArtifactsAggregator, BuildError> {
        self.config.validate()?;
        Ok(self.spawn())
    }

    /// Spawn without validation (default config is always valid).
    pub(crate) fn spawn(self) -> RunArtifactsAggregator {
        let id_generator = self
            .id_generator
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(SystemClock)));
        RunArtifactsAggregator::spawn(self.fetcher, self.config, self.clock, id_generator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryArtifactFetcher;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_build_success() {
        let aggregator = AggregatorBuilder::new(Arc::new(InMemoryArtifactFetcher::new()))
            .config(AggregatorConfig::default().with_max_concurrent_fetches(2))
            .build();
        assert!(aggregator.is_ok());
    }

    #[tokio::test]
    async fn test_build_invalid_config() {
        let config = AggregatorConfig {
            max_concurrent_fetches: Some(0),
            ..AggregatorConfig::default()
        };
        let aggregator = AggregatorBuilder::new(Arc::new(InMemoryArtifactFetcher::new()))
            .config(config)
            .build();
        assert!(matches!(
            aggregator,
            Err(BuildError::InvalidConfig(ConfigError::Invalid(_)))
        ));
    }

    #[tokio::test]
    async fn test_fixed_clock_stamps_invocations() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let fixed = FixedClock::new(at);
        let aggregator = AggregatorBuilder::new(Arc::new(InMemoryArtifactFetcher::new()))
            .clock(Arc::new(fixed))
            .id_generator(Arc::new(UlidGenerator::new(fixed)))
            .build()
            .unwrap();

        let view = aggregator.observe(Vec::<String>::new()).await.unwrap();
        let state = view.current();
        assert_eq!(state.started_at(), at);
        assert_eq!(state.invocation().as_ulid().timestamp_ms(), at.timestamp_millis() as u64);
    }
}
