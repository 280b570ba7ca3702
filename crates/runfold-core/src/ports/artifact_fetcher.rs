//! ArtifactFetcher port - run 1 件分の artifact 一覧を取得する
//!
//! aggregator から見た唯一のデータ源です。キャッシュやリトライは
//! aggregator 側では行いません（必要なら実装側の責務）。

use async_trait::async_trait;

use crate::domain::{ArtifactListing, FetchError, RunId};

/// ArtifactFetcher は run の artifact 一覧を返す
///
/// # 設計原則
/// - 1 回の呼び出し = 1 run（fan-out は aggregator が行う）
/// - `path` が `Some` の場合は artifact root 配下のサブディレクトリを一覧する
/// - タイムアウトが必要なら実装側で持つ
///
/// # Thread Safety
/// - `Send + Sync` を要求（fetch は別タスクで並行に走る）
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn list_artifacts(
        &self,
        run_id: &RunId,
        path: Option<&str>,
    ) -> Result<ArtifactListing, FetchError>;
}
