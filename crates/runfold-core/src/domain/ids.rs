//! Domain identifiers.
//!
//! - `RunId`: 呼び出し側から渡される run の識別子（中身は不透明な文字列）
//! - `InvocationId`: 集約サイクル（invocation）ごとに発行される ULID
//!
//! `InvocationId` は settlement に付けるタグとして使い、古い invocation の
//! settlement を捨てる判定に使います。

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Opaque identifier of one run whose artifacts are being listed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of one aggregation cycle.
///
/// ULID なので生成順でソートでき、ログ上で invocation の前後関係が読めます。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvocationId(Ulid);

impl InvocationId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for InvocationId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inv-{}", self.0)
    }
}
