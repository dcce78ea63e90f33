//! モデル定義
//!
//! スタック作成の入力 (`StackConfig`) と、ランタイムから再構成される
//! 状態・メトリクスの外部表現を定義します。

mod stack;
mod status;

// Re-exports
pub use stack::*;
pub use status::*;
