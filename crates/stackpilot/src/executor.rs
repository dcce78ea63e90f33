//! 同時実行数を制限したバッチ実行
//!
//! 処理中の操作が完了するたびに次を投入し、常に最大 `limit` 件までを並行に実行します。
//! 個々の失敗は操作側で結果レコードに変換する前提のため、全体としては失敗しません。

use futures_util::stream::{self, StreamExt};
use std::future::Future;

/// 各要素に `op` を適用し、入力順の結果を返す
///
/// `limit` が 0 の場合は 1 として扱います。
pub async fn run_bounded<T, R, F, Fut>(items: Vec<T>, limit: usize, op: F) -> Vec<R>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = R>,
{
    let limit = limit.max(1);

    let mut results: Vec<(usize, R)> = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| {
            let fut = op(item);
            async move { (index, fut.await) }
        })
        .buffer_unordered(limit)
        .collect()
        .await;

    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}
