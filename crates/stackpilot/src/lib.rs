//! StackPilot
//!
//! 単一ホスト上で compose スタックを作成・管理し、リバースプロキシの背後に公開します。

pub mod executor;
pub mod lifecycle;
pub mod proxy;
pub mod status;

pub use executor::run_bounded;
pub use lifecycle::StackManager;
pub use proxy::{ProxyManager, ProxySnapshot};
pub use status::StatusAggregator;
