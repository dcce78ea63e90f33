//! StackPilot コア
//!
//! スタック定義のモデル、エラー分類、マニフェスト変換と補助ファイル生成を提供します。

pub mod error;
pub mod manifest;
pub mod model;
pub mod sidefile;
pub mod template;

pub use error::*;
pub use manifest::{ManifestTransformer, RoutingOptions, TransformOutput};
pub use model::*;
pub use sidefile::SideFile;
