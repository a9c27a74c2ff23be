//! App - アプリケーション層
//!
//! このモジュールは、domain と ports を組み合わせてルーターを実装します。
//!
//! # 主要コンポーネント
//! - **Router**: テナント単位のコンテキスト（全 CRUD と状態遷移）
//! - **MatchingScheduler**: マッチングパスと原子的な割り当て
//! - **RouterBuilder**: ルーターの構築とワイヤリング
//! - **CallbackPublisher**: コールバック配送ループ（リトライ・cancel パス）
//! - **RouterStatus**: ステータススナップショットと整合性監査

pub mod builder;
pub mod publisher_loop;
pub mod requests;
pub mod retry;
pub mod router;
pub mod scheduler;
pub mod state;
pub mod status;

// 主要な型を再エクスポート
pub use self::builder::{App, BuildError, RouterBuilder};
pub use self::publisher_loop::{CallbackPublisher, DeliveryOutcome};
pub use self::requests::{
    AgentSpec, AgentUpdate, PlanSpec, PlanUpdate, QueueSpec, QueueUpdate, RouteSpec, TaskSpec,
};
pub use self::retry::RetryPolicy;
pub use self::router::{CreatedTask, Router, X_QUEUE_SIZE};
pub use self::scheduler::{Assignment, MatchingScheduler};
pub use self::status::{AgentCounts, RouterStatus, TaskCounts};
