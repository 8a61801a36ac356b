//! 调和模块：重试退避、颜色分配、单标签调和、批量操作与专注模式
pub mod bulk;
pub mod color;
pub mod focus;
pub mod reconciler;
pub mod retry;

pub use self::bulk::BulkOutcome;
pub use self::color::{ColorAssigner, ColorChoice};
pub use self::focus::FocusDebouncer;
pub use self::reconciler::{DesiredGroup, GroupReconciler, ReconcilerState, SYSTEM_GROUP_NAME, TabEvent};
pub use self::retry::{RecordingSleeper, Sleeper, TokioSleeper, retry_with_backoff};
