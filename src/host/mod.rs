//! 外部宿主模块：实体定义、协作方接口与内存实现
pub mod memory;
pub mod model;
pub mod traits;

pub use self::memory::{HostCall, HostOp, MemoryHost};
pub use self::model::{Group, GroupId, GroupUpdate, Tab, TabId, WindowId};
pub use self::traits::{KvStore, TabHost};
