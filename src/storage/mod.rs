//! 持久化模块：键值存储实现与状态读写
pub mod file;
pub mod memory;
pub mod settings;

pub use self::file::FileKvStore;
pub use self::memory::MemoryKvStore;
pub use self::settings::{COLOR_MAPPING_KEY, ColorMapping, RULES_KEY, SETTINGS_KEY, SettingsStore};
