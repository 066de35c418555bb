//! Runtime adapters for tailor (config, project filesystem, cache, session
//! state, conversation records).

pub mod config;
pub mod conversation;
pub mod fs;
pub mod kv;
pub mod session;

pub use config::Config;
pub use conversation::{ConversationRecord, ConversationStore, JsonlConversationStore};
pub use fs::{FsError, PathPolicy, ProjectFs};
pub use kv::{CacheError, DisabledCache, KvCache, MokaKvCache};
pub use session::{SessionContext, SessionSettings, SessionStore};
