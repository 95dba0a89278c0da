pub mod anchor;
pub mod comments;
pub mod dom;
pub mod layout;
pub mod panic_handler;
pub mod paths;
pub mod session;
pub mod settings;
pub mod storage;
pub mod theme;

pub use anchor::{AnchorEngine, HighlightId, HighlightRegion, HighlightStyle};
pub use comments::{CommentRecord, CommentStore, DeleteOutcome};
pub use dom::{Document, Range, RangeError};
pub use session::{Session, ThreadView};
pub use settings::Settings;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
