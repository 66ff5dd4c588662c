pub mod db;
pub mod mailer;
pub mod memory;

pub use db::DbAdapter;
pub use mailer::{LogNotifier, OutboxNotifier};
pub use memory::MemoryAdapter;
