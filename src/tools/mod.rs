pub mod adapter;
pub mod calendar;
pub mod executor;
pub mod mailbox;
pub mod registry;

pub use adapter::{string_ids, string_param, ServiceAdapter, ToolAccess, ToolError, ToolSpec};
pub use calendar::{Event, InMemoryCalendar};
pub use executor::{ToolExecutor, ToolOutcome};
pub use mailbox::{Email, InMemoryMailbox};
pub use registry::AdapterRegistry;
