pub mod download;
pub mod session;
pub mod stage;
pub mod state;

pub use session::ConversionSession;
pub use stage::Stage;
pub use state::{PendingUpload, WorkflowState};
