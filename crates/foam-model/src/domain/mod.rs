mod epoch;
pub(crate) use epoch::epoch_secs;
pub use epoch::{secs_since_epoch, to_epoch_secs};

mod run_id;
pub use run_id::RunId;

mod run_state;
pub use run_state::RunState;

mod run_info;
pub use run_info::RunInfo;

mod launch;
pub use launch::{LaunchMode, ModeParseError, StartSpec};

mod output;
pub use output::{OutputLine, StreamKind};

mod event;
pub use event::{CompletionEvent, ConnectionEvent, ConnectionKind, PushEvent};

mod config;
pub use config::{DEFAULT_DOCKER_IMAGE, DEFAULT_OPENFOAM_VERSION, PanelConfig};

/// Exit code reported for runs that never produced a process exit status
/// (spawn failure, lost supervisor, server restart).
pub const LAUNCH_FAILED_EXIT_CODE: i32 = -1;
