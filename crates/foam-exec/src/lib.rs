mod error;
pub use error::{ExecError, ExecResult};

mod reader;
pub mod util;
pub mod utils;
pub use utils::limits::ResourceLimits;

#[cfg(feature = "proc")]
pub mod proc;
#[cfg(feature = "proc")]
pub use proc::{ProcConfig, ProcLauncher};
#[cfg(feature = "shell")]
pub use proc::shell::ShellLauncher;

#[cfg(feature = "docker")]
pub mod docker;
#[cfg(feature = "docker")]
pub use docker::{DockerConfig, DockerLauncher, cleanup_orphan_containers};

pub mod prelude {
    pub use crate::error::{ExecError, ExecResult};
    pub use crate::utils::limits::ResourceLimits;
    #[cfg(feature = "docker")]
    pub use crate::{DockerConfig, DockerLauncher};
    #[cfg(feature = "proc")]
    pub use crate::{ProcConfig, ProcLauncher};
    #[cfg(feature = "shell")]
    pub use crate::ShellLauncher;
}
